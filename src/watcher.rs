//! # Sync Item Watcher
//!
//! Watches the paths of configured sync items and turns filesystem
//! changes into [`Dispatcher::trigger`] calls:
//!
//! 1. notify reports a change under some path
//! 2. the path is mapped to the sync item whose path contains it
//! 3. changes are debounced per item
//! 4. each settled item is triggered on the blocking pool

use crate::debounce::{ChangeType, DebouncerConfig, ItemChange, ItemDebouncer, ProcessFuture};
use crate::dispatcher::Dispatcher;
use crate::item::SyncItem;
use anyhow::Result;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Filesystem watcher over a set of sync items.
pub struct ItemWatcher {
    items: Arc<HashMap<String, SyncItem>>,
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
}

impl ItemWatcher {
    /// Start watching every item whose path exists.
    pub fn new(items: Vec<SyncItem>) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1000);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Err(e) = event_tx.blocking_send(res) {
                error!("Failed to forward file event: {}", e);
            }
        })?;

        let mut watched = HashMap::new();
        for item in items {
            if !item.path.exists() {
                warn!("Not watching '{}': {} does not exist", item.name, item.path.display());
                continue;
            }

            let mode = if item.is_dir {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(&item.path, mode)?;
            info!("Watching '{}' at {}", item.name, item.path.display());
            watched.insert(item.name.clone(), item);
        }

        Ok(Self {
            items: Arc::new(watched),
            _watcher: watcher,
            event_rx,
        })
    }

    pub fn watched_items(&self) -> usize {
        self.items.len()
    }

    /// Dispatch changes until the event stream ends or Ctrl-C is received.
    pub async fn run(mut self, dispatcher: Dispatcher, config: DebouncerConfig) -> Result<()> {
        let items = self.items.clone();
        let processor = move |changes: Vec<ItemChange>| {
            let items = items.clone();
            let dispatcher = dispatcher.clone();
            Box::pin(async move {
                trigger_settled(&items, &dispatcher, changes).await;
                Ok::<(), anyhow::Error>(())
            }) as ProcessFuture
        };

        let mut debouncer = ItemDebouncer::new(config, processor);
        debouncer.start();

        info!("Watching {} sync item(s) for changes", self.items.len());
        loop {
            tokio::select! {
                received = self.event_rx.recv() => {
                    let Some(result) = received else { break };
                    match result {
                        Ok(event) => {
                            let Some(change_type) = ChangeType::from_event(&event) else {
                                continue;
                            };
                            for path in &event.paths {
                                if let Some(item) = item_for_path(&self.items, path) {
                                    if let Err(e) = debouncer.handle_change(&item.name, change_type).await {
                                        error!("Failed to process changes of '{}': {}", item.name, e);
                                    }
                                }
                            }
                        }
                        Err(e) => warn!("File watcher error: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping watcher");
                    break;
                }
            }
        }

        debouncer.shutdown().await
    }
}

/// Trigger every settled item on the blocking pool. An item whose trigger
/// fails is logged and skipped; the rest of the batch still fires. Returns
/// the number of items triggered.
pub async fn trigger_settled(
    items: &HashMap<String, SyncItem>,
    dispatcher: &Dispatcher,
    changes: Vec<ItemChange>,
) -> usize {
    let mut triggered = 0;
    for change in changes {
        let Some(item) = items.get(&change.item_name).cloned() else {
            continue;
        };
        debug!("'{}' settled after {} event(s)", item.name, change.event_count);

        let name = item.name.clone();
        let dispatcher = dispatcher.clone();
        match tokio::task::spawn_blocking(move || dispatcher.trigger(&item)).await {
            Ok(Ok(report)) => {
                triggered += 1;
                for failure in report.failures() {
                    if let Err(e) = &failure.result {
                        error!("'{}' job '{}' failed: {}", report.item, failure.event, e);
                    }
                }
            }
            Ok(Err(e)) => error!("Failed to trigger '{}': {}", name, e),
            Err(e) => error!("Trigger of '{}' aborted: {}", name, e),
        }
    }
    triggered
}

/// The item owning `path`; the most specific item wins when paths nest.
pub fn item_for_path<'a>(items: &'a HashMap<String, SyncItem>, path: &Path) -> Option<&'a SyncItem> {
    items
        .values()
        .filter(|item| path.starts_with(&item.path))
        .max_by_key(|item| item.path.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MasterKey, Settings};
    use crate::context::TrustContext;
    use crate::error::JobError;
    use crate::events::Event as SyncEvent;
    use crate::job::{Job, JobRunner};
    use parking_lot::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct PanickyRunner {
        fired: Mutex<Vec<String>>,
    }

    impl JobRunner for PanickyRunner {
        fn run(&self, _event: &SyncEvent, item: &SyncItem) -> std::result::Result<(), JobError> {
            if item.name == "a" {
                panic!("runner blew up on '{}'", item.name);
            }
            self.fired.lock().push(item.name.clone());
            Ok(())
        }
    }

    fn change(name: &str) -> ItemChange {
        let now = Instant::now();
        ItemChange {
            item_name: name.to_string(),
            change_type: ChangeType::Modified,
            first_seen: now,
            last_seen: now,
            event_count: 1,
        }
    }

    fn items(entries: &[SyncItem]) -> HashMap<String, SyncItem> {
        entries.iter().map(|item| (item.name.clone(), item.clone())).collect()
    }

    #[test]
    fn test_item_for_path_prefers_most_specific() {
        let items = items(&[
            SyncItem::new("home", "/data/home", true),
            SyncItem::new("docs", "/data/home/docs", true),
            SyncItem::new("todo", "/data/todo.txt", false),
        ]);

        let found = item_for_path(&items, Path::new("/data/home/docs/a.txt")).unwrap();
        assert_eq!(found.name, "docs");
        let found = item_for_path(&items, Path::new("/data/home/music/b.mp3")).unwrap();
        assert_eq!(found.name, "home");
        let found = item_for_path(&items, Path::new("/data/todo.txt")).unwrap();
        assert_eq!(found.name, "todo");
        assert!(item_for_path(&items, Path::new("/data/other")).is_none());
    }

    #[tokio::test]
    async fn test_missing_paths_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = ItemWatcher::new(vec![
            SyncItem::new("present", temp_dir.path(), true),
            SyncItem::new("absent", temp_dir.path().join("nope"), true),
        ])
        .unwrap();

        assert_eq!(watcher.watched_items(), 1);
    }

    #[tokio::test]
    async fn test_failed_item_does_not_drop_rest_of_batch() {
        let temp_dir = TempDir::new().unwrap();
        let key = MasterKey::from_bytes(&[0x42; 32]).unwrap();
        let runner = Arc::new(PanickyRunner::default());
        let context = TrustContext::init(Settings::in_dir(temp_dir.path()), &key).with_runner(runner.clone());

        context.events().add_event("e", Job::Log { message: None }).unwrap();
        for name in ["a", "b", "c"] {
            context
                .events()
                .add_listener(&format!("listener-{}", name), name, vec!["e".into()])
                .unwrap();
        }

        let watched = items(&[
            SyncItem::new("a", temp_dir.path(), true),
            SyncItem::new("b", temp_dir.path(), true),
            SyncItem::new("c", temp_dir.path(), true),
        ]);
        let triggered = trigger_settled(
            &watched,
            context.dispatcher(),
            vec![change("a"), change("b"), change("c")],
        )
        .await;

        assert_eq!(triggered, 2);
        let mut fired = runner.fired.lock().clone();
        fired.sort();
        assert_eq!(fired, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_items_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let key = MasterKey::from_bytes(&[0x43; 32]).unwrap();
        let context = TrustContext::init(Settings::in_dir(temp_dir.path()), &key);

        let triggered = trigger_settled(&HashMap::new(), context.dispatcher(), vec![change("ghost")]).await;
        assert_eq!(triggered, 0);
    }
}
