//! # Sync Item Change Debouncing
//!
//! A burst of filesystem events under one sync item (an editor saving, a
//! directory being copied) should fire that item's jobs once. The
//! debouncer collapses changes per item name and hands settled items to a
//! processor once no new change has arrived for `debounce_delay`, or once
//! the first change is older than `max_event_age`.

use anyhow::Result;
use notify::{Event, EventKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Kind of filesystem change seen under an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Created,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn from_event(event: &Event) -> Option<Self> {
        match &event.kind {
            EventKind::Create(_) => Some(ChangeType::Created),
            EventKind::Modify(_) => Some(ChangeType::Modified),
            EventKind::Remove(_) => Some(ChangeType::Removed),
            _ => None,
        }
    }
}

/// Collapsed changes of one sync item.
#[derive(Debug, Clone)]
pub struct ItemChange {
    pub item_name: String,
    pub change_type: ChangeType,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub event_count: u32,
}

impl ItemChange {
    fn new(item_name: String, change_type: ChangeType) -> Self {
        let now = Instant::now();
        Self {
            item_name,
            change_type,
            first_seen: now,
            last_seen: now,
            event_count: 1,
        }
    }

    fn update(&mut self, change_type: ChangeType) {
        self.last_seen = Instant::now();
        self.event_count += 1;
        self.change_type = change_type;
    }

    fn is_settled(&self, config: &DebouncerConfig) -> bool {
        self.last_seen.elapsed() >= config.debounce_delay
            || self.first_seen.elapsed() >= config.max_event_age
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebounceStats {
    pub changes_received: u64,
    pub changes_collapsed: u64,
    pub items_processed: u64,
    pub pending_items: usize,
}

#[derive(Debug, Clone)]
pub struct DebouncerConfig {
    /// Quiet period after the last change before an item is processed
    pub debounce_delay: Duration,
    /// Pending items that force an immediate flush
    pub max_pending_items: usize,
    /// How often settled items are collected
    pub tick_interval: Duration,
    /// Upper bound on how long a busy item can stay pending
    pub max_event_age: Duration,
}

impl Default for DebouncerConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(200),
            max_pending_items: 500,
            tick_interval: Duration::from_millis(50),
            max_event_age: Duration::from_secs(5),
        }
    }
}

pub type ProcessFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Per-item change debouncer.
pub struct ItemDebouncer<F>
where
    F: Fn(Vec<ItemChange>) -> ProcessFuture + Send + Sync + 'static,
{
    config: DebouncerConfig,
    pending: Arc<RwLock<HashMap<String, ItemChange>>>,
    stats: Arc<RwLock<DebounceStats>>,
    processor: Arc<F>,
    shutdown_tx: Option<mpsc::UnboundedSender<()>>,
}

impl<F> ItemDebouncer<F>
where
    F: Fn(Vec<ItemChange>) -> ProcessFuture + Send + Sync + 'static,
{
    pub fn new(config: DebouncerConfig, processor: F) -> Self {
        Self {
            config,
            pending: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(DebounceStats::default())),
            processor: Arc::new(processor),
            shutdown_tx: None,
        }
    }

    /// Spawn the background task that flushes settled items.
    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
        self.shutdown_tx = Some(shutdown_tx);

        let pending = self.pending.clone();
        let stats = self.stats.clone();
        let processor = self.processor.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut ticker = interval(config.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let settled = take_settled(&pending, &config);
                        if let Err(e) = process(&processor, &stats, settled).await {
                            warn!("Error processing settled items: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Item debouncer stopping");
                        break;
                    }
                }
            }
        });

        info!("Item debouncer started with {:?} delay", self.config.debounce_delay);
    }

    /// Record a change under `item_name`.
    pub async fn handle_change(&self, item_name: &str, change_type: ChangeType) -> Result<()> {
        let overflow = {
            let mut pending = self.pending.write();
            let mut stats = self.stats.write();
            stats.changes_received += 1;

            match pending.get_mut(item_name) {
                Some(existing) => {
                    existing.update(change_type);
                    stats.changes_collapsed += 1;
                }
                None => {
                    pending.insert(item_name.to_string(), ItemChange::new(item_name.to_string(), change_type));
                }
            }
            stats.pending_items = pending.len();
            pending.len() >= self.config.max_pending_items
        };

        if overflow {
            warn!("Max pending items reached, flushing");
            self.flush().await?;
        }
        Ok(())
    }

    /// Process every pending item now.
    pub async fn flush(&self) -> Result<()> {
        let all: Vec<ItemChange> = self.pending.write().drain().map(|(_, change)| change).collect();
        process(&self.processor, &self.stats, all).await
    }

    pub fn stats(&self) -> DebounceStats {
        let stats = self.stats.read().clone();
        DebounceStats {
            pending_items: self.pending.read().len(),
            ..stats
        }
    }

    /// Stop the background task and flush what is left.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.flush().await?;
        info!("Item debouncer stopped: {:?}", self.stats());
        Ok(())
    }
}

fn take_settled(
    pending: &RwLock<HashMap<String, ItemChange>>,
    config: &DebouncerConfig,
) -> Vec<ItemChange> {
    let mut pending = pending.write();
    let settled: Vec<String> = pending
        .iter()
        .filter(|(_, change)| change.is_settled(config))
        .map(|(name, _)| name.clone())
        .collect();
    settled
        .into_iter()
        .filter_map(|name| pending.remove(&name))
        .collect()
}

async fn process<F>(processor: &Arc<F>, stats: &RwLock<DebounceStats>, changes: Vec<ItemChange>) -> Result<()>
where
    F: Fn(Vec<ItemChange>) -> ProcessFuture + Send + Sync + 'static,
{
    if changes.is_empty() {
        return Ok(());
    }

    let count = changes.len() as u64;
    debug!("Processing {} settled item(s)", count);
    (processor)(changes).await?;

    stats.write().items_processed += count;
    Ok(())
}
