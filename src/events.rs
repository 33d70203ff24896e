//! # Event Registry
//!
//! Durable routing table from sync items to the jobs their changes fire:
//!
//! - `subscribes` maps an item name to an ordered list of listener names
//! - a listener names an ordered list of events
//! - an event carries the [`Job`] to run
//!
//! Lookups treat a missing name as a normal outcome. The registry is
//! stored encrypted, like the key store; a missing file is an empty
//! registry.

use crate::envelope::EnvelopeCipher;
use crate::error::Result;
use crate::job::Job;
use crate::repository::{Repository, RepositoryHandle, SnapshotStore};
use crate::storage::EncryptedFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A named job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub job: Job,
}

impl Event {
    pub fn new(name: impl Into<String>, job: Job) -> Self {
        Self {
            name: name.into(),
            job,
        }
    }
}

/// Binds a sync item context to the events to fire, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "item_name")]
    pub sync_item_name: String,
    #[serde(default)]
    pub event_names: Vec<String>,
}

impl Listener {
    /// The events this listener fires, in order, skipping names the
    /// registry does not know.
    pub fn resolve<'a>(&'a self, registry: &'a EventsSnapshot) -> impl Iterator<Item = &'a Event> + 'a {
        self.event_names.iter().filter_map(move |name| {
            let event = registry.find_event(name);
            if event.is_none() {
                debug!("Listener for '{}' references unknown event '{}'", self.sync_item_name, name);
            }
            event
        })
    }
}

/// Everything the event registry persists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsSnapshot {
    #[serde(default)]
    pub events: BTreeMap<String, Event>,
    #[serde(default)]
    pub listeners: BTreeMap<String, Listener>,
    #[serde(default)]
    pub subscribes: BTreeMap<String, Vec<String>>,
}

impl EventsSnapshot {
    pub fn find_event(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    pub fn find_listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.get(name)
    }

    pub fn get_listeners(&self, item_name: &str) -> Option<&[String]> {
        self.subscribes.get(item_name).map(Vec::as_slice)
    }

    /// Every `(listener name, event)` pair a change of `item_name` fires,
    /// listeners in subscription order, events in listener order.
    pub fn resolve(&self, item_name: &str) -> Vec<(String, Event)> {
        let Some(listener_names) = self.get_listeners(item_name) else {
            return Vec::new();
        };

        let mut fired = Vec::new();
        for listener_name in listener_names {
            let Some(listener) = self.find_listener(listener_name) else {
                debug!("Item '{}' subscribes unknown listener '{}'", item_name, listener_name);
                continue;
            };
            for event in listener.resolve(self) {
                fired.push((listener_name.clone(), event.clone()));
            }
        }
        fired
    }
}

struct EventsFile {
    file: EncryptedFile,
}

impl SnapshotStore<EventsSnapshot> for EventsFile {
    fn load(&self) -> Result<EventsSnapshot> {
        Ok(self.file.read()?.unwrap_or_default())
    }

    fn persist(&self, snapshot: &EventsSnapshot) -> Result<()> {
        self.file.write(snapshot)
    }
}

/// Handle to the encrypted event registry.
#[derive(Clone)]
pub struct EventRegistry {
    repository: Arc<Repository<EventsSnapshot>>,
}

impl EventRegistry {
    /// Open the registry at `path`. Nothing is read until first use.
    pub fn open(path: PathBuf, cipher: EnvelopeCipher) -> Self {
        let store = EventsFile {
            file: EncryptedFile::new(path, cipher),
        };
        Self {
            repository: Arc::new(Repository::new("event registry", store)),
        }
    }

    pub fn acquire(&self) -> Result<RepositoryHandle<'_, EventsSnapshot>> {
        self.repository.acquire()
    }

    pub fn repository(&self) -> &Repository<EventsSnapshot> {
        &self.repository
    }

    pub fn find_event(&self, name: &str) -> Result<Option<Event>> {
        Ok(self.acquire()?.read().find_event(name).cloned())
    }

    pub fn find_listener(&self, name: &str) -> Result<Option<Listener>> {
        Ok(self.acquire()?.read().find_listener(name).cloned())
    }

    pub fn get_listeners(&self, item_name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.acquire()?.read().get_listeners(item_name).map(<[String]>::to_vec))
    }

    /// Register `job` under `name`, replacing any event of that name.
    pub fn add_event(&self, name: &str, job: Job) -> Result<()> {
        let event = Event::new(name, job);
        self.acquire()?.update(|snapshot| {
            snapshot.events.insert(name.to_string(), event);
            Ok(())
        })?;
        info!("Registered event '{}'", name);
        Ok(())
    }

    /// Remove an event. Listeners referencing it keep the name and skip it.
    pub fn remove_event(&self, name: &str) -> Result<bool> {
        self.acquire()?
            .update(|snapshot| Ok(snapshot.events.remove(name).is_some()))
    }

    /// Register a listener and subscribe it to `sync_item_name`. Replacing
    /// a listener that named another item also drops its subscription to
    /// that item.
    pub fn add_listener(&self, name: &str, sync_item_name: &str, event_names: Vec<String>) -> Result<()> {
        let listener = Listener {
            sync_item_name: sync_item_name.to_string(),
            event_names,
        };
        self.acquire()?.update(|snapshot| {
            if let Some(previous) = snapshot.listeners.insert(name.to_string(), listener) {
                if previous.sync_item_name != sync_item_name {
                    unsubscribe_in(snapshot, &previous.sync_item_name, name);
                }
            }
            subscribe_in(snapshot, sync_item_name, name);
            Ok(())
        })?;
        info!("Registered listener '{}' for '{}'", name, sync_item_name);
        Ok(())
    }

    /// Remove a listener and every subscription naming it.
    pub fn remove_listener(&self, name: &str) -> Result<bool> {
        self.acquire()?.update(|snapshot| {
            let removed = snapshot.listeners.remove(name).is_some();
            for listeners in snapshot.subscribes.values_mut() {
                listeners.retain(|listener| listener != name);
            }
            snapshot.subscribes.retain(|_, listeners| !listeners.is_empty());
            Ok(removed)
        })
    }

    /// Route changes of `item_name` to `listener_name` as well. Subscribing
    /// twice is a no-op.
    pub fn subscribe(&self, item_name: &str, listener_name: &str) -> Result<()> {
        self.acquire()?.update(|snapshot| {
            subscribe_in(snapshot, item_name, listener_name);
            Ok(())
        })
    }

    pub fn unsubscribe(&self, item_name: &str, listener_name: &str) -> Result<bool> {
        self.acquire()?
            .update(|snapshot| Ok(unsubscribe_in(snapshot, item_name, listener_name)))
    }
}

fn unsubscribe_in(snapshot: &mut EventsSnapshot, item_name: &str, listener_name: &str) -> bool {
    let Some(listeners) = snapshot.subscribes.get_mut(item_name) else {
        return false;
    };
    let before = listeners.len();
    listeners.retain(|listener| listener != listener_name);
    let removed = listeners.len() != before;
    if listeners.is_empty() {
        snapshot.subscribes.remove(item_name);
    }
    removed
}

fn subscribe_in(snapshot: &mut EventsSnapshot, item_name: &str, listener_name: &str) {
    let listeners = snapshot.subscribes.entry(item_name.to_string()).or_default();
    if !listeners.iter().any(|listener| listener == listener_name) {
        listeners.push(listener_name.to_string());
    }
}
