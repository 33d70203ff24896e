//! # Reference-Counted Repositories
//!
//! A [`Repository`] owns a lazily loaded snapshot of persisted state.
//! Callers get at the snapshot through a [`RepositoryHandle`]:
//!
//! - the first `acquire` loads the snapshot from its [`SnapshotStore`]
//! - concurrent handles share the same in-memory snapshot
//! - dropping the last handle evicts the snapshot, so the next `acquire`
//!   reads the store again
//!
//! Every handle keeps its own strong reference to the snapshot, and
//! release happens in `Drop`, so a live handle never observes eviction.
//! Mutations go through [`RepositoryHandle::update`], which persists a
//! modified copy and only swaps it in once the write succeeded.

use crate::error::Result;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::Arc;
use tracing::debug;

/// Backing storage of a repository snapshot.
pub trait SnapshotStore<S>: Send + Sync {
    /// Read the persisted snapshot, creating the initial one when nothing
    /// has been persisted yet.
    fn load(&self) -> Result<S>;

    fn persist(&self, snapshot: &S) -> Result<()>;
}

struct Slot<S> {
    snapshot: Option<Arc<RwLock<S>>>,
    refs: usize,
    loads: u64,
}

/// Lazily loaded, reference-counted snapshot of persisted state.
pub struct Repository<S> {
    name: &'static str,
    store: Box<dyn SnapshotStore<S>>,
    slot: Mutex<Slot<S>>,
}

impl<S: Clone> Repository<S> {
    pub fn new(name: &'static str, store: impl SnapshotStore<S> + 'static) -> Self {
        Self {
            name,
            store: Box::new(store),
            slot: Mutex::new(Slot {
                snapshot: None,
                refs: 0,
                loads: 0,
            }),
        }
    }

    /// Borrow the snapshot, loading it if no other handle is alive.
    pub fn acquire(&self) -> Result<RepositoryHandle<'_, S>> {
        let mut slot = self.slot.lock();

        let snapshot = match &slot.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => {
                let loaded = Arc::new(RwLock::new(self.store.load()?));
                slot.snapshot = Some(loaded.clone());
                slot.loads += 1;
                debug!("Loaded {} snapshot", self.name);
                loaded
            }
        };
        slot.refs += 1;

        Ok(RepositoryHandle {
            repository: self,
            snapshot,
        })
    }

    /// Number of live handles.
    pub fn ref_count(&self) -> usize {
        self.slot.lock().refs
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().snapshot.is_some()
    }

    /// How many times the snapshot has been read from the store.
    pub fn load_count(&self) -> u64 {
        self.slot.lock().loads
    }

    fn release(&self) {
        let mut slot = self.slot.lock();
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 && slot.snapshot.take().is_some() {
            debug!("Evicted {} snapshot", self.name);
        }
    }
}

/// Scoped access to a repository snapshot. Released on drop.
pub struct RepositoryHandle<'a, S: Clone> {
    repository: &'a Repository<S>,
    snapshot: Arc<RwLock<S>>,
}

impl<S: Clone> RepositoryHandle<'_, S> {
    pub fn read(&self) -> RwLockReadGuard<'_, S> {
        self.snapshot.read()
    }

    /// Apply `mutate` to a copy of the snapshot, persist the copy, then
    /// publish it. If `mutate` or the write fails the shared snapshot is
    /// left untouched. Writers are serialized by the snapshot lock.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut S) -> Result<R>) -> Result<R> {
        let mut current = self.snapshot.write();
        let mut next = current.clone();

        let output = mutate(&mut next)?;
        self.repository.store.persist(&next)?;

        *current = next;
        Ok(output)
    }
}

impl<S: Clone> Drop for RepositoryHandle<'_, S> {
    fn drop(&mut self) {
        self.repository.release();
    }
}
