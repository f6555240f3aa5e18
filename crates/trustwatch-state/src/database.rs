//! Database - ambient transactional store for watch bookkeeping
//!
//! `begin()` takes the exclusive write lock and hands out a [`Transaction`].
//! Staged writes live in the transaction's buffer until `commit()`, which
//! applies them to the committed table in one step and notifies commit
//! listeners before the write lock is released. Dropping a transaction
//! without committing rolls it back.
//!
//! Readers on the [`Database`] itself only ever see committed state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};
use trustwatch_core::{Edition, IdentityId};

use crate::{BulkEntry, CommitReport, Staged, StagedChanges, WatchEntry, WatchTable};

/// Receives the diff of every commit.
///
/// Called while the committing transaction still holds the write lock, so
/// listeners observe commits in order. A listener must not call
/// [`Database::begin`].
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, table: &WatchTable, report: &CommitReport);
}

/// Handle returned by [`Database::register_listener`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Transactional watch store
pub struct Database {
    write_lock: Mutex<()>,
    committed: RwLock<WatchTable>,
    commit_seq: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn CommitListener>)>>,
    next_listener: AtomicU64,
}

impl Database {
    pub fn new() -> Self {
        Database {
            write_lock: Mutex::new(()),
            committed: RwLock::new(WatchTable::new()),
            commit_seq: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Begin a transaction, blocking until the write lock is free
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.write_lock.lock();
        Transaction {
            db: self,
            _guard: guard,
            staged: StagedChanges::new(),
        }
    }

    /// Is the identity watched as of the last commit?
    pub fn is_watched(&self, id: IdentityId) -> bool {
        self.committed.read().contains(id)
    }

    /// Committed watch entry
    pub fn entry(&self, id: IdentityId) -> Option<WatchEntry> {
        self.committed.read().get(id).copied()
    }

    /// Committed watch set in identity order
    pub fn watched(&self) -> Vec<IdentityId> {
        self.committed.read().watched()
    }

    /// Is the identity queued for bulk download as of the last commit?
    pub fn is_queued(&self, id: IdentityId) -> bool {
        self.committed.read().is_queued(id)
    }

    /// Committed bulk queue entry
    pub fn bulk_entry(&self, id: IdentityId) -> Option<BulkEntry> {
        self.committed.read().bulk_entry(id).copied()
    }

    /// Committed bulk queue in identity order
    pub fn queued(&self) -> Vec<IdentityId> {
        self.committed.read().queued()
    }

    /// Number of commits so far
    pub fn commit_seq(&self) -> u64 {
        self.commit_seq.load(Ordering::Acquire)
    }

    /// Register a listener for subsequent commits
    pub fn register_listener(&self, listener: Arc<dyn CommitListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write transaction over a [`Database`]
pub struct Transaction<'db> {
    db: &'db Database,
    _guard: MutexGuard<'db, ()>,
    staged: StagedChanges,
}

impl<'db> Transaction<'db> {
    /// The database this transaction writes to
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Is the identity watched in this transaction's view?
    ///
    /// Committed state overlaid with this transaction's own staged commands.
    pub fn is_watched(&self, id: IdentityId) -> bool {
        let table = self.db.committed.read();
        self.staged.watched_after(&table, id)
    }

    /// Is the identity queued in this transaction's view?
    pub fn is_queued(&self, id: IdentityId) -> bool {
        let table = self.db.committed.read();
        self.staged.queued_after(&table, id)
    }

    /// Committed entry, ignoring staged changes
    pub fn committed_entry(&self, id: IdentityId) -> Option<WatchEntry> {
        self.db.entry(id)
    }

    /// Committed watch set, ignoring staged changes
    pub fn committed_watched(&self) -> Vec<IdentityId> {
        self.db.watched()
    }

    /// Committed bulk queue, ignoring staged changes
    pub fn committed_queued(&self) -> Vec<IdentityId> {
        self.db.queued()
    }

    pub fn stage_start(&mut self, id: IdentityId) -> Staged {
        let staged = self.staged.stage_start(id);
        debug!(identity = %id, ?staged, "staged watch start");
        staged
    }

    pub fn stage_abort(&mut self, id: IdentityId) -> Staged {
        let staged = self.staged.stage_abort(id);
        debug!(identity = %id, ?staged, "staged watch abort");
        staged
    }

    pub fn stage_queue(&mut self, id: IdentityId) -> Staged {
        let staged = self.staged.stage_queue(id);
        debug!(identity = %id, ?staged, "staged bulk queue");
        staged
    }

    pub fn stage_dequeue(&mut self, id: IdentityId) -> Staged {
        let staged = self.staged.stage_dequeue(id);
        debug!(identity = %id, ?staged, "staged bulk dequeue");
        staged
    }

    pub fn stage_hint(&mut self, target: IdentityId, edition: Edition) -> Staged {
        self.staged.stage_hint(target, edition)
    }

    pub fn stage_fetched(&mut self, id: IdentityId, edition: Edition) {
        self.staged.stage_fetched(id, edition);
    }

    pub fn stage_clear_watches(&mut self) {
        debug!("staged clear of all watches");
        self.staged.stage_clear_watches();
    }

    pub fn stage_clear_bulk(&mut self) {
        debug!("staged clear of bulk queue");
        self.staged.stage_clear_bulk();
    }

    /// Apply the staged buffer and notify listeners
    pub fn commit(self) -> CommitReport {
        self.commit_and_then(|_, report| report.clone())
    }

    /// Commit, then run `f` on the new table before the write lock is released
    pub fn commit_and_then<R>(mut self, f: impl FnOnce(&WatchTable, &CommitReport) -> R) -> R {
        let staged = std::mem::take(&mut self.staged);
        let seq = self.db.commit_seq.load(Ordering::Acquire) + 1;

        let mut table = self.db.committed.write();
        let report = staged.apply(&mut table, seq);
        self.db.commit_seq.store(seq, Ordering::Release);
        let table = parking_lot::RwLockWriteGuard::downgrade(table);

        debug!(
            seq,
            started = report.started.len(),
            aborted = report.aborted.len(),
            fetches = report.fetches.len(),
            "committed watch changes"
        );

        let listeners: Vec<Arc<dyn CommitListener>> = self
            .db
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &listeners {
            listener.on_commit(&table, &report);
        }

        f(&table, &report)
    }

    /// Discard the staged buffer
    pub fn rollback(self) {}
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            warn!(staged = self.staged.len(), "transaction rolled back with staged changes");
        }
    }
}
