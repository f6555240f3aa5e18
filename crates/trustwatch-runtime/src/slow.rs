//! Slow downloader - hint-driven fetching of identities not polled
//!
//! Covers every identity of the graph the fast downloader does not watch.
//! It never subscribes: a queued identity is only fetched when an edition
//! hint for it arrives, at polling priority on the shared request client.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use trustwatch_core::{
    Edition, EditionHint, HintDisposition, IdentityId, RequestPriority, WatchResult,
};
use trustwatch_state::{CommitListener, CommitReport, ListenerId, Staged, Transaction, WatchTable};
use trustwatch_transport::CancelToken;

use crate::{Daemon, DownloadContext, IdentityDownloader, LifecycleState, ResyncSummary};

struct SlowListener {
    ctx: Arc<DownloadContext>,
}

impl CommitListener for SlowListener {
    fn on_commit(&self, _table: &WatchTable, report: &CommitReport) {
        if report.bulk_fetches.is_empty() {
            return;
        }
        let Some(client) = self.ctx.client() else {
            trace!(seq = report.seq, "no request client, bulk fetches left for next start");
            return;
        };
        for fetch in &report.bulk_fetches {
            if let Err(e) = client.fetch(fetch.identity, fetch.edition, RequestPriority::Polling) {
                warn!(identity = %fetch.identity, error = %e, "bulk fetch failed");
            }
        }
    }
}

/// Bulk identity downloader
pub struct SlowDownloader {
    ctx: Arc<DownloadContext>,
    state: Mutex<LifecycleState>,
    transition: Mutex<()>,
    listener: Arc<SlowListener>,
    listener_id: Mutex<Option<ListenerId>>,
}

impl SlowDownloader {
    pub fn new(ctx: Arc<DownloadContext>) -> Self {
        SlowDownloader {
            listener: Arc::new(SlowListener {
                ctx: Arc::clone(&ctx),
            }),
            ctx,
            state: Mutex::new(LifecycleState::Stopped),
            transition: Mutex::new(()),
            listener_id: Mutex::new(None),
        }
    }

    /// Stage whatever makes the queue cover exactly the identities the fast
    /// downloader does not
    pub fn stage_resync(&self, tx: &mut Transaction<'_>) -> ResyncSummary {
        let oracle = self.ctx.oracle();
        let eligibility = self.ctx.eligibility();
        let mut summary = ResyncSummary::default();

        for id in oracle.identities() {
            summary.examined += 1;
            let should = !eligibility.should_watch(oracle, id);
            let queued = tx.is_queued(id);
            if should && !queued {
                tx.stage_queue(id);
                summary.started += 1;
            } else if !should && queued {
                tx.stage_dequeue(id);
                summary.aborted += 1;
            }
        }

        for id in tx.committed_queued() {
            if !oracle.contains(id) && tx.is_queued(id) {
                tx.stage_dequeue(id);
                summary.removed += 1;
            }
        }

        summary
    }

    /// Fetch callback: the payload of `edition` was imported into the graph.
    ///
    /// Discarded once `token` is cancelled.
    pub fn on_fetch_complete(
        &self,
        identity: IdentityId,
        edition: Edition,
        token: &CancelToken,
    ) -> WatchResult<bool> {
        let mut tx = self.ctx.database().begin();
        if token.is_cancelled() {
            debug!(identity = %identity, "bulk fetch callback from cancelled request");
            return Ok(false);
        }
        self.ctx.require_identity(identity)?;
        tx.stage_fetched(identity, edition);
        tx.commit();
        Ok(true)
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        let from = *state;
        debug_assert!(from.can_transition_to(next), "{} -> {}", from, next);
        debug!(%from, to = %next, "slow downloader lifecycle");
        *state = next;
    }
}

impl IdentityDownloader for SlowDownloader {
    fn stage_start(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()> {
        self.ctx.require_identity(identity)?;
        if tx.is_watched(identity) {
            debug!(identity = %identity, "already polled by fast downloader, not queued");
            return Ok(());
        }
        tx.stage_queue(identity);
        Ok(())
    }

    fn stage_abort(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()> {
        self.ctx.require_identity(identity)?;
        tx.stage_dequeue(identity);
        Ok(())
    }

    fn stage_edition_hint(
        &self,
        tx: &mut Transaction<'_>,
        hint: EditionHint,
    ) -> WatchResult<HintDisposition> {
        let target = hint.target;
        self.ctx.require_identity(target)?;
        if !tx.is_queued(target) {
            return Ok(HintDisposition::NotWatched);
        }
        if !hint.advances(self.ctx.oracle().current_edition(target)?) {
            return Ok(HintDisposition::Stale);
        }
        match tx.stage_hint(target, hint.edition) {
            Staged::Duplicate => Ok(HintDisposition::Stale),
            _ => Ok(HintDisposition::Scheduled),
        }
    }

    fn should_fetch(&self, identity: IdentityId) -> bool {
        self.ctx.database().is_queued(identity)
    }

    fn clear_all(&self, tx: &mut Transaction<'_>) {
        tx.stage_clear_bulk();
    }
}

impl Daemon for SlowDownloader {
    /// Resync the queue and re-issue interrupted bulk fetches.
    ///
    /// Uses the request client opened by the fast downloader; without one,
    /// fetches wait in the committed queue.
    fn start(&self) -> WatchResult<()> {
        let _transition = self.transition.lock();
        if self.state().is_running() {
            return Ok(());
        }
        self.set_state(LifecycleState::Starting);

        let mut tx = self.ctx.database().begin();
        let summary = self.stage_resync(&mut tx);
        let issued = tx.commit_and_then(|table, _| -> WatchResult<usize> {
            let pending = table.pending_bulk_fetches();
            if let Some(client) = self.ctx.client() {
                for (id, edition) in &pending {
                    client.fetch(*id, *edition, RequestPriority::Polling)?;
                }
            }
            let lid = self
                .ctx
                .database()
                .register_listener(Arc::clone(&self.listener) as Arc<dyn CommitListener>);
            *self.listener_id.lock() = Some(lid);
            Ok(pending.len())
        });

        match issued {
            Ok(issued) => {
                self.set_state(LifecycleState::Running);
                info!(
                    queued = self.ctx.database().queued().len(),
                    dequeued = summary.aborted + summary.removed,
                    refetched = issued,
                    "slow downloader started"
                );
                Ok(())
            }
            Err(e) => {
                if let Some(lid) = self.listener_id.lock().take() {
                    self.ctx.database().unregister_listener(lid);
                }
                self.set_state(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    fn terminate(&self) -> WatchResult<()> {
        let _transition = self.transition.lock();
        if self.state() == LifecycleState::Stopped {
            return Ok(());
        }
        self.set_state(LifecycleState::Stopping);
        let tx = self.ctx.database().begin();
        if let Some(lid) = self.listener_id.lock().take() {
            self.ctx.database().unregister_listener(lid);
        }
        drop(tx);
        self.set_state(LifecycleState::Stopped);
        info!("slow downloader terminated");
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }
}
