//! Fast downloader - continuous polling of directly trusted identities
//!
//! Subscribes to every identity some root scores at rank <= 1. Subscriptions
//! make the network poll constantly, so this is deliberately only a small
//! subset of the graph; the slow downloader covers the rest.
//!
//! Staging never talks to the network. A commit listener turns each commit
//! report into subscribe/unsubscribe/fetch requests on the shared client.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use trustwatch_core::{
    Edition, EditionHint, HintDisposition, IdentityId, RequestPriority, WatchResult,
};
use trustwatch_state::{CommitListener, CommitReport, ListenerId, Staged, Transaction, WatchTable};
use trustwatch_transport::{CancelToken, RequestClient};

use crate::{Daemon, DownloadContext, IdentityDownloader, LifecycleState};

/// Counters of committed downloader effects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloaderStats {
    pub subscriptions_started: u64,
    pub subscriptions_cancelled: u64,
    pub fetches_issued: u64,
    pub request_failures: u64,
    pub callbacks_discarded: u64,
    pub resyncs: u64,
}

/// Outcome of a full resync against the rank oracle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    /// Identities evaluated
    pub examined: usize,
    /// Starts staged
    pub started: usize,
    /// Aborts staged for identities no longer eligible
    pub aborted: usize,
    /// Aborts staged for identities no longer in the graph
    pub removed: usize,
}

impl ResyncSummary {
    pub fn merge(self, other: ResyncSummary) -> ResyncSummary {
        ResyncSummary {
            examined: self.examined + other.examined,
            started: self.started + other.started,
            aborted: self.aborted + other.aborted,
            removed: self.removed + other.removed,
        }
    }
}

/// Turns fast-downloader commit reports into network requests
struct FastListener {
    ctx: Arc<DownloadContext>,
    stats: Arc<Mutex<DownloaderStats>>,
}

impl FastListener {
    fn issue(&self, client: &RequestClient, table: &WatchTable, report: &CommitReport) {
        let mut stats = self.stats.lock();

        for id in &report.aborted {
            match client.unsubscribe(*id) {
                Ok(true) => stats.subscriptions_cancelled += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.request_failures += 1;
                    warn!(identity = %id, error = %e, "unsubscribe failed");
                }
            }
        }

        // Newly started watches, plus any whose subscribe failed earlier
        for (id, _) in table.iter() {
            if client.is_subscribed(*id) {
                continue;
            }
            match client.subscribe(*id, self.ctx.current_edition(*id)) {
                Ok(_) => stats.subscriptions_started += 1,
                Err(e) => {
                    stats.request_failures += 1;
                    warn!(identity = %id, error = %e, "subscribe failed, retried on next commit");
                }
            }
        }

        for fetch in &report.fetches {
            match client.fetch(fetch.identity, fetch.edition, RequestPriority::Progress) {
                Ok(_) => stats.fetches_issued += 1,
                Err(e) => {
                    stats.request_failures += 1;
                    warn!(identity = %fetch.identity, edition = %fetch.edition, error = %e, "fetch failed");
                }
            }
        }
    }
}

impl CommitListener for FastListener {
    fn on_commit(&self, table: &WatchTable, report: &CommitReport) {
        match self.ctx.client() {
            Some(client) => self.issue(&client, table, report),
            None => trace!(seq = report.seq, "no request client, commit left for next start"),
        }
    }
}

/// Selective identity downloader
pub struct FastDownloader {
    ctx: Arc<DownloadContext>,
    state: Mutex<LifecycleState>,
    /// Held for the whole of start/terminate
    transition: Mutex<()>,
    listener: Arc<FastListener>,
    listener_id: Mutex<Option<ListenerId>>,
    stats: Arc<Mutex<DownloaderStats>>,
}

impl FastDownloader {
    pub fn new(ctx: Arc<DownloadContext>) -> Self {
        let stats = Arc::new(Mutex::new(DownloaderStats::default()));
        FastDownloader {
            listener: Arc::new(FastListener {
                ctx: Arc::clone(&ctx),
                stats: Arc::clone(&stats),
            }),
            ctx,
            state: Mutex::new(LifecycleState::Stopped),
            transition: Mutex::new(()),
            listener_id: Mutex::new(None),
            stats,
        }
    }

    /// Is `identity` eligible for continuous polling?
    pub fn should_watch(&self, identity: IdentityId) -> bool {
        self.ctx
            .eligibility()
            .should_watch(self.ctx.oracle(), identity)
    }

    pub fn stats(&self) -> DownloaderStats {
        self.stats.lock().clone()
    }

    pub fn context(&self) -> &Arc<DownloadContext> {
        &self.ctx
    }

    /// Stage whatever makes the watch set match current scores
    pub fn stage_resync(&self, tx: &mut Transaction<'_>) -> ResyncSummary {
        let oracle = self.ctx.oracle();
        let eligibility = self.ctx.eligibility();
        let mut summary = ResyncSummary::default();

        for id in oracle.identities() {
            summary.examined += 1;
            let should = eligibility.should_watch(oracle, id);
            let watched = tx.is_watched(id);
            if should && !watched {
                tx.stage_start(id);
                summary.started += 1;
            } else if !should && watched {
                tx.stage_abort(id);
                summary.aborted += 1;
            }
        }

        for id in tx.committed_watched() {
            if !oracle.contains(id) && tx.is_watched(id) {
                tx.stage_abort(id);
                summary.removed += 1;
            }
        }

        summary
    }

    /// Polling callback: the network saw a new edition of a subscribed identity.
    ///
    /// Runs under its own transaction. Discarded once `token` is cancelled.
    pub fn on_edition_discovered(
        &self,
        hint: EditionHint,
        token: &CancelToken,
    ) -> WatchResult<HintDisposition> {
        let mut tx = self.ctx.database().begin();
        if token.is_cancelled() {
            self.stats.lock().callbacks_discarded += 1;
            debug!(identity = %hint.target, "edition callback from cancelled request");
            return Ok(HintDisposition::Cancelled);
        }
        let disposition = self.stage_edition_hint(&mut tx, hint)?;
        tx.commit();
        Ok(disposition)
    }

    /// Fetch callback: the payload of `edition` was imported into the graph
    pub fn on_fetch_complete(
        &self,
        identity: IdentityId,
        edition: Edition,
        token: &CancelToken,
    ) -> WatchResult<bool> {
        let mut tx = self.ctx.database().begin();
        if token.is_cancelled() {
            self.stats.lock().callbacks_discarded += 1;
            debug!(identity = %identity, "fetch callback from cancelled request");
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
        debug!(%from, to = %next, "fast downloader lifecycle");
        *state = next;
    }

    fn start_inner(&self) -> WatchResult<ResyncSummary> {
        let mut tx = self.ctx.database().begin();
        let summary = self.stage_resync(&mut tx);

        tx.commit_and_then(|table, _| -> WatchResult<ResyncSummary> {
            let client = self.ctx.clients().open(self.ctx.transport())?;
            for (id, _) in table.iter() {
                client.subscribe(*id, self.ctx.current_edition(*id))?;
            }
            let pending = table.pending_fetches();
            for (id, edition) in &pending {
                client.fetch(*id, *edition, RequestPriority::Progress)?;
            }

            let mut stats = self.stats.lock();
            stats.subscriptions_started += table.len() as u64;
            stats.fetches_issued += pending.len() as u64;
            stats.resyncs += 1;
            drop(stats);

            let lid = self
                .ctx
                .database()
                .register_listener(Arc::clone(&self.listener) as Arc<dyn CommitListener>);
            *self.listener_id.lock() = Some(lid);
            Ok(summary)
        })
    }
}

impl IdentityDownloader for FastDownloader {
    fn stage_start(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()> {
        self.ctx.require_identity(identity)?;
        tx.stage_start(identity);
        Ok(())
    }

    fn stage_abort(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()> {
        self.ctx.require_identity(identity)?;
        tx.stage_abort(identity);
        Ok(())
    }

    fn stage_edition_hint(
        &self,
        tx: &mut Transaction<'_>,
        hint: EditionHint,
    ) -> WatchResult<HintDisposition> {
        let target = hint.target;
        self.ctx.require_identity(target)?;

        if !tx.is_watched(target) {
            trace!(identity = %target, edition = %hint.edition, "hint for unwatched identity dropped");
            return Ok(HintDisposition::NotWatched);
        }

        let current = self.ctx.oracle().current_edition(target)?;
        let seen = tx.committed_entry(target).and_then(|e| e.latest_hint);
        if !hint.advances(current) || seen.is_some_and(|seen| !hint.advances(seen)) {
            trace!(identity = %target, edition = %hint.edition, %current, "stale hint");
            return Ok(HintDisposition::Stale);
        }

        match tx.stage_hint(target, hint.edition) {
            Staged::Duplicate => Ok(HintDisposition::Stale),
            _ => Ok(HintDisposition::Scheduled),
        }
    }

    fn should_fetch(&self, identity: IdentityId) -> bool {
        self.ctx.database().is_watched(identity)
    }

    fn clear_all(&self, tx: &mut Transaction<'_>) {
        tx.stage_clear_watches();
    }
}

impl Daemon for FastDownloader {
    /// Open the shared request client and resync the watch set.
    ///
    /// Must not be called while the caller holds a transaction.
    fn start(&self) -> WatchResult<()> {
        let _transition = self.transition.lock();
        if self.state().is_running() {
            return Ok(());
        }

        self.set_state(LifecycleState::Starting);
        match self.start_inner() {
            Ok(summary) => {
                self.set_state(LifecycleState::Running);
                info!(
                    watched = self.ctx.database().watched().len(),
                    started = summary.started,
                    aborted = summary.aborted + summary.removed,
                    "fast downloader started"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(close) = self.ctx.clients().close() {
                    warn!(error = %close, "closing request client after failed start");
                }
                self.set_state(LifecycleState::Stopped);
                warn!(error = %e, "fast downloader failed to start");
                Err(e)
            }
        }
    }

    /// Close the shared request client, leaving committed watches untouched.
    ///
    /// Waits for in-flight transactions; no callback mutates state after
    /// this returns.
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
        let closed = self.ctx.clients().close();
        drop(tx);

        self.set_state(LifecycleState::Stopped);
        info!(watched = self.ctx.database().watched().len(), "fast downloader terminated");
        closed.map(|_| ())
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }
}
