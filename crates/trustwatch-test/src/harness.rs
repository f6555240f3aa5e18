//! Watch harness - graph, database and controller wired together
//!
//! Every graph mutation runs in one transaction: the graph changes, the
//! controller is told about every identity whose scores may have moved,
//! and the transaction commits.

use std::sync::Arc;

use tracing::debug;
use trustwatch_core::{
    Edition, EditionHint, HintDisposition, IdentityId, RankOracle, WatchResult,
};
use trustwatch_runtime::{Daemon, DownloadContext, DownloadController, WatchConfig};
use trustwatch_state::{CommitReport, Database, Transaction};
use trustwatch_transport::CancelToken;

use crate::{MemoryTrustGraph, RecordingTransport};

/// End-to-end fixture for the downloaders
pub struct WatchHarness {
    graph: Arc<MemoryTrustGraph>,
    database: Arc<Database>,
    transport: Arc<RecordingTransport>,
    controller: DownloadController,
}

impl WatchHarness {
    pub fn new(config: WatchConfig) -> WatchResult<Self> {
        let graph = Arc::new(MemoryTrustGraph::with_threshold(config.direct_trust_threshold));
        let database = Arc::new(Database::new());
        let transport = Arc::new(RecordingTransport::new());
        let ctx = DownloadContext::new(
            graph.clone(),
            Arc::clone(&database),
            transport.clone(),
            config,
        )?;
        Ok(WatchHarness {
            graph,
            database,
            transport,
            controller: DownloadController::new(ctx),
        })
    }

    pub fn graph(&self) -> &MemoryTrustGraph {
        &self.graph
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn transport(&self) -> &RecordingTransport {
        &self.transport
    }

    pub fn controller(&self) -> &DownloadController {
        &self.controller
    }

    pub fn context(&self) -> &Arc<DownloadContext> {
        self.controller.context()
    }

    pub fn start(&self) -> WatchResult<()> {
        self.controller.start()
    }

    pub fn terminate(&self) -> WatchResult<()> {
        self.controller.terminate()
    }

    /// Route every identity of the graph in `tx`
    pub fn rescore(&self, tx: &mut Transaction<'_>) -> WatchResult<()> {
        for id in self.graph.identities() {
            self.controller.on_scores_changed(tx, id)?;
        }
        Ok(())
    }

    pub fn add_root(&self, id: IdentityId) -> WatchResult<CommitReport> {
        let mut tx = self.database.begin();
        self.graph.add_root(id);
        self.rescore(&mut tx)?;
        Ok(tx.commit())
    }

    pub fn add_identity(&self, id: IdentityId) -> WatchResult<CommitReport> {
        let mut tx = self.database.begin();
        self.graph.add_identity(id);
        self.controller.on_identity_added(&mut tx, id)?;
        Ok(tx.commit())
    }

    pub fn remove_identity(&self, id: IdentityId) -> WatchResult<CommitReport> {
        let mut tx = self.database.begin();
        self.controller.on_identity_removed(&mut tx, id);
        self.graph.remove_identity(id);
        self.rescore(&mut tx)?;
        Ok(tx.commit())
    }

    /// Set the edge `truster -> trustee` and commit the rerouting
    pub fn set_trust(
        &self,
        truster: IdentityId,
        trustee: IdentityId,
        value: i16,
    ) -> WatchResult<CommitReport> {
        let mut tx = self.database.begin();
        self.graph.set_trust(truster, trustee, value)?;
        self.rescore(&mut tx)?;
        Ok(tx.commit())
    }

    pub fn remove_trust(&self, truster: IdentityId, trustee: IdentityId) -> WatchResult<CommitReport> {
        let mut tx = self.database.begin();
        self.graph.remove_trust(truster, trustee);
        self.rescore(&mut tx)?;
        Ok(tx.commit())
    }

    /// Edition hint found in imported identity data
    pub fn import_hint(&self, hint: EditionHint) -> WatchResult<HintDisposition> {
        let mut tx = self.database.begin();
        let disposition = self.controller.stage_edition_hint(&mut tx, hint)?;
        tx.commit();
        Ok(disposition)
    }

    /// Polling found `edition` of a subscribed identity
    pub fn discover_edition(&self, target: IdentityId, edition: Edition) -> WatchResult<HintDisposition> {
        let Some(subscription) = self
            .context()
            .client()
            .and_then(|client| client.subscription(target))
        else {
            return Ok(HintDisposition::NotWatched);
        };
        self.controller
            .fast()
            .on_edition_discovered(EditionHint::from_polling(target, edition), &subscription.token)
    }

    /// Token of the currently open request client
    pub fn client_token(&self) -> Option<CancelToken> {
        self.context().client().map(|client| client.token())
    }

    /// The fetch of `id` issued under `token` completed and was imported.
    /// Returns false if the callback was discarded.
    pub fn import_edition(
        &self,
        id: IdentityId,
        edition: Edition,
        token: &CancelToken,
    ) -> WatchResult<bool> {
        self.graph.set_edition(id, edition)?;
        if self.database.is_queued(id) {
            self.controller.slow().on_fetch_complete(id, edition, token)
        } else {
            self.controller.fast().on_fetch_complete(id, edition, token)
        }
    }

    /// Every invariant between graph, committed state and network view
    pub fn check_invariants(&self) -> (bool, Vec<String>) {
        let mut violations = Vec::new();
        let eligibility = self.context().eligibility();

        for id in self.graph.identities() {
            let should = eligibility.should_watch(self.graph.as_ref(), id);
            let watched = self.database.is_watched(id);
            let queued = self.database.is_queued(id);
            if should != watched {
                violations.push(format!(
                    "{} watched={} but best rank {:?}",
                    id,
                    watched,
                    self.graph.best_rank(id)
                ));
            }
            if watched == queued {
                violations.push(format!("{} watched={} queued={}", id, watched, queued));
            }
        }

        for id in self.database.watched() {
            if !self.graph.contains(id) {
                violations.push(format!("{} watched but not in graph", id));
            }
        }
        for id in self.database.queued() {
            if !self.graph.contains(id) {
                violations.push(format!("{} queued but not in graph", id));
            }
        }

        if self.controller.state().is_running() {
            let live = self.transport.live_subscriptions();
            let watched = self.database.watched();
            if live != watched {
                violations.push(format!("subscriptions {:?} != watches {:?}", live, watched));
            }
        }

        if !violations.is_empty() {
            debug!(count = violations.len(), "invariant violations");
        }
        (violations.is_empty(), violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustwatch_core::{RequestPriority, WatchError};
    use trustwatch_runtime::{IdentityDownloader, LifecycleState};

    const R: IdentityId = IdentityId(1);
    const A: IdentityId = IdentityId(2);
    const B: IdentityId = IdentityId(3);

    fn harness() -> WatchHarness {
        let h = WatchHarness::new(WatchConfig::default()).unwrap();
        h.add_root(R).unwrap();
        h.add_identity(A).unwrap();
        h.add_identity(B).unwrap();
        h
    }

    fn assert_invariants(h: &WatchHarness) {
        let (ok, violations) = h.check_invariants();
        assert!(ok, "{:?}", violations);
    }

    #[test]
    fn test_root_trusting_identity_watches_it() {
        let h = harness();
        h.start().unwrap();
        assert!(!h.database().is_watched(A));

        let report = h.set_trust(R, A, 0).unwrap();
        assert_eq!(report.started, vec![A]);
        assert!(h.database().is_watched(A));
        assert_invariants(&h);

        let report = h.remove_trust(R, A).unwrap();
        assert_eq!(report.aborted, vec![A]);
        assert!(!h.database().is_watched(A));
        assert!(h.database().is_queued(A));
        assert_invariants(&h);
    }

    #[test]
    fn test_rank_two_never_watched() {
        let h = harness();
        h.start().unwrap();
        h.set_trust(R, A, 100).unwrap();
        h.set_trust(A, B, 100).unwrap();

        for n in 10..60 {
            let id = IdentityId::new(n);
            h.add_identity(id).unwrap();
            h.set_trust(A, id, 10).unwrap();
            assert!(!h.controller().fast().should_watch(B));
        }
        assert!(!h.database().is_watched(B));
        assert!(h.controller().slow().should_fetch(B));
        assert_invariants(&h);
    }

    #[test]
    fn test_distrust_is_not_watched() {
        let h = harness();
        h.start().unwrap();
        h.set_trust(R, A, -5).unwrap();

        assert!(!h.database().is_watched(A));
        assert_invariants(&h);
    }

    #[test]
    fn test_own_identity_watched() {
        let h = harness();
        h.start().unwrap();

        assert!(h.database().is_watched(R));
        assert_eq!(h.transport().live_subscriptions(), vec![R]);
    }

    #[test]
    fn test_double_start_same_as_single() {
        let h = harness();
        h.graph().set_trust(R, A, 10).unwrap();

        let mut tx = h.database().begin();
        h.controller().fast().stage_start(&mut tx, A).unwrap();
        h.controller().fast().stage_start(&mut tx, A).unwrap();
        let twice = tx.commit();
        assert_eq!(twice.started, vec![A]);
        assert!(h.database().is_watched(A));
    }

    #[test]
    fn test_start_then_abort_leaves_state() {
        let h = harness();
        let before = h.database().watched();

        let mut tx = h.database().begin();
        h.controller().fast().stage_start(&mut tx, B).unwrap();
        h.controller().fast().stage_abort(&mut tx, B).unwrap();
        let report = tx.commit();

        assert!(!report.changes_watches());
        assert_eq!(h.database().watched(), before);
    }

    #[test]
    fn test_hint_never_creates_watch() {
        let h = harness();
        h.start().unwrap();
        h.set_trust(R, A, 10).unwrap();
        h.set_trust(A, B, 10).unwrap();

        let hint = EditionHint::new(A, B, Edition::new(7));
        let mut tx = h.database().begin();
        assert_eq!(
            h.controller().fast().stage_edition_hint(&mut tx, hint).unwrap(),
            HintDisposition::NotWatched
        );
        tx.commit();
        assert!(!h.database().is_watched(B));

        // Through the controller the slow downloader picks it up instead
        assert!(h.import_hint(hint).unwrap().is_scheduled());
        assert!(!h.database().is_watched(B));
        assert_eq!(h.transport().fetches(B), vec![RequestPriority::Polling]);
        assert_invariants(&h);
    }

    #[test]
    fn test_clear_all_then_start_resyncs() {
        let h = harness();
        h.set_trust(R, A, 10).unwrap();
        h.set_trust(A, B, 10).unwrap();
        h.start().unwrap();
        let watched = h.database().watched();
        let queued = h.database().queued();

        h.terminate().unwrap();
        let mut tx = h.database().begin();
        h.controller().clear_all(&mut tx);
        tx.commit();
        assert!(h.database().watched().is_empty());

        h.start().unwrap();
        assert_eq!(h.database().watched(), watched);
        assert_eq!(h.database().queued(), queued);
        assert_invariants(&h);
    }

    #[test]
    fn test_terminate_then_start_restores_watch_set() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        h.start().unwrap();
        let before = h.database().watched();
        let seq = h.database().commit_seq();

        h.terminate().unwrap();
        assert_eq!(h.controller().state(), LifecycleState::Stopped);
        assert!(h.transport().live_subscriptions().is_empty());
        assert_eq!(h.database().commit_seq(), seq);

        h.start().unwrap();
        assert_eq!(h.database().watched(), before);
        assert_eq!(h.transport().live_subscriptions(), before);
        assert_invariants(&h);
    }

    #[test]
    fn test_changes_while_stopped_apply_on_start() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        assert!(h.transport().is_empty());
        assert!(h.database().is_watched(A));

        h.start().unwrap();
        assert_eq!(h.transport().live_subscriptions(), vec![R, A]);
    }

    #[test]
    fn test_discovered_edition_fetched_then_imported() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        h.start().unwrap();

        assert!(h.discover_edition(A, Edition::new(2)).unwrap().is_scheduled());
        assert_eq!(h.transport().fetches(A), vec![RequestPriority::Progress]);

        let token = h.client_token().unwrap();
        assert!(h.import_edition(A, Edition::new(2), &token).unwrap());
        assert_eq!(h.database().entry(A).unwrap().pending_fetch, None);
        assert_eq!(
            h.discover_edition(A, Edition::new(2)).unwrap(),
            HintDisposition::Stale
        );
    }

    #[test]
    fn test_callback_after_terminate_discarded() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        h.start().unwrap();
        let token = h.context().client().unwrap().subscription(A).unwrap().token;

        h.terminate().unwrap();
        let hint = EditionHint::from_polling(A, Edition::new(9));
        assert_eq!(
            h.controller().fast().on_edition_discovered(hint, &token).unwrap(),
            HintDisposition::Cancelled
        );
        assert_eq!(h.database().entry(A).unwrap().latest_hint, None);
    }

    #[test]
    fn test_unknown_identity_rejected() {
        let h = harness();
        let ghost = IdentityId::new(999);

        let mut tx = h.database().begin();
        assert_eq!(
            h.controller().on_scores_changed(&mut tx, ghost),
            Err(WatchError::NoSuchIdentity(ghost))
        );
        assert_eq!(
            h.controller().fast().stage_abort(&mut tx, ghost),
            Err(WatchError::NoSuchIdentity(ghost))
        );
        tx.rollback();
        assert!(!h.controller().should_fetch(ghost));
    }

    #[test]
    fn test_removed_identity_unsubscribed() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        h.start().unwrap();

        h.remove_identity(A).unwrap();
        assert!(!h.database().is_watched(A));
        assert!(!h.database().is_queued(A));
        assert_eq!(h.transport().live_subscriptions(), vec![R]);
        assert_invariants(&h);
    }

    #[test]
    fn test_transport_failure_counted() {
        let h = harness();
        h.start().unwrap();
        h.transport().set_failing(true);

        h.set_trust(R, A, 30).unwrap();
        assert!(h.database().is_watched(A));
        assert_eq!(h.controller().fast().stats().request_failures, 1);
        h.transport().set_failing(false);

        // The next commit resubscribes without a restart
        h.set_trust(R, B, -20).unwrap();
        assert_invariants(&h);
        assert_eq!(h.transport().live_subscriptions(), vec![R, A]);

        h.terminate().unwrap();
        h.start().unwrap();
        assert_invariants(&h);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = WatchConfig {
            direct_trust_threshold: -10,
            ..WatchConfig::default()
        };
        assert!(matches!(
            WatchHarness::new(config),
            Err(WatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bulk_fetch_callback_after_terminate_discarded() {
        let h = harness();
        h.set_trust(R, A, 30).unwrap();
        h.set_trust(A, B, 30).unwrap();
        h.start().unwrap();
        let token = h.client_token().unwrap();

        assert!(h.import_hint(EditionHint::new(A, B, Edition::new(4))).unwrap().is_scheduled());
        assert_eq!(h.database().bulk_entry(B).unwrap().pending_fetch, Some(Edition::new(4)));

        h.terminate().unwrap();
        let seq = h.database().commit_seq();
        assert!(!h.import_edition(B, Edition::new(4), &token).unwrap());

        assert_eq!(h.database().commit_seq(), seq);
        assert_eq!(h.database().bulk_entry(B).unwrap().pending_fetch, Some(Edition::new(4)));
    }
}
