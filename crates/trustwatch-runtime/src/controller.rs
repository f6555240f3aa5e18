//! Download controller - routes identities to the fast or slow downloader
//!
//! The trust graph calls in whenever scores of an identity change. The
//! controller evaluates eligibility once and stages a start on the variant
//! that should cover the identity and an abort on the other, all in the
//! caller's transaction.

use std::sync::Arc;

use tracing::{debug, info};
use trustwatch_core::{EditionHint, HintDisposition, IdentityId, WatchResult};
use trustwatch_state::Transaction;

use crate::{
    Daemon, DownloadContext, DownloaderKind, FastDownloader, IdentityDownloader, LifecycleState,
    ResyncSummary, SlowDownloader,
};

/// Owner of both downloader variants
pub struct DownloadController {
    ctx: Arc<DownloadContext>,
    fast: FastDownloader,
    slow: SlowDownloader,
}

impl DownloadController {
    pub fn new(ctx: Arc<DownloadContext>) -> Self {
        DownloadController {
            fast: FastDownloader::new(Arc::clone(&ctx)),
            slow: SlowDownloader::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn fast(&self) -> &FastDownloader {
        &self.fast
    }

    pub fn slow(&self) -> &SlowDownloader {
        &self.slow
    }

    pub fn context(&self) -> &Arc<DownloadContext> {
        &self.ctx
    }

    /// Variant that should cover `identity` under current scores
    pub fn route(&self, identity: IdentityId) -> DownloaderKind {
        if self.fast.should_watch(identity) {
            DownloaderKind::Fast
        } else {
            DownloaderKind::Slow
        }
    }

    /// Scores of `identity` changed (trust edge added, removed or rescored)
    pub fn on_scores_changed(
        &self,
        tx: &mut Transaction<'_>,
        identity: IdentityId,
    ) -> WatchResult<DownloaderKind> {
        self.ctx.require_identity(identity)?;
        let kind = self.route(identity);

        // Only stage commands that flip this transaction's view, so a later
        // opposite change cancels back to the committed state.
        match kind {
            DownloaderKind::Fast => {
                if tx.is_queued(identity) {
                    self.slow.stage_abort(tx, identity)?;
                }
                if !tx.is_watched(identity) {
                    self.fast.stage_start(tx, identity)?;
                }
            }
            DownloaderKind::Slow => {
                if tx.is_watched(identity) {
                    self.fast.stage_abort(tx, identity)?;
                }
                if !tx.is_queued(identity) {
                    self.slow.stage_start(tx, identity)?;
                }
            }
        }
        debug!(identity = %identity, ?kind, "identity routed");
        Ok(kind)
    }

    /// New identity added to the graph
    pub fn on_identity_added(
        &self,
        tx: &mut Transaction<'_>,
        identity: IdentityId,
    ) -> WatchResult<DownloaderKind> {
        self.on_scores_changed(tx, identity)
    }

    /// Identity about to be deleted from the graph.
    ///
    /// Stages removal from both variants without checking the graph, since
    /// the deletion may already be staged there.
    pub fn on_identity_removed(&self, tx: &mut Transaction<'_>, identity: IdentityId) {
        if tx.is_watched(identity) {
            tx.stage_abort(identity);
        }
        if tx.is_queued(identity) {
            tx.stage_dequeue(identity);
        }
    }

    /// Edition hint from imported identity data; routed to whichever
    /// variant covers the target in this transaction
    pub fn stage_edition_hint(
        &self,
        tx: &mut Transaction<'_>,
        hint: EditionHint,
    ) -> WatchResult<HintDisposition> {
        if tx.is_watched(hint.target) {
            self.fast.stage_edition_hint(tx, hint)
        } else {
            self.slow.stage_edition_hint(tx, hint)
        }
    }

    /// Is `identity` covered by either variant as of the last commit?
    pub fn should_fetch(&self, identity: IdentityId) -> bool {
        self.fast.should_fetch(identity) || self.slow.should_fetch(identity)
    }

    /// Drop every command of both variants
    pub fn clear_all(&self, tx: &mut Transaction<'_>) {
        self.fast.clear_all(tx);
        self.slow.clear_all(tx);
    }

    /// Stage a full resync of both variants against current scores
    pub fn stage_resync(&self, tx: &mut Transaction<'_>) -> ResyncSummary {
        let fast = self.fast.stage_resync(tx);
        let slow = self.slow.stage_resync(tx);
        info!(
            examined = fast.examined,
            watch_changes = fast.started + fast.aborted + fast.removed,
            queue_changes = slow.started + slow.aborted + slow.removed,
            "resync staged"
        );
        fast.merge(slow)
    }
}

impl Daemon for DownloadController {
    fn start(&self) -> WatchResult<()> {
        self.fast.start()?;
        if let Err(e) = self.slow.start() {
            self.fast.terminate()?;
            return Err(e);
        }
        Ok(())
    }

    fn terminate(&self) -> WatchResult<()> {
        self.slow.terminate()?;
        self.fast.terminate()
    }

    /// Running only once both variants are; a half-started pair reports
    /// `Stopped` so `start()` is retried
    fn state(&self) -> LifecycleState {
        use LifecycleState::*;
        match (self.fast.state(), self.slow.state()) {
            (fast, slow) if fast == slow => fast,
            (Stopping, _) | (_, Stopping) => Stopping,
            (Starting, _) | (_, Starting) => Starting,
            _ => Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, id};
    use trustwatch_core::{Edition, RequestPriority};
    use trustwatch_transport::NetworkRequest;

    #[test]
    fn test_rescoring_moves_identity_between_variants() {
        let f = fixture();
        f.oracle.add(id(1), &[2]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));
        controller.start().unwrap();
        assert_eq!(f.database.queued(), vec![id(1)]);

        f.oracle.add(id(1), &[1]);
        let mut tx = f.database.begin();
        assert_eq!(
            controller.on_scores_changed(&mut tx, id(1)).unwrap(),
            DownloaderKind::Fast
        );
        tx.commit();
        assert_eq!(f.database.watched(), vec![id(1)]);
        assert!(f.database.queued().is_empty());
        assert_eq!(f.transport.count(|r| matches!(r, NetworkRequest::Subscribe { .. })), 1);

        f.oracle.add(id(1), &[2]);
        let mut tx = f.database.begin();
        assert_eq!(
            controller.on_scores_changed(&mut tx, id(1)).unwrap(),
            DownloaderKind::Slow
        );
        tx.commit();
        assert!(f.database.watched().is_empty());
        assert_eq!(f.database.queued(), vec![id(1)]);
        assert_eq!(f.transport.count(|r| matches!(r, NetworkRequest::Unsubscribe { .. })), 1);
    }

    #[test]
    fn test_opposite_changes_in_one_transaction_cancel() {
        let f = fixture();
        f.oracle.add(id(1), &[2]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));
        controller.start().unwrap();
        let seq = f.database.commit_seq();

        let mut tx = f.database.begin();
        f.oracle.add(id(1), &[1]);
        controller.on_scores_changed(&mut tx, id(1)).unwrap();
        f.oracle.add(id(1), &[2]);
        controller.on_scores_changed(&mut tx, id(1)).unwrap();
        let report = tx.commit();

        assert!(report.is_empty());
        assert_eq!(f.database.commit_seq(), seq + 1);
        assert_eq!(f.database.queued(), vec![id(1)]);
        assert!(f.database.watched().is_empty());
    }

    #[test]
    fn test_removed_identity_leaves_both_variants() {
        let f = fixture();
        f.oracle.add(id(1), &[1]);
        f.oracle.add(id(2), &[4]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));
        controller.start().unwrap();

        let mut tx = f.database.begin();
        controller.on_identity_removed(&mut tx, id(1));
        controller.on_identity_removed(&mut tx, id(2));
        f.oracle.remove(id(1));
        f.oracle.remove(id(2));
        tx.commit();

        assert!(!controller.should_fetch(id(1)));
        assert!(!controller.should_fetch(id(2)));
    }

    #[test]
    fn test_clear_all_then_start_restores_coverage() {
        let f = fixture();
        f.oracle.add(id(1), &[1]);
        f.oracle.add(id(2), &[2]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));

        controller.start().unwrap();
        controller.terminate().unwrap();
        let mut tx = f.database.begin();
        controller.clear_all(&mut tx);
        tx.commit();
        assert!(f.database.watched().is_empty());
        assert!(f.database.queued().is_empty());

        controller.start().unwrap();
        assert_eq!(f.database.watched(), vec![id(1)]);
        assert_eq!(f.database.queued(), vec![id(2)]);
        assert_eq!(controller.state(), LifecycleState::Running);
    }

    #[test]
    fn test_hint_routed_to_covering_variant() {
        let f = fixture();
        f.oracle.add(id(1), &[1]);
        f.oracle.add(id(2), &[2]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));
        controller.start().unwrap();

        let mut tx = f.database.begin();
        let to_fast = EditionHint::new(id(2), id(1), Edition::new(1));
        let to_slow = EditionHint::new(id(1), id(2), Edition::new(1));
        assert!(controller.stage_edition_hint(&mut tx, to_fast).unwrap().is_scheduled());
        assert!(controller.stage_edition_hint(&mut tx, to_slow).unwrap().is_scheduled());
        tx.commit();

        assert_eq!(
            f.transport.count(|r| matches!(
                r,
                NetworkRequest::Fetch { priority: RequestPriority::Progress, .. }
            )),
            1
        );
        assert_eq!(
            f.transport.count(|r| matches!(
                r,
                NetworkRequest::Fetch { priority: RequestPriority::Polling, .. }
            )),
            1
        );
    }

    #[test]
    fn test_state_requires_both_variants() {
        let f = fixture();
        f.oracle.add(id(1), &[1]);
        let controller = DownloadController::new(Arc::clone(&f.ctx));

        controller.fast().start().unwrap();
        assert_eq!(controller.state(), LifecycleState::Stopped);

        controller.start().unwrap();
        assert_eq!(controller.state(), LifecycleState::Running);

        controller.slow().terminate().unwrap();
        assert!(!controller.state().is_running());

        controller.terminate().unwrap();
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }
}
