//! Downloader capability shared by the fast and slow variants

use trustwatch_core::{EditionHint, HintDisposition, IdentityId, WatchResult};
use trustwatch_state::Transaction;

/// Which variant covers an identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DownloaderKind {
    /// Continuous polling of directly trusted identities
    Fast,
    /// Hint-driven fetching of everyone else
    Slow,
}

/// Staging interface of an identity downloader.
///
/// Every method stages into the caller's transaction and never commits it.
/// Staging for an identity absent from the trust graph fails with
/// `NoSuchIdentity`; the caller is expected to roll back.
pub trait IdentityDownloader: Send + Sync {
    /// Start downloading `identity`. Idempotent within a transaction.
    fn stage_start(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()>;

    /// Stop downloading `identity`. Idempotent within a transaction.
    fn stage_abort(&self, tx: &mut Transaction<'_>, identity: IdentityId) -> WatchResult<()>;

    /// Schedule a fetch of a hinted edition, if the target is covered
    fn stage_edition_hint(
        &self,
        tx: &mut Transaction<'_>,
        hint: EditionHint,
    ) -> WatchResult<HintDisposition>;

    /// Is `identity` covered as of the last commit?
    fn should_fetch(&self, identity: IdentityId) -> bool;

    /// Drop every command of this downloader
    fn clear_all(&self, tx: &mut Transaction<'_>);
}
