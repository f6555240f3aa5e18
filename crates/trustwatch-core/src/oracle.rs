//! Rank oracle - read-only view of the trust graph

use crate::{Edition, IdentityId, Score, WatchResult};

/// Read-only access to committed trust graph scores
///
/// Implementations answer from the most recently committed graph snapshot.
/// Every method must be safe to call concurrently.
pub trait RankOracle: Send + Sync {
    /// All scores assigned to `identity`, one per root that reaches it.
    ///
    /// Fails with `NoSuchIdentity` if the identity is not in the graph.
    fn scores(&self, identity: IdentityId) -> WatchResult<Vec<Score>>;

    /// Latest edition of `identity` that has been imported into the graph
    fn current_edition(&self, identity: IdentityId) -> WatchResult<Edition>;

    /// Every identity currently in the graph
    fn identities(&self) -> Vec<IdentityId>;

    /// Is `identity` present in the graph?
    fn contains(&self, identity: IdentityId) -> bool;
}
