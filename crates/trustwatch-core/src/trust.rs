//! Trust graph facts
//!
//! Trust edges are assigned by identities; scores are derived from them by the
//! trust graph and consumed here read-only.

use std::fmt;

use crate::{IdentityId, WatchError, WatchResult};

/// Lowest trust value an identity can assign
pub const MIN_TRUST_VALUE: i8 = -100;

/// Highest trust value an identity can assign
pub const MAX_TRUST_VALUE: i8 = 100;

/// Trust values at or above this count as direct trust for rank 1
pub const DEFAULT_DIRECT_TRUST_THRESHOLD: i8 = 0;

/// Rank - graph distance from a root identity
///
/// 0 = the identity is the root itself, 1 = directly trusted by the root,
/// 2 and above = reached only through intermediate identities.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rank(pub u32);

impl Rank {
    /// A root identity's rank for itself
    pub const SELF: Rank = Rank(0);
    /// Directly trusted by a root identity
    pub const DIRECT: Rank = Rank(1);

    #[inline]
    pub fn new(rank: u32) -> Self {
        Rank(rank)
    }

    /// The rank of identities trusted by an identity of this rank
    #[inline]
    pub fn next(self) -> Self {
        Rank(self.0.saturating_add(1))
    }

    #[inline]
    pub fn is_direct(self) -> bool {
        self <= Rank::DIRECT
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({})", self.0)
    }
}

/// Directed, signed trust edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Trust {
    pub truster: IdentityId,
    pub trustee: IdentityId,
    value: i8,
}

impl Trust {
    /// Create a trust edge, rejecting values outside the allowed range
    pub fn new(truster: IdentityId, trustee: IdentityId, value: i16) -> WatchResult<Self> {
        if value < MIN_TRUST_VALUE as i16 || value > MAX_TRUST_VALUE as i16 {
            return Err(WatchError::InvalidTrustValue(value));
        }
        Ok(Trust {
            truster,
            trustee,
            value: value as i8,
        })
    }

    #[inline]
    pub fn value(&self) -> i8 {
        self.value
    }

    /// Does this edge count as direct trust under the given threshold?
    #[inline]
    pub fn is_direct_trust(&self, threshold: i8) -> bool {
        self.value >= threshold
    }
}

/// Score a root identity assigns to a target identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Score {
    /// The locally controlled root identity
    pub root: IdentityId,
    /// The scored identity
    pub target: IdentityId,
    /// Graph distance from root to target
    pub rank: Rank,
    /// Aggregated score value
    pub value: i32,
}

impl Score {
    pub fn new(root: IdentityId, target: IdentityId, rank: Rank, value: i32) -> Self {
        Score {
            root,
            target,
            rank,
            value,
        }
    }
}
