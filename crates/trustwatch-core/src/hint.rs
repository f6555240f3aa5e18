//! Edition hints
//!
//! Polling reports that an identity may have published a newer edition.
//! Hints are unauthenticated: they only ever schedule a fetch, they never
//! change what is watched.

use crate::{Edition, IdentityId};

/// Observation that `target` has published `edition`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EditionHint {
    /// Identity whose data carried the hint (the target itself for polling results)
    pub source: IdentityId,
    /// Identity the hint is about
    pub target: IdentityId,
    /// Claimed edition
    pub edition: Edition,
}

impl EditionHint {
    pub fn new(source: IdentityId, target: IdentityId, edition: Edition) -> Self {
        EditionHint {
            source,
            target,
            edition,
        }
    }

    /// Hint produced by polling the target's own subscription
    pub fn from_polling(target: IdentityId, edition: Edition) -> Self {
        Self::new(target, target, edition)
    }

    /// Does this hint claim an edition newer than `current`?
    #[inline]
    pub fn advances(&self, current: Edition) -> bool {
        self.edition.is_newer_than(current)
    }
}

/// What happened to a staged edition hint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HintDisposition {
    /// A fetch will be scheduled on commit
    Scheduled,
    /// The hinted edition is not newer than what is already known
    Stale,
    /// The target is not covered by the downloader, the hint was dropped
    NotWatched,
    /// The request that produced the hint has been cancelled
    Cancelled,
}

impl HintDisposition {
    pub fn is_scheduled(self) -> bool {
        matches!(self, HintDisposition::Scheduled)
    }
}
