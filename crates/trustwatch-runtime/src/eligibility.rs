//! Eligibility - which identities the fast downloader watches
//!
//! An identity is watched if any root identity scores it at rank <= 1:
//! - Rank 1: directly trusted by a root, the primary target group
//! - Rank 0: the identity is a root itself, watched so its own published
//!   data can be re-fetched when restoring it
//!
//! Everyone else, including identities without any score, is left to the
//! bulk downloader.

use trustwatch_core::{IdentityId, Rank, RankOracle, Score};

/// Eligibility rule over committed scores
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eligibility {
    max_rank: Rank,
}

impl Eligibility {
    pub fn new(max_rank: Rank) -> Self {
        Eligibility { max_rank }
    }

    pub fn max_rank(&self) -> Rank {
        self.max_rank
    }

    /// Does any of the scores qualify?
    pub fn qualifies(&self, scores: &[Score]) -> bool {
        scores.iter().any(|s| s.rank <= self.max_rank)
    }

    /// Should `identity` be watched? Unknown identities never are.
    pub fn should_watch(&self, oracle: &dyn RankOracle, identity: IdentityId) -> bool {
        match oracle.scores(identity) {
            Ok(scores) => self.qualifies(&scores),
            Err(_) => false,
        }
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Eligibility::new(Rank::DIRECT)
    }
}
