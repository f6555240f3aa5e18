//! In-memory trust graph
//!
//! Ranks are recomputed on every query by a breadth-first walk from each
//! root over edges that count as trust under the configured threshold.
//! Distrust edges never confer a rank.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use parking_lot::RwLock;
use trustwatch_core::{
    Edition, IdentityId, Rank, RankOracle, Score, Trust, WatchError, WatchResult,
    DEFAULT_DIRECT_TRUST_THRESHOLD,
};

#[derive(Default)]
struct GraphInner {
    identities: BTreeMap<IdentityId, Edition>,
    roots: BTreeSet<IdentityId>,
    /// (truster, trustee) -> edge
    trusts: HashMap<(IdentityId, IdentityId), Trust>,
}

impl GraphInner {
    fn require(&self, id: IdentityId) -> WatchResult<()> {
        if self.identities.contains_key(&id) {
            Ok(())
        } else {
            Err(WatchError::NoSuchIdentity(id))
        }
    }

    fn trustees(&self, truster: IdentityId, threshold: i8) -> Vec<IdentityId> {
        let mut out: Vec<_> = self
            .trusts
            .values()
            .filter(|t| t.truster == truster && t.is_direct_trust(threshold))
            .map(|t| t.trustee)
            .collect();
        out.sort();
        out
    }

    /// Ranks of every identity reachable from `root`
    fn ranks_from(&self, root: IdentityId, threshold: i8) -> HashMap<IdentityId, Rank> {
        let mut ranks = HashMap::new();
        ranks.insert(root, Rank::SELF);
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            let next = ranks[&current].next();
            for trustee in self.trustees(current, threshold) {
                if !ranks.contains_key(&trustee) {
                    ranks.insert(trustee, next);
                    queue.push_back(trustee);
                }
            }
        }
        ranks
    }

    /// Sum of trust values given to `target` by identities `root` ranks
    fn value_from(&self, ranks: &HashMap<IdentityId, Rank>, target: IdentityId) -> i32 {
        self.trusts
            .values()
            .filter(|t| t.trustee == target && ranks.contains_key(&t.truster))
            .map(|t| t.value() as i32)
            .sum()
    }
}

/// Trust graph held in memory
pub struct MemoryTrustGraph {
    inner: RwLock<GraphInner>,
    threshold: i8,
}

impl MemoryTrustGraph {
    pub fn new() -> Self {
        MemoryTrustGraph::with_threshold(DEFAULT_DIRECT_TRUST_THRESHOLD)
    }

    /// Graph whose edges count as trust from `threshold` upwards
    pub fn with_threshold(threshold: i8) -> Self {
        MemoryTrustGraph {
            inner: RwLock::new(GraphInner::default()),
            threshold,
        }
    }

    /// Add an identity. Returns false if it already existed.
    pub fn add_identity(&self, id: IdentityId) -> bool {
        let mut inner = self.inner.write();
        if inner.identities.contains_key(&id) {
            return false;
        }
        inner.identities.insert(id, Edition::ZERO);
        true
    }

    /// Add a locally controlled identity
    pub fn add_root(&self, id: IdentityId) -> bool {
        self.add_identity(id);
        self.inner.write().roots.insert(id)
    }

    /// Delete an identity with every edge touching it
    pub fn remove_identity(&self, id: IdentityId) -> bool {
        let mut inner = self.inner.write();
        if inner.identities.remove(&id).is_none() {
            return false;
        }
        inner.roots.remove(&id);
        inner
            .trusts
            .retain(|(truster, trustee), _| *truster != id && *trustee != id);
        true
    }

    /// Set or replace the edge `truster -> trustee`
    pub fn set_trust(&self, truster: IdentityId, trustee: IdentityId, value: i16) -> WatchResult<()> {
        let trust = Trust::new(truster, trustee, value)?;
        let mut inner = self.inner.write();
        inner.require(truster)?;
        inner.require(trustee)?;
        inner.trusts.insert((truster, trustee), trust);
        Ok(())
    }

    pub fn remove_trust(&self, truster: IdentityId, trustee: IdentityId) -> bool {
        self.inner.write().trusts.remove(&(truster, trustee)).is_some()
    }

    pub fn trust(&self, truster: IdentityId, trustee: IdentityId) -> Option<Trust> {
        self.inner.read().trusts.get(&(truster, trustee)).copied()
    }

    /// Record that `edition` of `id` was imported
    pub fn set_edition(&self, id: IdentityId, edition: Edition) -> WatchResult<()> {
        let mut inner = self.inner.write();
        match inner.identities.get_mut(&id) {
            Some(current) => {
                *current = edition;
                Ok(())
            }
            None => Err(WatchError::NoSuchIdentity(id)),
        }
    }

    pub fn contains_both(&self, a: IdentityId, b: IdentityId) -> bool {
        let inner = self.inner.read();
        inner.identities.contains_key(&a) && inner.identities.contains_key(&b)
    }

    pub fn roots(&self) -> Vec<IdentityId> {
        self.inner.read().roots.iter().copied().collect()
    }

    /// Best rank any root assigns to `target`
    pub fn best_rank(&self, target: IdentityId) -> Option<Rank> {
        self.scores(target)
            .ok()?
            .into_iter()
            .map(|s| s.rank)
            .min()
    }

    pub fn len(&self) -> usize {
        self.inner.read().identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTrustGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RankOracle for MemoryTrustGraph {
    fn scores(&self, identity: IdentityId) -> WatchResult<Vec<Score>> {
        let inner = self.inner.read();
        inner.require(identity)?;

        let mut scores = Vec::new();
        for root in &inner.roots {
            let ranks = inner.ranks_from(*root, self.threshold);
            if let Some(rank) = ranks.get(&identity) {
                let value = inner.value_from(&ranks, identity);
                scores.push(Score::new(*root, identity, *rank, value));
            }
        }
        Ok(scores)
    }

    fn current_edition(&self, identity: IdentityId) -> WatchResult<Edition> {
        self.inner
            .read()
            .identities
            .get(&identity)
            .copied()
            .ok_or(WatchError::NoSuchIdentity(identity))
    }

    fn identities(&self) -> Vec<IdentityId> {
        self.inner.read().identities.keys().copied().collect()
    }

    fn contains(&self, identity: IdentityId) -> bool {
        self.inner.read().identities.contains_key(&identity)
    }
}
