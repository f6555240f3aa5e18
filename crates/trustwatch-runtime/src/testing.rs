//! Fixtures for unit tests

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use trustwatch_core::{
    Edition, IdentityId, Rank, RankOracle, Score, WatchError, WatchResult,
};
use trustwatch_state::Database;
use trustwatch_transport::{NetworkRequest, Transport};

use crate::{DownloadContext, WatchConfig};

/// Oracle with scores set directly by the test
#[derive(Default)]
pub struct StaticOracle {
    identities: RwLock<HashMap<IdentityId, (Edition, Vec<Score>)>>,
}

impl StaticOracle {
    pub fn add(&self, id: IdentityId, ranks: &[u32]) {
        let scores = ranks
            .iter()
            .map(|r| Score::new(IdentityId::new(0), id, Rank::new(*r), 0))
            .collect();
        self.identities.write().insert(id, (Edition::ZERO, scores));
    }

    pub fn set_edition(&self, id: IdentityId, edition: Edition) {
        if let Some(entry) = self.identities.write().get_mut(&id) {
            entry.0 = edition;
        }
    }

    pub fn remove(&self, id: IdentityId) {
        self.identities.write().remove(&id);
    }
}

impl RankOracle for StaticOracle {
    fn scores(&self, identity: IdentityId) -> WatchResult<Vec<Score>> {
        self.identities
            .read()
            .get(&identity)
            .map(|(_, s)| s.clone())
            .ok_or(WatchError::NoSuchIdentity(identity))
    }

    fn current_edition(&self, identity: IdentityId) -> WatchResult<Edition> {
        self.identities
            .read()
            .get(&identity)
            .map(|(e, _)| *e)
            .ok_or(WatchError::NoSuchIdentity(identity))
    }

    fn identities(&self) -> Vec<IdentityId> {
        let mut ids: Vec<_> = self.identities.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn contains(&self, identity: IdentityId) -> bool {
        self.identities.read().contains_key(&identity)
    }
}

#[derive(Default)]
pub struct Recording {
    requests: Mutex<Vec<NetworkRequest>>,
    failing: Mutex<bool>,
}

impl Transport for Recording {
    fn submit(&self, request: NetworkRequest) -> WatchResult<()> {
        if *self.failing.lock() {
            return Err(WatchError::Transport("unreachable".into()));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

impl Recording {
    pub fn count(&self, pred: impl Fn(&NetworkRequest) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| pred(r)).count()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

pub struct Fixture {
    pub oracle: Arc<StaticOracle>,
    pub database: Arc<Database>,
    pub transport: Arc<Recording>,
    pub ctx: Arc<DownloadContext>,
}

pub fn fixture() -> Fixture {
    let oracle = Arc::new(StaticOracle::default());
    let database = Arc::new(Database::new());
    let transport = Arc::new(Recording::default());
    let ctx = DownloadContext::new(
        oracle.clone(),
        Arc::clone(&database),
        transport.clone(),
        WatchConfig::default(),
    )
    .unwrap();
    Fixture {
        oracle,
        database,
        transport,
        ctx,
    }
}

pub fn id(n: u64) -> IdentityId {
    IdentityId::new(n)
}
