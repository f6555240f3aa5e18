//! Download context shared by both downloader variants

use std::sync::Arc;

use trustwatch_core::{
    Edition, IdentityId, RankOracle, WatchError, WatchResult,
};
use trustwatch_state::Database;
use trustwatch_transport::{ClientSlot, RequestClient, Transport};

use crate::{Eligibility, WatchConfig};

/// Collaborators injected into the downloaders.
///
/// The request client slot lives here so both variants share one channel;
/// only the fast downloader's lifecycle opens and closes it.
pub struct DownloadContext {
    oracle: Arc<dyn RankOracle>,
    database: Arc<Database>,
    transport: Arc<dyn Transport>,
    clients: ClientSlot,
    config: WatchConfig,
}

impl DownloadContext {
    pub fn new(
        oracle: Arc<dyn RankOracle>,
        database: Arc<Database>,
        transport: Arc<dyn Transport>,
        config: WatchConfig,
    ) -> WatchResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(DownloadContext {
            oracle,
            database,
            transport,
            clients: ClientSlot::new(),
            config,
        }))
    }

    pub fn oracle(&self) -> &dyn RankOracle {
        self.oracle.as_ref()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn clients(&self) -> &ClientSlot {
        &self.clients
    }

    /// Currently open request client
    pub fn client(&self) -> Option<Arc<RequestClient>> {
        self.clients.get()
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn eligibility(&self) -> Eligibility {
        Eligibility::new(self.config.max_watch_rank())
    }

    /// Fail with `NoSuchIdentity` unless the identity is in the graph
    pub fn require_identity(&self, identity: IdentityId) -> WatchResult<()> {
        if self.oracle.contains(identity) {
            Ok(())
        } else {
            Err(WatchError::NoSuchIdentity(identity))
        }
    }

    /// Latest imported edition, `Edition::ZERO` for identities never fetched
    pub fn current_edition(&self, identity: IdentityId) -> Edition {
        self.oracle
            .current_edition(identity)
            .unwrap_or(Edition::ZERO)
    }
}

impl std::fmt::Debug for DownloadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadContext")
            .field("config", &self.config)
            .field("client", &self.clients.get())
            .finish()
    }
}
