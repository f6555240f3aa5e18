//! Transport that records every request instead of sending it

use std::collections::HashSet;

use parking_lot::Mutex;
use trustwatch_core::{ClientId, IdentityId, RequestPriority, WatchError, WatchResult};
use trustwatch_transport::{NetworkRequest, Transport};

/// Recording transport with an optional failure switch
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<NetworkRequest>>,
    failing: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        RecordingTransport::default()
    }

    /// Make every later submit fail until reset
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches recorded for `identity`, with their priority
    pub fn fetches(&self, identity: IdentityId) -> Vec<RequestPriority> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                NetworkRequest::Fetch {
                    identity: target,
                    priority,
                    ..
                } if *target == identity => Some(*priority),
                _ => None,
            })
            .collect()
    }

    /// Identities with a live subscription, replaying every recorded request
    pub fn live_subscriptions(&self) -> Vec<IdentityId> {
        let mut live: HashSet<(ClientId, IdentityId)> = HashSet::new();
        for request in self.requests.lock().iter() {
            match request {
                NetworkRequest::Subscribe {
                    subscription,
                    identity,
                    ..
                } => {
                    live.insert((subscription.client, *identity));
                }
                NetworkRequest::Unsubscribe {
                    subscription,
                    identity,
                } => {
                    live.remove(&(subscription.client, *identity));
                }
                NetworkRequest::CloseClient { client } => {
                    live.retain(|(c, _)| c != client);
                }
                NetworkRequest::Fetch { .. } => {}
            }
        }
        let mut ids: Vec<_> = live.into_iter().map(|(_, id)| id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl Transport for RecordingTransport {
    fn submit(&self, request: NetworkRequest) -> WatchResult<()> {
        if *self.failing.lock() {
            return Err(WatchError::Transport("recording transport set to fail".into()));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}
