//! Request client - the one network-request channel shared by both downloaders
//!
//! The fast downloader's lifecycle opens and closes the client through a
//! [`ClientSlot`]; the bulk downloader only borrows whatever client the slot
//! currently holds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use trustwatch_core::{
    ClientId, Edition, IdentityId, RequestPriority, SubscriptionId, WatchError, WatchResult,
};

use crate::{CancelToken, NetworkRequest, Transport};

/// Live polling subscription
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub identity: IdentityId,
    pub token: CancelToken,
}

#[derive(Debug, Default)]
struct ClientState {
    subscriptions: HashMap<IdentityId, Subscription>,
    next_seq: u64,
}

/// Shared network-request client
pub struct RequestClient {
    id: ClientId,
    transport: Arc<dyn Transport>,
    token: CancelToken,
    state: Mutex<ClientState>,
}

impl RequestClient {
    /// Open a client over `transport`
    pub fn open(id: ClientId, transport: Arc<dyn Transport>) -> Self {
        debug!(client = ?id, "request client opened");
        RequestClient {
            id,
            transport,
            token: CancelToken::new(),
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Token cancelled when the client closes
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Subscribe to editions of `identity` newer than `edition`.
    ///
    /// Subscribing an identity that already has a subscription returns the
    /// existing one without issuing a request.
    pub fn subscribe(&self, identity: IdentityId, edition: Edition) -> WatchResult<Subscription> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if let Some(existing) = state.subscriptions.get(&identity) {
            return Ok(existing.clone());
        }

        state.next_seq += 1;
        let subscription = Subscription {
            id: SubscriptionId::new(self.id, state.next_seq),
            identity,
            token: self.token.child(),
        };
        self.transport.submit(NetworkRequest::Subscribe {
            subscription: subscription.id,
            identity,
            edition,
            priority: RequestPriority::Polling,
            token: subscription.token.clone(),
        })?;
        state.subscriptions.insert(identity, subscription.clone());
        Ok(subscription)
    }

    /// Cancel the subscription of `identity`. Returns false if there was none.
    pub fn unsubscribe(&self, identity: IdentityId) -> WatchResult<bool> {
        self.ensure_open()?;
        let Some(subscription) = self.state.lock().subscriptions.remove(&identity) else {
            return Ok(false);
        };
        subscription.token.cancel();
        self.transport.submit(NetworkRequest::Unsubscribe {
            subscription: subscription.id,
            identity,
        })?;
        Ok(true)
    }

    /// Issue a one-shot payload fetch
    pub fn fetch(
        &self,
        identity: IdentityId,
        edition: Edition,
        priority: RequestPriority,
    ) -> WatchResult<CancelToken> {
        self.ensure_open()?;
        let token = self.token.child();
        self.transport.submit(NetworkRequest::Fetch {
            client: self.id,
            identity,
            edition,
            priority,
            token: token.clone(),
        })?;
        Ok(token)
    }

    pub fn is_subscribed(&self, identity: IdentityId) -> bool {
        self.state.lock().subscriptions.contains_key(&identity)
    }

    /// Live subscription of `identity`
    pub fn subscription(&self, identity: IdentityId) -> Option<Subscription> {
        self.state.lock().subscriptions.get(&identity).cloned()
    }

    /// Subscribed identities, sorted
    pub fn subscribed(&self) -> Vec<IdentityId> {
        let mut ids: Vec<_> = self.state.lock().subscriptions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Cancel every request of this client. Idempotent.
    pub fn close(&self) -> WatchResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.token.cancel();
        let dropped = {
            let mut state = self.state.lock();
            let n = state.subscriptions.len();
            state.subscriptions.clear();
            n
        };
        debug!(client = ?self.id, subscriptions = dropped, "request client closed");
        self.transport
            .submit(NetworkRequest::CloseClient { client: self.id })
    }

    fn ensure_open(&self) -> WatchResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(WatchError::ChannelClosed)
        }
    }
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Holder of the currently open request client
#[derive(Default)]
pub struct ClientSlot {
    current: RwLock<Option<Arc<RequestClient>>>,
    next_id: AtomicU64,
}

impl ClientSlot {
    pub fn new() -> Self {
        ClientSlot::default()
    }

    /// Open a fresh client, closing any client still in the slot
    pub fn open(&self, transport: Arc<dyn Transport>) -> WatchResult<Arc<RequestClient>> {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let client = Arc::new(RequestClient::open(id, transport));
        let previous = self.current.write().replace(Arc::clone(&client));
        if let Some(previous) = previous {
            previous.close()?;
        }
        Ok(client)
    }

    /// Currently open client
    pub fn get(&self) -> Option<Arc<RequestClient>> {
        self.current.read().clone()
    }

    /// Close and remove the client. Returns false if the slot was empty.
    pub fn close(&self) -> WatchResult<bool> {
        let Some(client) = self.current.write().take() else {
            return Ok(false);
        };
        client.close()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording(Mutex<Vec<NetworkRequest>>);

    impl Transport for Recording {
        fn submit(&self, request: NetworkRequest) -> WatchResult<()> {
            self.0.lock().push(request);
            Ok(())
        }
    }

    fn id(n: u64) -> IdentityId {
        IdentityId::new(n)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let transport = Arc::new(Recording::default());
        let client = RequestClient::open(ClientId::new(1), transport.clone());

        let first = client.subscribe(id(1), Edition::new(0)).unwrap();
        let second = client.subscribe(id(1), Edition::new(3)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(transport.0.lock().len(), 1);
        assert_eq!(
            transport.0.lock()[0].priority(),
            Some(RequestPriority::Polling)
        );
    }

    #[test]
    fn test_unsubscribe_cancels_token() {
        let transport = Arc::new(Recording::default());
        let client = RequestClient::open(ClientId::new(1), transport.clone());

        let sub = client.subscribe(id(1), Edition::new(0)).unwrap();
        assert!(client.unsubscribe(id(1)).unwrap());
        assert!(sub.token.is_cancelled());
        assert!(!client.unsubscribe(id(1)).unwrap());
        assert!(!client.is_subscribed(id(1)));
    }

    #[test]
    fn test_close_cancels_everything() {
        let transport = Arc::new(Recording::default());
        let client = RequestClient::open(ClientId::new(1), transport.clone());

        let sub = client.subscribe(id(1), Edition::new(0)).unwrap();
        let fetch = client
            .fetch(id(2), Edition::new(4), RequestPriority::Progress)
            .unwrap();

        client.close().unwrap();
        client.close().unwrap();
        assert!(sub.token.is_cancelled());
        assert!(fetch.is_cancelled());
        assert!(client.subscribed().is_empty());
        assert_eq!(
            client.subscribe(id(3), Edition::new(0)).unwrap_err(),
            WatchError::ChannelClosed
        );

        let closes = transport
            .0
            .lock()
            .iter()
            .filter(|r| matches!(r, NetworkRequest::CloseClient { .. }))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_slot_replaces_client() {
        let transport: Arc<dyn Transport> = Arc::new(Recording::default());
        let slot = ClientSlot::new();

        let first = slot.open(Arc::clone(&transport)).unwrap();
        let second = slot.open(transport).unwrap();
        assert_ne!(first.id(), second.id());
        assert!(!first.is_open());
        assert!(second.is_open());

        assert!(slot.close().unwrap());
        assert!(!slot.close().unwrap());
        assert!(slot.get().is_none());
    }
}
