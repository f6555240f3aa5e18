//! Network requests issued on behalf of staged commands

use trustwatch_core::{ClientId, Edition, IdentityId, RequestPriority, SubscriptionId};

use crate::CancelToken;

/// Request handed to the polling/fetch layer
#[derive(Clone, Debug)]
pub enum NetworkRequest {
    /// Start recurring polling for editions newer than `edition`
    Subscribe {
        subscription: SubscriptionId,
        identity: IdentityId,
        edition: Edition,
        priority: RequestPriority,
        token: CancelToken,
    },
    /// Stop a subscription
    Unsubscribe {
        subscription: SubscriptionId,
        identity: IdentityId,
    },
    /// Download the payload of one edition
    Fetch {
        client: ClientId,
        identity: IdentityId,
        edition: Edition,
        priority: RequestPriority,
        token: CancelToken,
    },
    /// Every request of the client is cancelled
    CloseClient { client: ClientId },
}

impl NetworkRequest {
    /// Client the request belongs to
    pub fn client(&self) -> ClientId {
        match self {
            NetworkRequest::Subscribe { subscription, .. }
            | NetworkRequest::Unsubscribe { subscription, .. } => subscription.client,
            NetworkRequest::Fetch { client, .. } | NetworkRequest::CloseClient { client } => {
                *client
            }
        }
    }

    /// Identity the request is about, if any
    pub fn identity(&self) -> Option<IdentityId> {
        match self {
            NetworkRequest::Subscribe { identity, .. }
            | NetworkRequest::Unsubscribe { identity, .. }
            | NetworkRequest::Fetch { identity, .. } => Some(*identity),
            NetworkRequest::CloseClient { .. } => None,
        }
    }

    /// Priority class, for requests that carry one
    pub fn priority(&self) -> Option<RequestPriority> {
        match self {
            NetworkRequest::Subscribe { priority, .. } | NetworkRequest::Fetch { priority, .. } => {
                Some(*priority)
            }
            _ => None,
        }
    }

    /// Has the request been cancelled since it was issued?
    pub fn is_cancelled(&self) -> bool {
        match self {
            NetworkRequest::Subscribe { token, .. } | NetworkRequest::Fetch { token, .. } => {
                token.is_cancelled()
            }
            _ => false,
        }
    }
}
