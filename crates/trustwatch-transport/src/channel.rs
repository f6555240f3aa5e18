//! Transport seam and the tokio channel implementation

use tokio::sync::mpsc;

use trustwatch_core::{WatchError, WatchResult};

use crate::NetworkRequest;

/// Sink for network requests
///
/// `submit` must not block: the core calls it while holding the store's
/// write lock.
pub trait Transport: Send + Sync {
    fn submit(&self, request: NetworkRequest) -> WatchResult<()>;
}

/// Request receiver for the network layer
pub type RequestReceiver = mpsc::UnboundedReceiver<NetworkRequest>;

/// Request sender half
pub type RequestSender = mpsc::UnboundedSender<NetworkRequest>;

/// Transport handing requests to an async network task over an unbounded channel
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: RequestSender,
}

impl ChannelTransport {
    /// Create the transport and the receiver the network task drains
    pub fn new() -> (Self, RequestReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelTransport { sender }, receiver)
    }

    /// Has the network task dropped its receiver?
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn submit(&self, request: NetworkRequest) -> WatchResult<()> {
        self.sender
            .send(request)
            .map_err(|e| WatchError::Transport(format!("network task gone: {:?}", e.0.client())))
    }
}
