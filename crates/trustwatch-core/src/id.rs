//! Identifier types for trustwatch
//!
//! Identities are referenced by a 64-bit fingerprint of their retrieval key.
//! The graph store owns the identity itself; this crate only ever holds ids.

use std::fmt;

/// Identity fingerprint - truncated hash of the identity's retrieval key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdentityId(pub u64);

impl IdentityId {
    #[inline]
    pub fn new(id: u64) -> Self {
        IdentityId(id)
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:016x})", self.0)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Edition - version counter of an identity's published data
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Edition(pub u64);

impl Edition {
    pub const ZERO: Edition = Edition(0);

    #[inline]
    pub fn new(edition: u64) -> Self {
        Edition(edition)
    }

    /// The edition following this one
    #[inline]
    pub fn next(self) -> Self {
        Edition(self.0.saturating_add(1))
    }

    #[inline]
    pub fn is_newer_than(self, other: Edition) -> bool {
        self.0 > other.0
    }
}

impl fmt::Debug for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Edition({})", self.0)
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request client identity - one per opened network-request channel
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientId(pub u64);

impl ClientId {
    #[inline]
    pub fn new(id: u64) -> Self {
        ClientId(id)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

/// Subscription identity - unique within a request client
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubscriptionId {
    pub client: ClientId,
    pub seq: u64,
}

impl SubscriptionId {
    #[inline]
    pub fn new(client: ClientId, seq: u64) -> Self {
        SubscriptionId { client, seq }
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({}:{})", self.client.0, self.seq)
    }
}
