//! Request priority classes
//!
//! Every request this crate family issues travels over one shared request
//! client, so the transport can interleave them with the bulk downloader's
//! requests. The class only decides ordering within that client:
//! - Polling: periodic blind check for new editions of watched identities
//! - Progress: one-shot fetch of an edition already known to exist

/// Priority class of an outbound network request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RequestPriority {
    /// Recurring edition check across all watched identities
    /// Network: low bandwidth, background
    #[default]
    Polling,

    /// Payload download of a discovered edition
    /// Network: finite work, unblocks trust graph updates
    Progress,
}

impl RequestPriority {
    /// Urgency rank, higher = more urgent
    pub fn urgency(self) -> u8 {
        match self {
            RequestPriority::Polling => 0,
            RequestPriority::Progress => 1,
        }
    }
}

impl PartialOrd for RequestPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.urgency().cmp(&other.urgency())
    }
}
