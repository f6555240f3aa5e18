//! Watch table - committed watch and bulk-queue state

use std::collections::BTreeMap;

use trustwatch_core::{Edition, IdentityId};

/// Committed record of an actively watched identity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchEntry {
    /// Commit sequence number that created the watch
    pub since_commit: u64,
    /// Highest edition any accepted hint has claimed
    pub latest_hint: Option<Edition>,
    /// Edition scheduled for payload fetch, not yet reported fetched
    pub pending_fetch: Option<Edition>,
}

impl WatchEntry {
    pub fn new(since_commit: u64) -> Self {
        WatchEntry {
            since_commit,
            latest_hint: None,
            pending_fetch: None,
        }
    }

    /// Record a hinted edition. Returns true if it is newer than anything seen.
    pub fn observe_hint(&mut self, edition: Edition) -> bool {
        if self.latest_hint.is_some_and(|seen| !edition.is_newer_than(seen)) {
            return false;
        }
        self.latest_hint = Some(edition);
        self.pending_fetch = Some(edition);
        true
    }

    /// Clear the pending fetch if `edition` covers it
    pub fn complete_fetch(&mut self, edition: Edition) -> bool {
        match self.pending_fetch {
            Some(pending) if pending <= edition => {
                self.pending_fetch = None;
                true
            }
            _ => false,
        }
    }
}

/// Committed record of an identity covered by the bulk downloader
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkEntry {
    /// Commit sequence number that queued the identity
    pub queued_at: u64,
    /// Hinted edition scheduled for bulk fetch, not yet reported fetched
    pub pending_fetch: Option<Edition>,
}

impl BulkEntry {
    pub fn new(queued_at: u64) -> Self {
        BulkEntry {
            queued_at,
            pending_fetch: None,
        }
    }

    /// Record a hinted edition. Returns true if it advances the pending fetch.
    pub fn observe_hint(&mut self, edition: Edition) -> bool {
        if self.pending_fetch.is_some_and(|pending| !edition.is_newer_than(pending)) {
            return false;
        }
        self.pending_fetch = Some(edition);
        true
    }

    /// Clear the pending fetch if `edition` covers it
    pub fn complete_fetch(&mut self, edition: Edition) -> bool {
        match self.pending_fetch {
            Some(pending) if pending <= edition => {
                self.pending_fetch = None;
                true
            }
            _ => false,
        }
    }
}

/// Watch table - the committed bookkeeping of both downloaders
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchTable {
    /// Watched identities (fast downloader)
    watches: BTreeMap<IdentityId, WatchEntry>,
    /// Bulk download queue (slow downloader)
    bulk: BTreeMap<IdentityId, BulkEntry>,
}

impl WatchTable {
    pub fn new() -> Self {
        WatchTable::default()
    }

    /// Get a watch entry
    pub fn get(&self, id: IdentityId) -> Option<&WatchEntry> {
        self.watches.get(&id)
    }

    /// Get a mutable watch entry
    pub fn get_mut(&mut self, id: IdentityId) -> Option<&mut WatchEntry> {
        self.watches.get_mut(&id)
    }

    /// Is the identity watched?
    pub fn contains(&self, id: IdentityId) -> bool {
        self.watches.contains_key(&id)
    }

    /// Insert a watch, keeping the existing entry if there is one.
    /// Returns true if the watch is new.
    pub fn insert(&mut self, id: IdentityId, since_commit: u64) -> bool {
        if self.watches.contains_key(&id) {
            return false;
        }
        self.watches.insert(id, WatchEntry::new(since_commit));
        true
    }

    /// Remove a watch
    pub fn remove(&mut self, id: IdentityId) -> Option<WatchEntry> {
        self.watches.remove(&id)
    }

    /// Number of watched identities
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Iterate over watches in identity order
    pub fn iter(&self) -> impl Iterator<Item = (&IdentityId, &WatchEntry)> {
        self.watches.iter()
    }

    /// Watched identities in identity order
    pub fn watched(&self) -> Vec<IdentityId> {
        self.watches.keys().copied().collect()
    }

    /// Identities with a fetch scheduled and not yet completed
    pub fn pending_fetches(&self) -> Vec<(IdentityId, Edition)> {
        self.watches
            .iter()
            .filter_map(|(id, entry)| entry.pending_fetch.map(|e| (*id, e)))
            .collect()
    }

    /// Get a bulk queue entry
    pub fn bulk_entry(&self, id: IdentityId) -> Option<&BulkEntry> {
        self.bulk.get(&id)
    }

    pub fn is_queued(&self, id: IdentityId) -> bool {
        self.bulk.contains_key(&id)
    }

    /// Mutable bulk queue entry
    pub fn bulk_entry_mut(&mut self, id: IdentityId) -> Option<&mut BulkEntry> {
        self.bulk.get_mut(&id)
    }

    /// Queue an identity for the bulk downloader.
    /// Returns true if the identity was not queued before.
    pub fn enqueue(&mut self, id: IdentityId, seq: u64) -> bool {
        if self.bulk.contains_key(&id) {
            return false;
        }
        self.bulk.insert(id, BulkEntry::new(seq));
        true
    }

    /// Remove an identity from the bulk queue
    pub fn dequeue(&mut self, id: IdentityId) -> Option<BulkEntry> {
        self.bulk.remove(&id)
    }

    /// Queued identities in identity order
    pub fn queued(&self) -> Vec<IdentityId> {
        self.bulk.keys().copied().collect()
    }

    /// Queued identities with a bulk fetch scheduled and not yet completed
    pub fn pending_bulk_fetches(&self) -> Vec<(IdentityId, Edition)> {
        self.bulk
            .iter()
            .filter_map(|(id, entry)| entry.pending_fetch.map(|e| (*id, e)))
            .collect()
    }

    /// Drop every watch
    pub fn clear_watches(&mut self) {
        self.watches.clear();
    }

    /// Drop the whole bulk queue
    pub fn clear_bulk(&mut self) {
        self.bulk.clear();
    }
}
