//! Staged changes - the unit of work attached to a transaction
//!
//! Commands for the same identity coalesce as they are staged: a command
//! followed by its opposite cancels both, and repeating a command is a no-op.

use std::collections::BTreeMap;

use trustwatch_core::{Edition, IdentityId};

use crate::WatchTable;

/// Pending change to an identity's watch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchCommand {
    Start,
    Abort,
}

/// Pending change to an identity's bulk queue entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BulkCommand {
    Queue,
    Dequeue,
}

/// Outcome of staging a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staged {
    /// The command was recorded
    Recorded,
    /// An identical command was already staged
    Duplicate,
    /// The command cancelled an opposite staged command
    Cancelled,
}

/// Buffer of writes staged by one transaction
#[derive(Clone, Debug, Default)]
pub struct StagedChanges {
    clear_watches: bool,
    clear_bulk: bool,
    commands: BTreeMap<IdentityId, WatchCommand>,
    bulk: BTreeMap<IdentityId, BulkCommand>,
    /// Highest hinted edition per target
    hints: BTreeMap<IdentityId, Edition>,
    /// Highest fetched edition per identity
    fetched: BTreeMap<IdentityId, Edition>,
}

impl StagedChanges {
    pub fn new() -> Self {
        StagedChanges::default()
    }

    /// Nothing staged?
    pub fn is_empty(&self) -> bool {
        !self.clear_watches
            && !self.clear_bulk
            && self.commands.is_empty()
            && self.bulk.is_empty()
            && self.hints.is_empty()
            && self.fetched.is_empty()
    }

    /// Number of staged entries, for logging
    pub fn len(&self) -> usize {
        self.commands.len() + self.bulk.len() + self.hints.len() + self.fetched.len()
    }

    pub fn stage_start(&mut self, id: IdentityId) -> Staged {
        Self::coalesce(&mut self.commands, id, WatchCommand::Start, WatchCommand::Abort)
    }

    pub fn stage_abort(&mut self, id: IdentityId) -> Staged {
        Self::coalesce(&mut self.commands, id, WatchCommand::Abort, WatchCommand::Start)
    }

    pub fn stage_queue(&mut self, id: IdentityId) -> Staged {
        Self::coalesce(&mut self.bulk, id, BulkCommand::Queue, BulkCommand::Dequeue)
    }

    pub fn stage_dequeue(&mut self, id: IdentityId) -> Staged {
        Self::coalesce(&mut self.bulk, id, BulkCommand::Dequeue, BulkCommand::Queue)
    }

    /// Record a hinted edition, keeping the highest per target
    pub fn stage_hint(&mut self, target: IdentityId, edition: Edition) -> Staged {
        match self.hints.get_mut(&target) {
            Some(staged) if *staged >= edition => Staged::Duplicate,
            Some(staged) => {
                *staged = edition;
                Staged::Recorded
            }
            None => {
                self.hints.insert(target, edition);
                Staged::Recorded
            }
        }
    }

    /// Record that the payload of `edition` was imported
    pub fn stage_fetched(&mut self, id: IdentityId, edition: Edition) {
        let entry = self.fetched.entry(id).or_insert(edition);
        if edition > *entry {
            *entry = edition;
        }
    }

    /// Drop every watch; commands staged afterwards apply to the empty table
    pub fn stage_clear_watches(&mut self) {
        self.clear_watches = true;
        self.commands.clear();
    }

    /// Drop the whole bulk queue
    pub fn stage_clear_bulk(&mut self) {
        self.clear_bulk = true;
        self.bulk.clear();
    }

    /// Staged command for an identity, if any
    pub fn command(&self, id: IdentityId) -> Option<WatchCommand> {
        self.commands.get(&id).copied()
    }

    pub fn bulk_command(&self, id: IdentityId) -> Option<BulkCommand> {
        self.bulk.get(&id).copied()
    }

    /// Is the identity watched once this buffer is applied on top of `table`?
    pub fn watched_after(&self, table: &WatchTable, id: IdentityId) -> bool {
        match self.commands.get(&id) {
            Some(WatchCommand::Start) => true,
            Some(WatchCommand::Abort) => false,
            None => !self.clear_watches && table.contains(id),
        }
    }

    /// Is the identity queued once this buffer is applied on top of `table`?
    pub fn queued_after(&self, table: &WatchTable, id: IdentityId) -> bool {
        match self.bulk.get(&id) {
            Some(BulkCommand::Queue) => true,
            Some(BulkCommand::Dequeue) => false,
            None => !self.clear_bulk && table.is_queued(id),
        }
    }

    /// Apply the buffer to `table`, producing the diff as a report
    pub fn apply(self, table: &mut WatchTable, seq: u64) -> CommitReport {
        let before_watched = table.watched();
        let before_queued = table.queued();

        if self.clear_watches {
            table.clear_watches();
        }
        if self.clear_bulk {
            table.clear_bulk();
        }

        for (id, command) in &self.commands {
            match command {
                WatchCommand::Start => {
                    table.insert(*id, seq);
                }
                WatchCommand::Abort => {
                    table.remove(*id);
                }
            }
        }

        for (id, command) in &self.bulk {
            match command {
                BulkCommand::Queue => {
                    table.enqueue(*id, seq);
                }
                BulkCommand::Dequeue => {
                    table.dequeue(*id);
                }
            }
        }

        let mut report = CommitReport {
            seq,
            cleared: self.clear_watches,
            ..CommitReport::default()
        };

        // Hints only ever touch identities that are covered after the
        // commands above; they never create a watch or a queue entry.
        for (target, edition) in self.hints {
            if let Some(entry) = table.get_mut(target) {
                if entry.observe_hint(edition) {
                    report.fetches.push(FetchCommand {
                        identity: target,
                        edition,
                    });
                }
            } else if let Some(entry) = table.bulk_entry_mut(target) {
                if entry.observe_hint(edition) {
                    report.bulk_fetches.push(FetchCommand {
                        identity: target,
                        edition,
                    });
                }
            } else {
                report.discarded_hints.push(target);
            }
        }

        for (id, edition) in self.fetched {
            if let Some(entry) = table.get_mut(id) {
                entry.complete_fetch(edition);
            }
            if let Some(entry) = table.bulk_entry_mut(id) {
                entry.complete_fetch(edition);
            }
        }

        let after_watched = table.watched();
        report.started = difference(&after_watched, &before_watched);
        report.aborted = difference(&before_watched, &after_watched);

        let after_queued = table.queued();
        report.queued = difference(&after_queued, &before_queued);
        report.dequeued = difference(&before_queued, &after_queued);

        report
    }

    fn coalesce<C: Copy + PartialEq>(
        map: &mut BTreeMap<IdentityId, C>,
        id: IdentityId,
        command: C,
        opposite: C,
    ) -> Staged {
        match map.get(&id) {
            Some(existing) if *existing == command => Staged::Duplicate,
            Some(existing) if *existing == opposite => {
                map.remove(&id);
                Staged::Cancelled
            }
            _ => {
                map.insert(id, command);
                Staged::Recorded
            }
        }
    }
}

/// Items of `a` not in `b`; both inputs sorted
fn difference(a: &[IdentityId], b: &[IdentityId]) -> Vec<IdentityId> {
    a.iter()
        .filter(|id| b.binary_search(id).is_err())
        .copied()
        .collect()
}

/// Payload fetch scheduled by a commit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FetchCommand {
    pub identity: IdentityId,
    pub edition: Edition,
}

/// What a commit changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Commit sequence number
    pub seq: u64,
    /// The watch set was wiped before applying commands
    pub cleared: bool,
    /// Identities that became watched
    pub started: Vec<IdentityId>,
    /// Identities that stopped being watched
    pub aborted: Vec<IdentityId>,
    /// Payload fetches scheduled for watched identities
    pub fetches: Vec<FetchCommand>,
    /// Identities newly queued for the bulk downloader
    pub queued: Vec<IdentityId>,
    /// Identities removed from the bulk queue
    pub dequeued: Vec<IdentityId>,
    /// Bulk fetches scheduled for queued identities
    pub bulk_fetches: Vec<FetchCommand>,
    /// Hints dropped because their target was neither watched nor queued
    pub discarded_hints: Vec<IdentityId>,
}

impl CommitReport {
    /// Did the commit change the watch set?
    pub fn changes_watches(&self) -> bool {
        !self.started.is_empty() || !self.aborted.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_watches()
            && self.fetches.is_empty()
            && self.queued.is_empty()
            && self.dequeued.is_empty()
            && self.bulk_fetches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> IdentityId {
        IdentityId::new(n)
    }

    #[test]
    fn test_start_twice_is_duplicate() {
        let mut staged = StagedChanges::new();
        assert_eq!(staged.stage_start(id(1)), Staged::Recorded);
        assert_eq!(staged.stage_start(id(1)), Staged::Duplicate);
        assert_eq!(staged.command(id(1)), Some(WatchCommand::Start));
    }

    #[test]
    fn test_opposite_commands_cancel() {
        let mut staged = StagedChanges::new();
        staged.stage_start(id(1));
        assert_eq!(staged.stage_abort(id(1)), Staged::Cancelled);
        assert_eq!(staged.command(id(1)), None);

        staged.stage_abort(id(2));
        assert_eq!(staged.stage_start(id(2)), Staged::Cancelled);
        assert!(staged.is_empty());
    }

    #[test]
    fn test_apply_reports_diff() {
        let mut table = WatchTable::new();
        table.insert(id(1), 1);
        table.insert(id(2), 1);

        let mut staged = StagedChanges::new();
        staged.stage_start(id(2));
        staged.stage_start(id(3));
        staged.stage_abort(id(1));

        let report = staged.apply(&mut table, 2);
        assert_eq!(report.started, vec![id(3)]);
        assert_eq!(report.aborted, vec![id(1)]);
        assert_eq!(table.watched(), vec![id(2), id(3)]);
        assert_eq!(table.get(id(2)).unwrap().since_commit, 1);
    }

    #[test]
    fn test_hint_never_creates_watch() {
        let mut table = WatchTable::new();
        let mut staged = StagedChanges::new();
        staged.stage_hint(id(9), Edition::new(5));

        let report = staged.apply(&mut table, 1);
        assert!(table.is_empty());
        assert!(report.fetches.is_empty());
        assert_eq!(report.discarded_hints, vec![id(9)]);
    }

    #[test]
    fn test_hint_for_aborted_watch_is_dropped() {
        let mut table = WatchTable::new();
        table.insert(id(1), 1);

        let mut staged = StagedChanges::new();
        staged.stage_hint(id(1), Edition::new(5));
        staged.stage_abort(id(1));

        let report = staged.apply(&mut table, 2);
        assert!(report.fetches.is_empty());
        assert_eq!(report.aborted, vec![id(1)]);
    }

    #[test]
    fn test_hints_keep_highest_edition() {
        let mut table = WatchTable::new();
        table.insert(id(1), 1);

        let mut staged = StagedChanges::new();
        staged.stage_hint(id(1), Edition::new(5));
        assert_eq!(staged.stage_hint(id(1), Edition::new(3)), Staged::Duplicate);
        staged.stage_hint(id(1), Edition::new(8));

        let report = staged.apply(&mut table, 2);
        assert_eq!(
            report.fetches,
            vec![FetchCommand {
                identity: id(1),
                edition: Edition::new(8)
            }]
        );
    }

    #[test]
    fn test_hint_for_queued_schedules_bulk_fetch() {
        let mut table = WatchTable::new();
        let mut staged = StagedChanges::new();
        staged.stage_queue(id(4));
        staged.stage_hint(id(4), Edition::new(2));

        let report = staged.apply(&mut table, 1);
        assert_eq!(report.queued, vec![id(4)]);
        assert!(report.fetches.is_empty());
        assert_eq!(
            report.bulk_fetches,
            vec![FetchCommand {
                identity: id(4),
                edition: Edition::new(2)
            }]
        );

        let mut staged = StagedChanges::new();
        staged.stage_fetched(id(4), Edition::new(2));
        staged.apply(&mut table, 2);
        assert_eq!(table.bulk_entry(id(4)).unwrap().pending_fetch, None);
    }

    #[test]
    fn test_clear_then_start_keeps_only_restarted() {
        let mut table = WatchTable::new();
        table.insert(id(1), 1);
        table.insert(id(2), 1);

        let mut staged = StagedChanges::new();
        staged.stage_clear_watches();
        staged.stage_start(id(2));
        assert!(!staged.watched_after(&table, id(1)));
        assert!(staged.watched_after(&table, id(2)));

        let report = staged.apply(&mut table, 2);
        assert!(report.cleared);
        assert_eq!(report.aborted, vec![id(1)]);
        assert!(report.started.is_empty());
        assert_eq!(table.watched(), vec![id(2)]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_flip_only_staging_ends_at_last_request(
                initially in any::<bool>(),
                wanted in prop::collection::vec(any::<bool>(), 0..30),
            ) {
                let mut table = WatchTable::new();
                if initially {
                    table.insert(id(1), 1);
                }
                let mut staged = StagedChanges::new();
                for want in &wanted {
                    if staged.watched_after(&table, id(1)) != *want {
                        if *want {
                            staged.stage_start(id(1));
                        } else {
                            staged.stage_abort(id(1));
                        }
                    }
                }

                let expected = wanted.last().copied().unwrap_or(initially);
                let report = staged.apply(&mut table, 2);
                prop_assert_eq!(table.contains(id(1)), expected);
                prop_assert_eq!(report.changes_watches(), expected != initially);
            }
        }
    }
}
