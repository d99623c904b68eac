//! Bounded undo/redo log.
//!
//! The log holds full state snapshots. Because snapshots share unchanged
//! branches, an entry costs only the branches its change reallocated.
//! Entry 0 is the baseline; the log keeps at most `limit + 1` entries and
//! evicts the oldest first.

use crate::{Patch, Path, Value};
use std::collections::VecDeque;

/// What produced a committed state.
#[derive(Clone, Debug, PartialEq)]
pub enum AppliedAction {
    /// Construction-time state.
    Init,
    /// A partial-state dispatch, after middleware.
    Dispatch(Value),
    /// A path-scoped write or delete.
    UpdatePath(Path),
    /// A transaction, with the operations its draft recorded.
    Transaction(Patch),
    /// Several actions committed inside one batch.
    Batch(Vec<AppliedAction>),
    /// An undo.
    Undo {
        /// Entries stepped back.
        steps: usize,
        /// Branch restored, if scoped.
        path: Option<Path>,
    },
    /// A redo.
    Redo {
        /// Entries stepped forward.
        steps: usize,
        /// Branch restored, if scoped.
        path: Option<Path>,
    },
    /// A reset to the initial state.
    Reset,
}

impl AppliedAction {
    /// Short name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppliedAction::Init => "init",
            AppliedAction::Dispatch(_) => "dispatch",
            AppliedAction::UpdatePath(_) => "update_path",
            AppliedAction::Transaction(_) => "transaction",
            AppliedAction::Batch(_) => "batch",
            AppliedAction::Undo { .. } => "undo",
            AppliedAction::Redo { .. } => "redo",
            AppliedAction::Reset => "reset",
        }
    }

    /// Collapse the actions committed in a batch into one.
    pub(crate) fn batched(mut actions: Vec<AppliedAction>) -> Self {
        if actions.len() == 1 {
            actions.remove(0)
        } else {
            AppliedAction::Batch(actions)
        }
    }
}

/// One snapshot in the log.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// State after the action.
    pub state: Value,
    /// The action that produced it.
    pub action: AppliedAction,
}

/// Point-in-time copy of the log.
#[derive(Clone, Debug, PartialEq)]
pub struct HistorySnapshot {
    /// Entries, oldest first.
    pub entries: Vec<HistoryEntry>,
    /// Index of the current entry.
    pub cursor: usize,
    /// Maximum number of undoable entries.
    pub limit: usize,
}

impl HistorySnapshot {
    /// Number of entries, including the baseline.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at the cursor.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    /// Whether at least one undo step is available.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Whether at least one redo step is available.
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }
}

#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    limit: usize,
}

impl History {
    pub(crate) fn new(baseline: Value, limit: usize) -> Self {
        let mut entries = VecDeque::with_capacity(limit.min(64) + 1);
        entries.push_back(HistoryEntry {
            state: baseline,
            action: AppliedAction::Init,
        });
        Self {
            entries,
            cursor: 0,
            limit,
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Append a committed state, dropping any redo branch.
    pub(crate) fn record(&mut self, state: Value, action: AppliedAction) {
        if !self.is_enabled() {
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(HistoryEntry { state, action });
        while self.entries.len() > self.limit.saturating_add(1) {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Index `steps` entries back from the cursor, if it exists.
    pub(crate) fn undo_target(&self, steps: usize) -> Option<usize> {
        if steps == 0 {
            return None;
        }
        self.cursor.checked_sub(steps)
    }

    /// Index `steps` entries forward from the cursor, if it exists.
    pub(crate) fn redo_target(&self, steps: usize) -> Option<usize> {
        if steps == 0 {
            return None;
        }
        let target = self.cursor.checked_add(steps)?;
        (target < self.entries.len()).then_some(target)
    }

    #[inline]
    pub(crate) fn entry(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    #[inline]
    pub(crate) fn move_to(&mut self, index: usize) {
        debug_assert!(index < self.entries.len());
        self.cursor = index;
    }

    #[inline]
    pub(crate) fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[inline]
    pub(crate) fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Drop every entry and start over from `baseline`.
    pub(crate) fn reset(&mut self, baseline: Value) {
        self.entries.clear();
        self.entries.push_back(HistoryEntry {
            state: baseline,
            action: AppliedAction::Init,
        });
        self.cursor = 0;
    }

    pub(crate) fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            entries: self.entries.iter().cloned().collect(),
            cursor: self.cursor,
            limit: self.limit,
        }
    }
}
