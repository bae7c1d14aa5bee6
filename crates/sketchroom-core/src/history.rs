//! Local undo/redo over the shape store.
//!
//! History is per peer: only changes committed by this replica are recorded,
//! so undo never reverts another participant's work.

use crate::config::HistoryConfig;
use crate::store::ReplicatedStore;
use loro::UndoManager;

/// Undo/redo stack bound to one replica.
pub struct History {
    manager: UndoManager,
    /// Whether a gesture group is open.
    grouping: bool,
}

impl History {
    /// Create a history tracking local changes to `store`.
    pub fn new(store: &ReplicatedStore, config: &HistoryConfig) -> Self {
        let mut manager = UndoManager::new(store.loro_doc());
        manager.set_max_undo_steps(config.max_steps);
        manager.set_merge_interval(config.merge_interval_ms);
        Self {
            manager,
            grouping: false,
        }
    }

    /// Start grouping. Every store write until [`end_group`](Self::end_group)
    /// becomes a single undo step.
    pub fn begin_group(&mut self) {
        if self.grouping {
            return;
        }
        if self.manager.group_start().is_ok() {
            self.grouping = true;
        }
    }

    /// Close the current group. No-op if none is open.
    pub fn end_group(&mut self) {
        if self.grouping {
            self.manager.group_end();
            self.grouping = false;
        }
    }

    pub fn is_grouping(&self) -> bool {
        self.grouping
    }

    /// Undo the last local step. Returns true if a step was undone.
    pub fn undo(&mut self) -> bool {
        self.end_group();
        let undone = self.manager.undo().unwrap_or(false);
        log::debug!("undo: {}", undone);
        undone
    }

    /// Redo the last undone step. Returns true if a step was redone.
    pub fn redo(&mut self) -> bool {
        self.end_group();
        let redone = self.manager.redo().unwrap_or(false);
        log::debug!("redo: {}", redone);
        redone
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }

    pub fn undo_count(&self) -> usize {
        self.manager.undo_count()
    }

    pub fn redo_count(&self) -> usize {
        self.manager.redo_count()
    }

    /// Drop all undo and redo steps.
    pub fn clear(&mut self) {
        self.end_group();
        self.manager.clear();
    }
}
