// Bounded bookkeeping: command dedup window and undo/redo stacks.

use crate::domain::{CommandId, MapCommand};
use std::collections::{HashSet, VecDeque};

/// FIFO window of the most recently seen command ids.
///
/// Ids older than the window are forgotten, so a replay reaching further back than
/// `capacity` commands would be applied again.
#[derive(Debug)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<CommandId>,
    seen: HashSet<CommandId>,
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, id: &CommandId) -> bool {
        self.seen.contains(id)
    }

    /// Records an id. Returns false if it was already in the window.
    pub fn insert(&mut self, id: CommandId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        true
    }

    /// Forgets an id. Returns false if it was not in the window.
    pub fn remove(&mut self, id: &CommandId) -> bool {
        if !self.seen.remove(id) {
            return false;
        }
        self.order.retain(|seen| seen != id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Undo and redo stacks of locally executed commands, capped at `limit` entries.
#[derive(Debug)]
pub struct UndoHistory {
    limit: usize,
    undo: VecDeque<MapCommand>,
    redo: Vec<MapCommand>,
}

impl UndoHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            undo: VecDeque::new(),
            redo: Vec::new(),
        }
    }

    /// Records a new local command; any redo branch is discarded.
    pub fn record(&mut self, command: MapCommand) {
        self.redo.clear();
        self.push_undo(command);
    }

    pub fn push_undo(&mut self, command: MapCommand) {
        if self.limit == 0 {
            return;
        }
        if self.undo.len() == self.limit {
            self.undo.pop_front();
        }
        self.undo.push_back(command);
    }

    pub fn pop_undo(&mut self) -> Option<MapCommand> {
        self.undo.pop_back()
    }

    pub fn push_redo(&mut self, command: MapCommand) {
        if self.limit == 0 {
            return;
        }
        if self.redo.len() == self.limit {
            self.redo.remove(0);
        }
        self.redo.push(command);
    }

    pub fn pop_redo(&mut self) -> Option<MapCommand> {
        self.redo.pop()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
