//! Worklist of pending states, ordered by instruction pointer.
//!
//! States are taken lowest instruction first, all states pending at that
//! instruction together, so that forward branches meet at their join point
//! before it runs.

use std::collections::BTreeMap;

use crate::state::MemoryState;

#[derive(Debug, Default)]
pub(crate) struct StateQueue {
    pending: BTreeMap<usize, Vec<MemoryState>>,
}

impl StateQueue {
    pub(crate) fn new() -> Self {
        StateQueue::default()
    }

    pub(crate) fn push(&mut self, ip: usize, state: MemoryState) {
        self.pending.entry(ip).or_default().push(state);
    }

    /// Removes every state pending at the lowest instruction pointer.
    pub(crate) fn pop_group(&mut self) -> Option<(usize, Vec<MemoryState>)> {
        self.pending.pop_first()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}
