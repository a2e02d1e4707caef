use crate::store::state_machine::StateMachine;
use crate::store::store::{HardState, Index, LogEntry, Store, StoreError, Term};
use bytes::Bytes;

/// In-memory store: the log, the persistent metadata, and the user state
/// machine, all held in RAM. Durability is modeled, not provided; the engine
/// talks to it through the same contract a disk-backed store would satisfy.
pub struct InMemoryStore<M: StateMachine> {
    entries: Vec<LogEntry>,
    hard_state: HardState,
    machine: M,
}

impl<M: StateMachine> InMemoryStore<M> {
    pub fn new(machine: M) -> Self {
        InMemoryStore {
            entries: Vec::new(),
            hard_state: HardState::default(),
            machine,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.entries
    }

    fn vec_index(index: Index) -> usize {
        // Log indexes are 1-based.
        (index.val() - 1) as usize
    }
}

impl<M: StateMachine> Store for InMemoryStore<M> {
    fn last(&self) -> (Index, Term) {
        match self.entries.last() {
            Some(entry) => (Index::new(self.entries.len() as u64), entry.term),
            None => (Index::ZERO, Term::ZERO),
        }
    }

    fn lookup(&self, index: Index) -> Option<LogEntry> {
        if index.is_zero() {
            return None;
        }
        self.entries.get(Self::vec_index(index)).cloned()
    }

    fn range(&self, from: Index, max: usize) -> Vec<LogEntry> {
        if from.is_zero() || from.val() > self.entries.len() as u64 {
            return Vec::new();
        }
        self.entries[Self::vec_index(from)..]
            .iter()
            .take(max)
            .cloned()
            .collect()
    }

    fn append(&mut self, entries: Vec<LogEntry>) -> Result<Index, StoreError> {
        let first = Index::new(self.entries.len() as u64 + 1);
        self.entries.extend(entries);
        Ok(first)
    }

    fn truncate(&mut self, keep_up_to: Index) -> Result<(), StoreError> {
        self.entries.truncate(keep_up_to.val() as usize);
        Ok(())
    }

    fn apply(&mut self, value: &Bytes) -> Result<Bytes, StoreError> {
        Ok(self.machine.apply(value))
    }

    fn save_state(&mut self, hard_state: &HardState) -> Result<(), StoreError> {
        self.hard_state = hard_state.clone();
        Ok(())
    }

    fn load_state(&self) -> HardState {
        self.hard_state.clone()
    }
}
