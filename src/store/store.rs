use crate::engine::MemberId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Index is the position of an entry in the replicated log. Indexes are
/// 1-based; `Index::ZERO` means "no entry".
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index(u64);

impl Index {
    pub const ZERO: Index = Index(0);

    pub fn new(index: u64) -> Self {
        Index(index)
    }

    pub fn val(self) -> u64 {
        self.0
    }

    pub fn plus(self, n: u64) -> Index {
        Index(self.0 + n)
    }

    /// Saturates at 0 so truncating around an empty log stays in range.
    pub fn minus_one(self) -> Index {
        Index(self.0.saturating_sub(1))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Term is a monotonically increasing election epoch. At most one leader
/// exists per term.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term(u64);

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn val(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Term {
        Term(self.0 + 1)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single replicated log entry: the term it was proposed in and an opaque
/// command payload. Immutable once durably appended, except by truncation of
/// a contiguous suffix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub value: Bytes,
}

impl LogEntry {
    pub fn new(term: Term, value: impl Into<Bytes>) -> Self {
        LogEntry {
            term,
            value: value.into(),
        }
    }
}

/// The persistent metadata fields. Must be durable before any message that
/// depends on them is sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HardState {
    pub term: Term,
    pub voted_for: Option<MemberId>,
}

impl Default for Term {
    fn default() -> Self {
        Term::ZERO
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failure")]
    Io(#[from] io::Error),

    #[error("log entry at index {0} is missing")]
    MissingEntry(Index),
}

/// Store is the durable collaborator of the consensus engine: it holds the
/// log, the persistent metadata, and the user state machine. The engine owns
/// its store exclusively; every call is synchronous from the engine's point
/// of view.
pub trait Store {
    /// Index and term of the last log entry, `(0, 0)` for an empty log.
    fn last(&self) -> (Index, Term);

    fn lookup(&self, index: Index) -> Option<LogEntry>;

    /// Up to `max` entries starting at `from`, in index order. May return
    /// fewer than `max`.
    fn range(&self, from: Index, max: usize) -> Vec<LogEntry>;

    /// Appends entries contiguously after `last()`, returning the index the
    /// first entry landed at.
    fn append(&mut self, entries: Vec<LogEntry>) -> Result<Index, StoreError>;

    /// Discards every entry with index greater than `keep_up_to`. Idempotent.
    fn truncate(&mut self, keep_up_to: Index) -> Result<(), StoreError>;

    /// Hands a committed command to the user state machine and returns its
    /// output. The state machine must be deterministic over the log.
    fn apply(&mut self, value: &Bytes) -> Result<Bytes, StoreError>;

    /// Durably records the persistent metadata before returning.
    fn save_state(&mut self, hard_state: &HardState) -> Result<(), StoreError>;

    /// Persistent metadata as of the last `save_state`, for engine startup.
    fn load_state(&self) -> HardState;
}
