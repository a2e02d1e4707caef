use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The user state machine owned by the store. `apply` is handed committed
/// commands in log order and must be deterministic: replaying the same log
/// on two instances yields the same outputs and the same final state.
///
/// A command that the machine rejects (bad encoding, stale sequence) is still
/// "applied": the rejection is encoded into the returned output and travels
/// back to the caller, it never fails the store.
pub trait StateMachine: Send + 'static {
    fn apply(&mut self, value: &Bytes) -> Bytes;
}

/// Appends each command's bytes to a growing string and returns the
/// accumulated contents. Used by most of the crate's own tests.
#[derive(Debug, Default)]
pub struct AppendStateMachine {
    contents: String,
}

impl AppendStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

impl StateMachine for AppendStateMachine {
    fn apply(&mut self, value: &Bytes) -> Bytes {
        self.contents.push_str(&String::from_utf8_lossy(value));
        Bytes::from(self.contents.clone())
    }
}

/// A keyed document store. Each update carries the key's next expected update
/// sequence; an update whose sequence is not strictly greater than the last
/// applied one for that key is rejected with `UpdatesOutOfOrder`.
///
/// Commands and results are JSON so that rejections survive the trip through
/// the opaque-payload log unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub key: String,
    pub seq: u64,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentUpdateResult {
    Updated { key: String, seq: u64 },
    Error(DocumentUpdateError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DocumentUpdateError {
    #[error("update sequence {requested_seq} for '{key}' is not newer than applied sequence {applied_seq}")]
    UpdatesOutOfOrder {
        key: String,
        applied_seq: u64,
        requested_seq: u64,
    },

    #[error("update payload is not a valid document update")]
    MalformedUpdate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub seq: u64,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, key: &str) -> Option<&Document> {
        self.documents.get(key)
    }

    fn update(&mut self, update: DocumentUpdate) -> DocumentUpdateResult {
        if let Some(existing) = self.documents.get(&update.key) {
            if update.seq <= existing.seq {
                return DocumentUpdateResult::Error(DocumentUpdateError::UpdatesOutOfOrder {
                    key: update.key,
                    applied_seq: existing.seq,
                    requested_seq: update.seq,
                });
            }
        }

        let result = DocumentUpdateResult::Updated {
            key: update.key.clone(),
            seq: update.seq,
        };
        self.documents.insert(
            update.key,
            Document {
                seq: update.seq,
                body: update.body,
            },
        );
        result
    }
}

impl StateMachine for DocumentStore {
    fn apply(&mut self, value: &Bytes) -> Bytes {
        let result = match serde_json::from_slice::<DocumentUpdate>(value) {
            Ok(update) => self.update(update),
            Err(_) => DocumentUpdateResult::Error(DocumentUpdateError::MalformedUpdate),
        };

        // A DocumentUpdateResult always serializes.
        Bytes::from(serde_json::to_vec(&result).expect("result is serializable"))
    }
}
