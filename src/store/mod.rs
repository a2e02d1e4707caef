mod in_memory;
mod state_machine;
mod store;

pub use in_memory::InMemoryStore;
pub use state_machine::AppendStateMachine;
pub use state_machine::Document;
pub use state_machine::DocumentStore;
pub use state_machine::DocumentUpdate;
pub use state_machine::DocumentUpdateError;
pub use state_machine::DocumentUpdateResult;
pub use state_machine::StateMachine;
pub use store::HardState;
pub use store::Index;
pub use store::LogEntry;
pub use store::Store;
pub use store::StoreError;
pub use store::Term;
