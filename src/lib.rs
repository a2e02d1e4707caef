mod actor;
mod api;
mod engine;
mod message;
mod store;
mod timer;
mod transport;

pub use actor::Callback;
pub use actor::EngineClient;
pub use actor::Event;
pub use api::start_node;
pub use api::CallError;
pub use api::NodeConfig;
pub use api::NodeHandle;
pub use api::NodeStartError;
pub use api::CLIENT_TIMEOUT;
pub use engine::ClientCallError;
pub use engine::Cohort;
pub use engine::InvalidCohort;
pub use engine::MemberId;
pub use message::AppendEntriesRequest;
pub use message::AppendEntriesResponse;
pub use message::Message;
pub use message::RequestVoteRequest;
pub use message::RequestVoteResponse;
pub use store::AppendStateMachine;
pub use store::Document;
pub use store::DocumentStore;
pub use store::DocumentUpdate;
pub use store::DocumentUpdateError;
pub use store::DocumentUpdateResult;
pub use store::HardState;
pub use store::Index;
pub use store::InMemoryStore;
pub use store::LogEntry;
pub use store::StateMachine;
pub use store::Store;
pub use store::StoreError;
pub use store::Term;
pub use timer::StateTimeout;
pub use timer::TimeoutConfig;
pub use timer::TimerGen;
pub use timer::Timers;
pub use timer::TokioTimers;
pub use transport::LocalRouter;
pub use transport::RouterHandle;
pub use transport::Transport;
