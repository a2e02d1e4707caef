use crate::actor::EngineClient;
use crate::engine::{ClientCallError, MemberId};
use bytes::Bytes;
use tokio::time::Duration;

/// How long a client call may wait for its command to commit and apply.
/// Enforced here, on the calling side; the engine never observes it.
pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Handle to one running consensus node.
pub struct NodeHandle {
    engine: EngineClient,
}

impl NodeHandle {
    pub(crate) fn new(engine: EngineClient) -> Self {
        NodeHandle { engine }
    }

    /// Submits an opaque command for replication and returns the state
    /// machine's output once the command has been committed and applied.
    ///
    /// `NotLeader` means retry against another member (the hint, if any, is
    /// the member to try). `Deposed` means this leader accepted the command
    /// but lost leadership first; the command may or may not survive, so
    /// retries must be idempotent at the application layer.
    pub async fn call(&self, value: impl Into<Bytes>) -> Result<Bytes, CallError> {
        match tokio::time::timeout(CLIENT_TIMEOUT, self.engine.call(value.into())).await {
            Err(_elapsed) => Err(CallError::Timeout),
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Graceful shutdown. Pending calls on this node are deposed.
    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    /// The node's event-queue client, for wiring transports to it.
    pub fn client(&self) -> EngineClient {
        self.engine.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("called member is not the leader")]
    NotLeader { leader_hint: Option<MemberId> },

    #[error("leadership was lost before the command was applied")]
    Deposed,

    #[error("call timed out")]
    Timeout,

    #[error("the node has stopped")]
    NodeDown,
}

impl From<ClientCallError> for CallError {
    fn from(e: ClientCallError) -> Self {
        match e {
            ClientCallError::NotLeader { leader_hint } => CallError::NotLeader { leader_hint },
            ClientCallError::Deposed => CallError::Deposed,
            ClientCallError::EngineStopped => CallError::NodeDown,
        }
    }
}
