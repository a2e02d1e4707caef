use crate::actor::Callback;
use crate::engine::MemberId;
use crate::message::Message;
use crate::store::StoreError;
use crate::timer::{StateTimeout, TimerGen};
use bytes::Bytes;

/// An externally observable action produced by one event handler. Effects
/// are released only after the persist barrier has flushed any dirty
/// persistent state, so nothing a peer or client sees can outrun durability.
#[derive(Debug)]
pub(crate) enum Effect {
    Cast {
        dest: MemberId,
        message: Message,
    },
    Reply {
        reply: Callback<Bytes, ClientCallError>,
        result: Result<Bytes, ClientCallError>,
    },
    ArmTimer {
        timeout: StateTimeout,
        gen: TimerGen,
    },
}

/// Outcome of handling one event.
#[derive(Debug)]
pub(crate) enum EventResult {
    Continue(Vec<Effect>),
    Stop {
        effects: Vec<Effect>,
        reason: StopReason,
    },
}

#[derive(Debug)]
pub(crate) enum StopReason {
    Requested,
    StoreFailure(StoreError),
}

/// Errors returned to a client call. `Timeout` is enforced by the caller and
/// never observed by the engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientCallError {
    #[error("this member is not the leader")]
    NotLeader { leader_hint: Option<MemberId> },

    #[error("leadership was lost before the command was applied")]
    Deposed,

    #[error("the consensus engine has stopped")]
    EngineStopped,
}
