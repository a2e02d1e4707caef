use crate::actor::{EngineActor, EngineClient};
use crate::api::client::NodeHandle;
use crate::engine::{Cohort, ConsensusEngine, InvalidCohort, MemberId};
use crate::store::Store;
use crate::timer::{TimeoutConfig, TokioTimers};
use crate::transport::Transport;

const EVENT_QUEUE_SIZE: usize = 64;

pub struct NodeConfig {
    pub me: MemberId,
    /// Every member of the consensus group, this node included. Fixed for
    /// the life of the node.
    pub cohort: Vec<MemberId>,
    pub timeouts: TimeoutConfig,
    pub logger: slog::Logger,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeStartError {
    #[error("invalid cohort")]
    InvalidCohort(#[from] InvalidCohort),
}

/// Builds one consensus node around the given store and transport and spawns
/// its event loop onto the current tokio runtime. The node starts as a
/// follower, with persistent state read back from the store.
pub fn start_node<S, T>(
    config: NodeConfig,
    store: S,
    transport: T,
) -> Result<NodeHandle, NodeStartError>
where
    S: Store + Send + 'static,
    T: Transport,
{
    let cohort = Cohort::new(config.me.clone(), config.cohort)?;
    let logger = config.logger.new(slog::o!("member" => config.me.to_string()));

    let (client, event_queue_rx) = EngineClient::new(EVENT_QUEUE_SIZE);
    let timers = TokioTimers::new(client.clone(), config.timeouts);

    let initial = store.load_state();
    let engine = ConsensusEngine::new(logger.clone(), cohort, store, initial);

    let actor = EngineActor::new(logger, event_queue_rx, engine, transport, timers);
    tokio::task::spawn(actor.run_event_loop());

    Ok(NodeHandle::new(client))
}
