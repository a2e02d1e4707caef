use crate::engine::{ClientCallError, ConsensusEngine, Effect, EventResult};
use crate::message::Message;
use crate::store::Store;
use crate::timer::{TimerGen, Timers};
use crate::transport::Transport;
use bytes::Bytes;
use std::fmt;
use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};

/// Every input to the engine, serialized through one queue. The engine
/// handles events strictly one at a time, to completion; that single rule is
/// what makes the term/vote/leadership invariants enforceable without locks.
#[derive(Debug)]
pub enum Event {
    /// A protocol message from a peer. Adversarial or stale content is
    /// tolerated; it can never stop the engine.
    PeerMessage(Message),

    /// A client command to replicate. Only a leader accepts it; the reply is
    /// deferred until the command is applied.
    ClientCall {
        value: Bytes,
        reply: Callback<Bytes, ClientCallError>,
    },

    /// The armed state-timeout fired. Stale generations are ignored.
    TimerExpiry { gen: TimerGen },

    /// Graceful shutdown; pending client replies are deposed.
    Stop,
}

/// One-shot reply handle carried inside an event.
pub struct Callback<O, E>(oneshot::Sender<Result<O, E>>);

impl<O, E> Callback<O, E> {
    pub fn new(sender: oneshot::Sender<Result<O, E>>) -> Self {
        Callback(sender)
    }

    pub fn send(self, message: Result<O, E>) {
        // The caller may have timed out and dropped the receiver. Fine.
        let _ = self.0.send(message);
    }
}

impl<O, E> Debug for Callback<O, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish()
    }
}

/// Cheap cloneable handle for posting events onto an engine's queue.
#[derive(Clone)]
pub struct EngineClient {
    sender: mpsc::Sender<Event>,
}

impl EngineClient {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (EngineClient { sender }, receiver)
    }

    pub async fn call(&self, value: Bytes) -> Result<Bytes, ClientCallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::ClientCall {
                value,
                reply: Callback::new(tx),
            })
            .await
            .map_err(|_| ClientCallError::EngineStopped)?;

        rx.await.map_err(|_| ClientCallError::EngineStopped)?
    }

    /// Best effort: a message for a stopped engine is dropped, exactly as a
    /// lossy transport would drop it.
    pub async fn peer_message(&self, message: Message) {
        let _ = self.sender.send(Event::PeerMessage(message)).await;
    }

    /// Non-blocking delivery for transports. A full or closed queue drops
    /// the message; the protocol tolerates loss.
    pub fn deliver_message(&self, message: Message) {
        let _ = self.sender.try_send(Event::PeerMessage(message));
    }

    pub async fn timer_expiry(&self, gen: TimerGen) {
        let _ = self.sender.send(Event::TimerExpiry { gen }).await;
    }

    pub async fn stop(&self) {
        let _ = self.sender.send(Event::Stop).await;
    }
}

/// EngineActor owns the consensus engine plus its two outward-facing
/// collaborators and runs the event loop.
pub(crate) struct EngineActor<S, T, X>
where
    S: Store,
    T: Transport,
    X: Timers,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    engine: ConsensusEngine<S>,
    transport: T,
    timers: X,
}

impl<S, T, X> EngineActor<S, T, X>
where
    S: Store + Send + 'static,
    T: Transport,
    X: Timers,
{
    pub(crate) fn new(
        logger: slog::Logger,
        receiver: mpsc::Receiver<Event>,
        engine: ConsensusEngine<S>,
        transport: T,
        timers: X,
    ) -> Self {
        EngineActor {
            logger,
            receiver,
            engine,
            transport,
            timers,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        let startup = self.engine.start();
        self.perform(startup);

        while let Some(event) = self.receiver.recv().await {
            slog::trace!(self.logger, "Received: {:?}", event);
            match self.engine.handle_event(event) {
                EventResult::Continue(effects) => self.perform(effects),
                EventResult::Stop { effects, reason } => {
                    self.perform(effects);
                    slog::info!(self.logger, "Engine stopped: {:?}", reason);
                    return;
                }
            }
        }
    }

    // Handlers are synchronous; effect execution must be too. Anything slow
    // lives behind the transport or a timer task and comes back as an event.
    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Cast { dest, message } => self.transport.cast(&dest, message),
                Effect::Reply { reply, result } => reply.send(result),
                Effect::ArmTimer { timeout, gen } => self.timers.arm(timeout, gen),
            }
        }
    }
}
