use crate::actor::EngineClient;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Which state-timeout to arm. Each role arms exactly one: election timeouts
/// for followers and candidates, the fixed heartbeat interval for leaders.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateTimeout {
    Follower,
    Candidate,
    Leader,
}

/// Arming a timer invalidates every previously armed one. The generation
/// token makes that airtight even for an expiry that was already queued
/// behind other events: the engine ignores any expiry whose generation is
/// not the current one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerGen(u64);

impl TimerGen {
    pub fn first() -> Self {
        TimerGen(0)
    }

    pub fn next(self) -> Self {
        TimerGen(self.0 + 1)
    }
}

/// The clock collaborator: arms a single state-timeout. The previously armed
/// timeout, if any, is implicitly cancelled.
pub trait Timers {
    fn arm(&mut self, timeout: StateTimeout, gen: TimerGen);
}

#[derive(Copy, Clone, Debug)]
pub struct TimeoutConfig {
    pub follower_min: Duration,
    pub follower_max: Duration,
    pub candidate_min: Duration,
    pub candidate_max: Duration,
    pub heartbeat: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            follower_min: Duration::from_millis(150),
            follower_max: Duration::from_millis(300),
            candidate_min: Duration::from_millis(15),
            candidate_max: Duration::from_millis(30),
            heartbeat: Duration::from_millis(75),
        }
    }
}

/// Tokio-backed timer source. Every arm spawns a one-shot task that sleeps,
/// then posts a timer-expiry event back onto the engine's queue; the
/// previous task is aborted so at most one timer is in flight.
pub struct TokioTimers {
    client: EngineClient,
    config: TimeoutConfig,
    current: Option<JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new(client: EngineClient, config: TimeoutConfig) -> Self {
        TokioTimers {
            client,
            config,
            current: None,
        }
    }

    fn duration_for(&self, timeout: StateTimeout) -> Duration {
        let mut rng = rand::thread_rng();
        match timeout {
            StateTimeout::Follower => {
                rng.gen_range(self.config.follower_min..=self.config.follower_max)
            }
            StateTimeout::Candidate => {
                rng.gen_range(self.config.candidate_min..=self.config.candidate_max)
            }
            StateTimeout::Leader => self.config.heartbeat,
        }
    }
}

impl Timers for TokioTimers {
    fn arm(&mut self, timeout: StateTimeout, gen: TimerGen) {
        if let Some(previous) = self.current.take() {
            previous.abort();
        }

        let duration = self.duration_for(timeout);
        let client = self.client.clone();
        self.current = Some(tokio::task::spawn(async move {
            tokio::time::sleep(duration).await;
            client.timer_expiry(gen).await;
        }));
    }
}
