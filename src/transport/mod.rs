use crate::actor::EngineClient;
use crate::engine::MemberId;
use crate::message::Message;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// The messaging collaborator. `cast` is fire-and-forget and must never
/// block the engine; delivery may drop, duplicate, delay, or reorder.
pub trait Transport: Send + 'static {
    fn cast(&self, dest: &MemberId, message: Message);
}

/// An in-process mesh connecting the engines of one cohort through their
/// event queues. Used by the integration tests and demos; real deployments
/// substitute their own `Transport`.
///
/// `isolate` severs a member both ways, which is how the tests partition a
/// leader away from the rest of the cohort.
#[derive(Clone, Default)]
pub struct LocalRouter {
    inner: Arc<Mutex<RouterInner>>,
}

#[derive(Default)]
struct RouterInner {
    endpoints: HashMap<MemberId, EngineClient>,
    isolated: HashSet<MemberId>,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, member: MemberId, client: EngineClient) {
        self.lock().endpoints.insert(member, client);
    }

    /// The transport endpoint a single member casts through.
    pub fn handle(&self, me: MemberId) -> RouterHandle {
        RouterHandle {
            me,
            router: self.clone(),
        }
    }

    pub fn isolate(&self, member: &MemberId) {
        self.lock().isolated.insert(member.clone());
    }

    pub fn heal(&self, member: &MemberId) {
        self.lock().isolated.remove(member);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterInner> {
        self.inner.lock().expect("router lock poisoned")
    }
}

pub struct RouterHandle {
    me: MemberId,
    router: LocalRouter,
}

impl Transport for RouterHandle {
    fn cast(&self, dest: &MemberId, message: Message) {
        let inner = self.router.lock();
        if inner.isolated.contains(&self.me) || inner.isolated.contains(dest) {
            return;
        }
        if let Some(endpoint) = inner.endpoints.get(dest) {
            endpoint.deliver_message(message);
        }
    }
}
