use crate::actor::Callback;
use crate::engine::engine_api::ClientCallError;
use crate::engine::MemberId;
use crate::store::Index;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The role variant. Role-specific bookkeeping lives inside the variant that
/// needs it, so a non-leader cannot even represent leader state: vote tallies
/// exist only while campaigning, replication cursors and pending client
/// replies only while leading.
pub(crate) enum Role {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl Role {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Role::Follower(_) => "follower",
            Role::Candidate(_) => "candidate",
            Role::Leader(_) => "leader",
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self, Role::Leader(_))
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Follower(fs) => write!(f, "Follower(leader_hint={:?})", fs.leader_hint),
            Role::Candidate(cs) => write!(f, "Candidate(votes={})", cs.votes_granted.len()),
            Role::Leader(ls) => write!(f, "Leader(pending_replies={})", ls.froms.len()),
        }
    }
}

pub(crate) struct FollowerState {
    /// Last member observed acting as leader in the current term, if any.
    /// Returned to redirected clients as a retry hint.
    pub(crate) leader_hint: Option<MemberId>,
}

pub(crate) struct CandidateState {
    /// Members that granted us their vote this term, self included.
    pub(crate) votes_granted: HashSet<MemberId>,
}

pub(crate) struct LeaderState {
    /// Next log index to send each peer.
    pub(crate) next_index: HashMap<MemberId, Index>,
    /// Highest log index known replicated on each peer.
    pub(crate) match_index: HashMap<MemberId, Index>,
    /// Pending client replies keyed by the log index their command landed at.
    /// Fulfilled when the index is applied, or with `Deposed` on exit.
    pub(crate) froms: HashMap<Index, Callback<Bytes, ClientCallError>>,
}

impl LeaderState {
    pub(crate) fn new(peers: impl Iterator<Item = MemberId>, next: Index) -> Self {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in peers {
            next_index.insert(peer.clone(), next);
            match_index.insert(peer, Index::ZERO);
        }

        LeaderState {
            next_index,
            match_index,
            froms: HashMap::new(),
        }
    }

    /// Takes every pending client reply, leaving none behind. Called exactly
    /// once, on the way out of leadership.
    pub(crate) fn drain_pending(&mut self) -> Vec<Callback<Bytes, ClientCallError>> {
        self.froms.drain().map(|(_, callback)| callback).collect()
    }
}
