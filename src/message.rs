use crate::engine::MemberId;
use crate::store::{Index, LogEntry, Term};
use serde::{Deserialize, Serialize};

/// The four peer-to-peer messages of the protocol. The transport may drop,
/// duplicate, delay, or reorder them arbitrarily; the engine tolerates all of
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    RequestVoteRequest(RequestVoteRequest),
    RequestVoteResponse(RequestVoteResponse),
    AppendEntriesRequest(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
}

impl Message {
    pub fn term(&self) -> Term {
        match self {
            Message::RequestVoteRequest(m) => m.term,
            Message::RequestVoteResponse(m) => m.term,
            Message::AppendEntriesRequest(m) => m.term,
            Message::AppendEntriesResponse(m) => m.term,
        }
    }

    pub fn source(&self) -> &MemberId {
        match self {
            Message::RequestVoteRequest(m) => &m.source,
            Message::RequestVoteResponse(m) => &m.source,
            Message::AppendEntriesRequest(m) => &m.source,
            Message::AppendEntriesResponse(m) => &m.source,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub source: MemberId,
    pub last_log_index: Index,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub source: MemberId,
    pub vote_granted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub source: MemberId,
    pub prev_log_index: Index,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub commit_index: Index,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub source: MemberId,
    pub success: bool,
    pub match_index: Index,
}
