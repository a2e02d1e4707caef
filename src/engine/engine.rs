use crate::actor::{Callback, Event};
use crate::engine::cohort::{Cohort, MemberId};
use crate::engine::engine_api::{ClientCallError, Effect, EventResult, StopReason};
use crate::engine::role::{CandidateState, FollowerState, LeaderState, Role};
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, Message, RequestVoteRequest, RequestVoteResponse,
};
use crate::store::{HardState, Index, LogEntry, Store, StoreError, Term};
use crate::timer::{StateTimeout, TimerGen};
use bytes::Bytes;
use std::cmp;
use std::collections::HashSet;
use std::mem;

/// Ceiling on entries shipped per AppendEntries.
pub(crate) const BATCH_SIZE: usize = 10;

/// The consensus engine: a single-threaded state machine over four event
/// kinds. Each event is handled to completion and produces a list of
/// effects; if the handler touched `term` or `voted_for`, the persist
/// barrier flushes them to the store before any effect is released.
pub(crate) struct ConsensusEngine<S: Store> {
    logger: slog::Logger,
    cohort: Cohort,
    store: S,
    hard_state: HardStateTracker,
    commit_index: Index,
    last_applied: Index,
    role: Role,
    timer_gen: TimerGen,
    effects: Vec<Effect>,
}

impl<S: Store> ConsensusEngine<S> {
    pub(crate) fn new(logger: slog::Logger, cohort: Cohort, store: S, initial: HardState) -> Self {
        ConsensusEngine {
            logger,
            cohort,
            store,
            hard_state: HardStateTracker::new(initial),
            commit_index: Index::ZERO,
            last_applied: Index::ZERO,
            role: Role::Follower(FollowerState { leader_hint: None }),
            timer_gen: TimerGen::first(),
            effects: Vec::new(),
        }
    }

    /// Arms the initial follower election timer. Called once, before any
    /// event is dequeued.
    pub(crate) fn start(&mut self) -> Vec<Effect> {
        slog::info!(
            self.logger, "Starting as follower";
            "term" => %self.hard_state.term(),
        );
        self.arm(StateTimeout::Follower);
        mem::take(&mut self.effects)
    }

    pub(crate) fn handle_event(&mut self, event: Event) -> EventResult {
        let handled = match event {
            Event::PeerMessage(message) => self.on_message(message),
            Event::ClientCall { value, reply } => self.on_client_call(value, reply),
            Event::TimerExpiry { gen } => self.on_timer(gen),
            Event::Stop => return self.on_stop(),
        };

        match handled.and_then(|()| self.flush_hard_state()) {
            Ok(()) => EventResult::Continue(mem::take(&mut self.effects)),
            Err(e) => self.fail(e),
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn on_message(&mut self, message: Message) -> Result<(), StoreError> {
        if !self.cohort.contains(message.source()) {
            slog::warn!(
                self.logger, "Dropping message from non-member";
                "source" => %message.source(),
            );
            return Ok(());
        }

        // Universal precedence rule: a newer term immediately demotes us,
        // then the same message is handled under the new state.
        if message.term() > self.hard_state.term() {
            slog::debug!(
                self.logger, "Observed newer term, stepping down";
                "msg_term" => %message.term(),
                "term" => %self.hard_state.term(),
            );
            self.hard_state.set_term(message.term());
            self.become_follower(None);
        }

        match message {
            Message::RequestVoteRequest(request) => {
                self.on_request_vote(request);
                Ok(())
            }
            Message::RequestVoteResponse(response) => {
                self.on_vote_response(response);
                Ok(())
            }
            Message::AppendEntriesRequest(request) => self.on_append_entries(request),
            Message::AppendEntriesResponse(response) => self.on_append_entries_response(response),
        }
    }

    fn on_timer(&mut self, gen: TimerGen) -> Result<(), StoreError> {
        if gen != self.timer_gen {
            // A timer armed by an earlier state; its cancellation raced the
            // queue.
            return Ok(());
        }

        if self.role.is_leader() {
            return self.heartbeat();
        }

        if matches!(self.role, Role::Candidate(_)) {
            slog::info!(
                self.logger, "Election inconclusive, starting another";
                "term" => %self.hard_state.term(),
            );
        } else {
            slog::info!(
                self.logger, "Election timeout, starting election";
                "term" => %self.hard_state.term(),
            );
        }
        self.start_election();
        Ok(())
    }

    fn on_client_call(
        &mut self,
        value: Bytes,
        reply: Callback<Bytes, ClientCallError>,
    ) -> Result<(), StoreError> {
        if self.role.is_leader() {
            let entry = LogEntry {
                term: self.hard_state.term(),
                value,
            };
            let index = self.store.append(vec![entry])?;
            slog::debug!(
                self.logger, "Accepted client command";
                "index" => %index,
            );
            if let Role::Leader(leader) = &mut self.role {
                leader.froms.insert(index, reply);
            }
            return Ok(());
        }

        let leader_hint = match &self.role {
            Role::Follower(follower) => follower.leader_hint.clone(),
            _ => None,
        };
        self.effects.push(Effect::Reply {
            reply,
            result: Err(ClientCallError::NotLeader { leader_hint }),
        });
        Ok(())
    }

    fn on_stop(&mut self) -> EventResult {
        slog::info!(self.logger, "Stop requested");
        self.depose_pending_replies();
        EventResult::Stop {
            effects: mem::take(&mut self.effects),
            reason: StopReason::Requested,
        }
    }

    // ------------------------------------------------------------------
    // RequestVote
    // ------------------------------------------------------------------

    fn on_request_vote(&mut self, request: RequestVoteRequest) {
        let current_term = self.hard_state.term();
        if request.term < current_term {
            self.send_vote_response(request.source, false);
            return;
        }

        // The candidate's log must be at least as up-to-date as ours, and we
        // must not have granted this term's vote to anyone else.
        let (last_index, last_term) = self.store.last();
        let log_ok = request.last_log_term > last_term
            || (request.last_log_term == last_term && request.last_log_index >= last_index);
        let vote_free = match self.hard_state.voted_for() {
            None => true,
            Some(voted_for) => voted_for == &request.source,
        };

        if log_ok && vote_free {
            slog::info!(
                self.logger, "Granting vote";
                "candidate" => %request.source,
                "term" => %request.term,
            );
            self.hard_state.set_voted_for(Some(request.source.clone()));
            if let Role::Follower(_) = self.role {
                self.arm(StateTimeout::Follower);
            }
            self.send_vote_response(request.source, true);
        } else {
            self.send_vote_response(request.source, false);
        }
    }

    fn on_vote_response(&mut self, response: RequestVoteResponse) {
        if response.term < self.hard_state.term() {
            // Leftover from an election we have moved past.
            return;
        }

        let won = match &mut self.role {
            Role::Candidate(candidate) => {
                if !response.vote_granted {
                    return;
                }
                candidate.votes_granted.insert(response.source);
                candidate.votes_granted.len() >= self.cohort.majority()
            }
            _ => return,
        };

        if won {
            self.become_leader();
        }
    }

    fn start_election(&mut self) {
        let new_term = self.hard_state.term().next();
        self.hard_state.set_term(new_term);
        self.hard_state.set_voted_for(Some(self.cohort.me().clone()));

        let mut votes_granted = HashSet::new();
        votes_granted.insert(self.cohort.me().clone());
        self.role = Role::Candidate(CandidateState { votes_granted });
        self.arm(StateTimeout::Candidate);

        let (last_log_index, last_log_term) = self.store.last();
        let requests: Vec<Effect> = self
            .cohort
            .peers()
            .map(|peer| Effect::Cast {
                dest: peer.clone(),
                message: Message::RequestVoteRequest(RequestVoteRequest {
                    term: new_term,
                    source: self.cohort.me().clone(),
                    last_log_index,
                    last_log_term,
                }),
            })
            .collect();
        self.effects.extend(requests);

        // A cohort of one wins on its own vote.
        if self.cohort.majority() <= 1 {
            self.become_leader();
        }
    }

    fn become_leader(&mut self) {
        let (last_index, _) = self.store.last();
        slog::info!(
            self.logger, "Won election";
            "term" => %self.hard_state.term(),
            "last_index" => %last_index,
        );
        self.role = Role::Leader(LeaderState::new(
            self.cohort.peers().cloned(),
            last_index.plus(1),
        ));
        self.arm(StateTimeout::Leader);
    }

    fn become_follower(&mut self, leader_hint: Option<MemberId>) {
        self.depose_pending_replies();
        self.hard_state.set_voted_for(None);
        self.role = Role::Follower(FollowerState { leader_hint });
        self.arm(StateTimeout::Follower);
    }

    fn depose_pending_replies(&mut self) {
        if let Role::Leader(leader) = &mut self.role {
            let pending = leader.drain_pending();
            if !pending.is_empty() {
                slog::info!(
                    self.logger, "Deposing pending client replies";
                    "count" => pending.len(),
                );
            }
            for reply in pending {
                self.effects.push(Effect::Reply {
                    reply,
                    result: Err(ClientCallError::Deposed),
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // AppendEntries
    // ------------------------------------------------------------------

    fn on_append_entries(&mut self, request: AppendEntriesRequest) -> Result<(), StoreError> {
        let current_term = self.hard_state.term();
        if request.term < current_term {
            self.send_append_response(request.source, false, Index::ZERO);
            return Ok(());
        }

        // request.term == current_term past this point.
        if self.role.is_leader() {
            // Two leaders in one term would break election safety; a
            // correct cohort cannot produce this.
            slog::error!(
                self.logger, "AppendEntries from another leader in my term";
                "source" => %request.source,
                "term" => %request.term,
            );
            return Ok(());
        }

        if matches!(self.role, Role::Candidate(_)) {
            // Someone else won this term.
            slog::info!(
                self.logger, "Leader established, abandoning candidacy";
                "leader" => %request.source,
                "term" => %request.term,
            );
            self.become_follower(Some(request.source.clone()));
        }

        if let Role::Follower(follower) = &mut self.role {
            follower.leader_hint = Some(request.source.clone());
        }

        loop {
            let (last_index, _) = self.store.last();
            let prev = request.prev_log_index;
            let log_ok = prev.is_zero()
                || (prev <= last_index && self.term_at(prev) == request.prev_log_term);

            if !log_ok {
                self.send_append_response(request.source.clone(), false, Index::ZERO);
                break;
            }

            if request.entries.is_empty() {
                self.advance_follower_commit(request.commit_index, last_index)?;
                self.send_append_response(request.source.clone(), true, prev);
                break;
            }

            match self.store.lookup(prev.plus(1)) {
                Some(existing) if existing.term == request.entries[0].term => {
                    // Already have these; acknowledge the full batch.
                    let match_index = prev.plus(request.entries.len() as u64);
                    self.advance_follower_commit(request.commit_index, last_index)?;
                    self.send_append_response(request.source.clone(), true, match_index);
                    break;
                }
                Some(_) => {
                    // Conflict: trim the tail one entry at a time, re-check.
                    slog::info!(
                        self.logger, "Log conflict, truncating";
                        "keep_up_to" => %last_index.minus_one(),
                    );
                    self.store.truncate(last_index.minus_one())?;
                }
                None => {
                    // log_ok and no entry at prev+1 means last() == prev.
                    self.store.append(request.entries.clone())?;
                }
            }
        }

        // Heard from the current term's leader; push the election out.
        self.arm(StateTimeout::Follower);
        Ok(())
    }

    fn on_append_entries_response(
        &mut self,
        response: AppendEntriesResponse,
    ) -> Result<(), StoreError> {
        if response.term < self.hard_state.term() {
            return Ok(());
        }

        let advanced = match &mut self.role {
            Role::Leader(leader) => {
                if response.success {
                    leader
                        .match_index
                        .insert(response.source.clone(), response.match_index);
                    leader
                        .next_index
                        .insert(response.source, response.match_index.plus(1));
                    true
                } else {
                    let next = leader
                        .next_index
                        .get(&response.source)
                        .copied()
                        .unwrap_or(Index::new(1));
                    let backed_off = Index::new(cmp::max(1, next.val().saturating_sub(1)));
                    leader.next_index.insert(response.source, backed_off);
                    false
                }
            }
            _ => false,
        };

        if advanced {
            self.advance_commit()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Leader replication
    // ------------------------------------------------------------------

    fn heartbeat(&mut self) -> Result<(), StoreError> {
        let plan: Vec<(MemberId, Index)> = match &self.role {
            Role::Leader(leader) => leader
                .next_index
                .iter()
                .map(|(peer, next)| (peer.clone(), *next))
                .collect(),
            _ => return Ok(()),
        };

        let term = self.hard_state.term();
        let (last_index, _) = self.store.last();

        for (peer, next) in plan {
            let prev = next.minus_one();
            let prev_term = self.term_at(prev);
            let entries = self.store.range(prev.plus(1), BATCH_SIZE);
            // Shipped commit index is capped just past this peer's
            // replication point.
            let commit_index = cmp::min(self.commit_index, cmp::min(last_index, prev.plus(2)));

            self.effects.push(Effect::Cast {
                dest: peer,
                message: Message::AppendEntriesRequest(AppendEntriesRequest {
                    term,
                    source: self.cohort.me().clone(),
                    prev_log_index: prev,
                    prev_log_term: prev_term,
                    entries,
                    commit_index,
                }),
            });
        }

        self.advance_commit()?;
        self.arm(StateTimeout::Leader);
        Ok(())
    }

    /// Commit advancement: the median of the cohort's replication points
    /// (our own last index standing in for ourselves), gated on the entry
    /// being from the current term.
    fn advance_commit(&mut self) -> Result<(), StoreError> {
        let candidate = match &self.role {
            Role::Leader(leader) => {
                let (last_index, _) = self.store.last();
                let mut indexes: Vec<Index> = vec![last_index];
                indexes.extend(leader.match_index.values().copied());
                indexes.sort();
                indexes[self.cohort.len() / 2]
            }
            _ => return Ok(()),
        };

        if candidate > self.commit_index && self.term_at(candidate) == self.hard_state.term() {
            slog::debug!(
                self.logger, "Advancing commit index";
                "commit_index" => %candidate,
            );
            self.commit_index = candidate;
            self.apply_committed()?;
        }
        Ok(())
    }

    fn advance_follower_commit(
        &mut self,
        leader_commit: Index,
        last_index: Index,
    ) -> Result<(), StoreError> {
        let new_commit = cmp::min(leader_commit, last_index);
        if new_commit > self.commit_index {
            self.commit_index = new_commit;
            self.apply_committed()?;
        }
        Ok(())
    }

    /// Hands every newly committed entry to the state machine, in index
    /// order, and fulfills the pending client reply if we hold one.
    fn apply_committed(&mut self) -> Result<(), StoreError> {
        while self.last_applied < self.commit_index {
            let index = self.last_applied.plus(1);
            let entry = self
                .store
                .lookup(index)
                .ok_or(StoreError::MissingEntry(index))?;
            let result = self.store.apply(&entry.value)?;

            let pending = match &mut self.role {
                Role::Leader(leader) => leader.froms.remove(&index),
                _ => None,
            };
            if let Some(reply) = pending {
                self.effects.push(Effect::Reply {
                    reply,
                    result: Ok(result),
                });
            }

            self.last_applied = index;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn term_at(&self, index: Index) -> Term {
        if index.is_zero() {
            return Term::ZERO;
        }
        self.store
            .lookup(index)
            .map(|entry| entry.term)
            .unwrap_or(Term::ZERO)
    }

    fn send_vote_response(&mut self, dest: MemberId, vote_granted: bool) {
        self.effects.push(Effect::Cast {
            dest,
            message: Message::RequestVoteResponse(RequestVoteResponse {
                term: self.hard_state.term(),
                source: self.cohort.me().clone(),
                vote_granted,
            }),
        });
    }

    fn send_append_response(&mut self, dest: MemberId, success: bool, match_index: Index) {
        self.effects.push(Effect::Cast {
            dest,
            message: Message::AppendEntriesResponse(AppendEntriesResponse {
                term: self.hard_state.term(),
                source: self.cohort.me().clone(),
                success,
                match_index,
            }),
        });
    }

    fn arm(&mut self, timeout: StateTimeout) {
        self.timer_gen = self.timer_gen.next();
        self.effects.push(Effect::ArmTimer {
            timeout,
            gen: self.timer_gen,
        });
    }

    /// The persist barrier. Runs after every handler, before any effect is
    /// released.
    fn flush_hard_state(&mut self) -> Result<(), StoreError> {
        if let Some(snapshot) = self.hard_state.snapshot_if_dirty() {
            self.store.save_state(&snapshot)?;
        }
        Ok(())
    }

    fn fail(&mut self, error: StoreError) -> EventResult {
        slog::error!(self.logger, "Store failure, terminating: {}", error);
        // Effects produced by the failed handler were never made durable;
        // dropping them also closes any pending reply channels.
        self.effects.clear();
        EventResult::Stop {
            effects: Vec::new(),
            reason: StopReason::StoreFailure(error),
        }
    }
}

/// Tracks the persistent fields and whether they changed since the last
/// flush. A term advance implicitly clears the vote.
struct HardStateTracker {
    current: HardState,
    dirty: bool,
}

impl HardStateTracker {
    fn new(initial: HardState) -> Self {
        HardStateTracker {
            current: initial,
            dirty: false,
        }
    }

    fn term(&self) -> Term {
        self.current.term
    }

    fn voted_for(&self) -> Option<&MemberId> {
        self.current.voted_for.as_ref()
    }

    fn set_term(&mut self, term: Term) {
        if term != self.current.term {
            self.current.term = term;
            self.current.voted_for = None;
            self.dirty = true;
        }
    }

    fn set_voted_for(&mut self, voted_for: Option<MemberId>) {
        if self.current.voted_for != voted_for {
            self.current.voted_for = voted_for;
            self.dirty = true;
        }
    }

    fn snapshot_if_dirty(&mut self) -> Option<HardState> {
        if self.dirty {
            self.dirty = false;
            Some(self.current.clone())
        } else {
            None
        }
    }
}
