//! Per-peer state machine: DISCOVERED → ALIVE → ACTIVE, with eviction
//! contests and reputation-aware death.
//!
//! Reference: §4.2 (Node Handler State Machine).
//!
//! The upstream routing table used to fold ping-challenge and eviction-
//! contest bookkeeping directly into the k-bucket. That state belongs to
//! a single peer's lifecycle, not to the bucket it happens to occupy, so
//! it lives here instead; the routing table stays a plain add/drop/touch/
//! closest contract (§4.1).

use crate::domain::identity::{Node, NodeId, Timestamp};

/// Ping retries granted before a `DISCOVERED`/`EVICTCANDIDATE` handler is
/// declared failed.
pub const PING_TRIALS: u8 = 2;

/// Reputation floor below which an `ACTIVE` handler that exhausts its ping
/// trials is allowed to die instead of being granted a grace period.
pub const DEATH_REPUTATION_THRESHOLD: i32 = 20;

pub const PING_REWARD: i32 = 5;
pub const PING_PENALTY: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Discovered,
    WaitForPong,
    Alive,
    Active,
    EvictCandidate,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    RewardAndAdvance,
    PenalizeAndRetry,
    PenalizeAndFail,
}

/// Everything the state machine needs about one remote peer.
#[derive(Debug, Clone)]
pub struct NodeHandler {
    pub node: Node,
    pub state: HandlerState,
    trials_remaining: u8,
    waiting_for_neighbors: bool,
    /// Set only in `EvictCandidate`: the challenger waiting to take this
    /// handler's bucket slot if the challenge fails.
    challenger: Option<Node>,
}

impl NodeHandler {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            state: HandlerState::Discovered,
            trials_remaining: PING_TRIALS,
            waiting_for_neighbors: false,
            challenger: None,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node.id
    }

    /// Begin (or retry) a ping round trip; arms the timeout trial counter.
    pub fn send_ping(&mut self) {
        if matches!(self.state, HandlerState::Discovered | HandlerState::Dead) {
            self.state = HandlerState::WaitForPong;
        }
    }

    /// A pong arrived. `local_network_id` gates compatibility; an
    /// incompatible pong kills the handler outright.
    pub fn on_pong(&mut self, remote_network_id: u64, local_network_id: u64) -> PingOutcome {
        if remote_network_id != local_network_id {
            self.state = HandlerState::Dead;
            return PingOutcome::PenalizeAndFail;
        }
        self.trials_remaining = PING_TRIALS;
        match self.state {
            HandlerState::WaitForPong => {
                self.state = HandlerState::Alive;
            }
            HandlerState::EvictCandidate => {
                self.state = HandlerState::Active;
                self.challenger = None;
            }
            _ => {}
        }
        PingOutcome::RewardAndAdvance
    }

    /// A scheduled ping timed out. Returns the outcome so the caller can
    /// apply the reputation delta; `self.state` reflects the terminal
    /// effect when trials are exhausted.
    pub fn on_ping_timeout(&mut self, current_reputation: i32) -> PingOutcome {
        if self.trials_remaining > 1 {
            self.trials_remaining -= 1;
            return PingOutcome::PenalizeAndRetry;
        }
        match self.state {
            HandlerState::Active if current_reputation >= DEATH_REPUTATION_THRESHOLD => {
                // grace period: stays ACTIVE
            }
            // EVICTCANDIDATE is the incumbent being pinged during an
            // eviction contest; an unanswered ping means the challenger
            // wins and the incumbent is evicted (§4.2).
            _ => {
                self.state = HandlerState::Dead;
            }
        }
        PingOutcome::PenalizeAndFail
    }

    /// Table admission decided the fate of a `WaitForPong`/`Alive` handler
    /// once its pong resolved ok: `bucket_full == false` promotes straight
    /// to `ACTIVE`. When the bucket is full, the caller (service layer)
    /// runs the eviction contest and calls [`Self::promote`] or
    /// [`Self::begin_eviction_contest`] accordingly.
    pub fn promote(&mut self) {
        self.state = HandlerState::Active;
    }

    /// This (already `ACTIVE`) handler is the incumbent being challenged
    /// by `challenger` for a full bucket slot.
    pub fn begin_eviction_contest(&mut self, challenger: Node) {
        self.state = HandlerState::EvictCandidate;
        self.trials_remaining = PING_TRIALS;
        self.challenger = Some(challenger);
    }

    pub fn challenger(&self) -> Option<&Node> {
        self.challenger.as_ref()
    }

    /// An incoming ping from a compatible peer resurrects a `DEAD` handler.
    pub fn on_incoming_ping(&mut self, remote_network_id: u64, local_network_id: u64) {
        if remote_network_id != local_network_id {
            self.state = HandlerState::Dead;
            return;
        }
        if self.state == HandlerState::Dead {
            self.state = HandlerState::Discovered;
            self.trials_remaining = PING_TRIALS;
        }
    }

    pub fn request_neighbors(&mut self) {
        self.waiting_for_neighbors = true;
    }

    /// Whether an incoming `KAD_NEIGHBORS` should be accepted right now.
    /// Accepting clears the flag; callers must still self-filter the
    /// neighbor list before insertion.
    pub fn accept_neighbors(&mut self) -> bool {
        let accepted = self.waiting_for_neighbors;
        self.waiting_for_neighbors = false;
        accepted
    }

    pub fn is_dead(&self) -> bool {
        self.state == HandlerState::Dead
    }
}

/// Drop any entries in `neighbors` matching `local_id`, per the
/// self-filter rule.
pub fn filter_self(neighbors: Vec<Node>, local_id: &NodeId) -> Vec<Node> {
    neighbors
        .into_iter()
        .filter(|n| n.id.as_ref() != Some(local_id))
        .collect()
}

pub fn touch_and_stamp(node: &mut Node, now: Timestamp) {
    node.touch(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::IpAddr;

    fn sample_node(byte: u8) -> Node {
        Node::new(
            NodeId::new([byte; crate::domain::identity::NODE_ID_LEN]),
            IpAddr::v4(1, 2, 3, byte),
            30303,
            1,
            Timestamp::new(0),
        )
    }

    #[test]
    fn ping_then_compatible_pong_moves_to_alive() {
        let mut h = NodeHandler::new(sample_node(1));
        h.send_ping();
        assert_eq!(h.state, HandlerState::WaitForPong);
        let outcome = h.on_pong(1, 1);
        assert_eq!(outcome, PingOutcome::RewardAndAdvance);
        assert_eq!(h.state, HandlerState::Alive);
    }

    #[test]
    fn incompatible_pong_kills_handler() {
        let mut h = NodeHandler::new(sample_node(1));
        h.send_ping();
        let outcome = h.on_pong(2, 1);
        assert_eq!(outcome, PingOutcome::PenalizeAndFail);
        assert_eq!(h.state, HandlerState::Dead);
    }

    #[test]
    fn exhausted_trials_kill_discovered_handler() {
        let mut h = NodeHandler::new(sample_node(1));
        h.send_ping();
        assert_eq!(h.on_ping_timeout(100), PingOutcome::PenalizeAndRetry);
        assert_eq!(h.on_ping_timeout(100), PingOutcome::PenalizeAndFail);
        assert_eq!(h.state, HandlerState::Dead);
    }

    #[test]
    fn active_handler_with_good_reputation_survives_timeout() {
        let mut h = NodeHandler::new(sample_node(1));
        h.state = HandlerState::Active;
        h.on_ping_timeout(100);
        assert_eq!(h.on_ping_timeout(100), PingOutcome::PenalizeAndFail);
        assert_eq!(h.state, HandlerState::Active);
    }

    #[test]
    fn active_handler_with_low_reputation_dies_on_timeout() {
        let mut h = NodeHandler::new(sample_node(1));
        h.state = HandlerState::Active;
        h.on_ping_timeout(10);
        h.on_ping_timeout(10);
        assert_eq!(h.state, HandlerState::Dead);
    }

    #[test]
    fn eviction_contest_challenger_wins_on_incumbent_timeout() {
        let mut h = NodeHandler::new(sample_node(1));
        h.state = HandlerState::Active;
        h.begin_eviction_contest(sample_node(2));
        h.on_ping_timeout(100);
        h.on_ping_timeout(100);
        assert_eq!(h.state, HandlerState::Dead);
    }

    #[test]
    fn eviction_contest_incumbent_survives_on_pong() {
        let mut h = NodeHandler::new(sample_node(1));
        h.state = HandlerState::EvictCandidate;
        h.challenger = Some(sample_node(2));
        assert_eq!(h.on_pong(1, 1), PingOutcome::RewardAndAdvance);
        assert_eq!(h.state, HandlerState::Active);
        assert!(h.challenger().is_none());
    }

    #[test]
    fn dead_handler_revives_on_compatible_ping() {
        let mut h = NodeHandler::new(sample_node(1));
        h.state = HandlerState::Dead;
        h.on_incoming_ping(1, 1);
        assert_eq!(h.state, HandlerState::Discovered);
    }

    #[test]
    fn unsolicited_neighbors_rejected() {
        let mut h = NodeHandler::new(sample_node(1));
        assert!(!h.accept_neighbors());
        h.request_neighbors();
        assert!(h.accept_neighbors());
        assert!(!h.accept_neighbors());
    }

    #[test]
    fn self_filter_drops_local_id() {
        let local = NodeId::new([9u8; crate::domain::identity::NODE_ID_LEN]);
        let mut n = sample_node(9);
        n.id = Some(local);
        let neighbors = vec![sample_node(1), n, sample_node(3)];
        let filtered = filter_self(neighbors, &local);
        assert_eq!(filtered.len(), 2);
    }
}
