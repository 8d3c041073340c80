//! Kademlia service: handler map, wire dispatch, and the discover loop.
//!
//! Reference: §4.3 (Kademlia Service).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::adapters::network::{decode_neighbors, MessageType};
use crate::domain::identity::{Node, NodeId, SocketAddr, Timestamp, NODE_ID_LEN};
use crate::domain::node_handler::{filter_self, HandlerState, NodeHandler, PingOutcome, PING_PENALTY, PING_REWARD};
use crate::domain::reputation::ReputationTable;
use crate::domain::routing_table::{RoutingTable, RoutingTableStats};
use crate::ports::outbound::{KademliaConfig, MetricsSink, NetworkSocket, RandomSource, TimeSource};

/// How long an outstanding ping is given before it's considered timed out.
/// Not spelled out numerically by the component contract (only the
/// trial/penalty counts are); chosen to sit comfortably under
/// `discover_cycle_ms` so a lost ping resolves before the next cycle.
const PING_TIMEOUT_SECS: u64 = 2;

/// Cadence of the dedicated ping-timeout scheduler (§4.3, "Ping timeout
/// scheduling"). Runs independently of the discover loop's own timer so a
/// slow discover cycle never delays timing out a stuck handler.
const PING_TIMEOUT_TICK: Duration = Duration::from_millis(500);

fn parse_node_id(body: &[u8]) -> Option<NodeId> {
    if body.len() < NODE_ID_LEN {
        return None;
    }
    let mut arr = [0u8; NODE_ID_LEN];
    arr.copy_from_slice(&body[..NODE_ID_LEN]);
    Some(NodeId::new(arr))
}

/// Owns the Kademlia handler map and routing table, and dispatches inbound
/// wire traffic into the node-handler state machine (§4.2).
pub struct KademliaService {
    local_node_id: NodeId,
    config: KademliaConfig,
    local_has_ipv4: bool,
    routing_table: Mutex<RoutingTable>,
    handlers: Mutex<HashMap<SocketAddr, NodeHandler>>,
    pending_pings: Mutex<HashMap<SocketAddr, Timestamp>>,
    reputation: Mutex<ReputationTable>,
    socket: Arc<dyn NetworkSocket>,
    time: Arc<dyn TimeSource>,
    random: Mutex<Box<dyn RandomSource + Send>>,
    metrics: Arc<dyn MetricsSink>,
    closed: AtomicBool,
    discover_task: Mutex<Option<JoinHandle<()>>>,
    ping_timeout_task: Mutex<Option<JoinHandle<()>>>,
}

impl KademliaService {
    pub fn new(
        local_node_id: NodeId,
        config: KademliaConfig,
        local_has_ipv4: bool,
        socket: Arc<dyn NetworkSocket>,
        time: Arc<dyn TimeSource>,
        random: Box<dyn RandomSource + Send>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            local_node_id,
            config,
            local_has_ipv4,
            routing_table: Mutex::new(RoutingTable::new(local_node_id)),
            handlers: Mutex::new(HashMap::new()),
            pending_pings: Mutex::new(HashMap::new()),
            reputation: Mutex::new(ReputationTable::new()),
            socket,
            time,
            random: Mutex::new(random),
            metrics,
            closed: AtomicBool::new(false),
            discover_task: Mutex::new(None),
            ping_timeout_task: Mutex::new(None),
        }
    }

    fn now(&self) -> Timestamp {
        self.time.now()
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    pub fn stats(&self) -> RoutingTableStats {
        self.routing_table.lock().unwrap().stats(self.now())
    }

    pub fn closest_peers(&self, target: NodeId, count: usize) -> Vec<Node> {
        self.routing_table.lock().unwrap().closest(&target, count)
    }

    pub fn random_peers(&self, count: usize) -> Vec<Node> {
        let table = self.routing_table.lock().unwrap();
        let total = table.total_peer_count();
        if total == 0 {
            return Vec::new();
        }
        // Sample by walking the closest-to-a-random-target set, which is
        // already available without a dedicated random-walk structure.
        let mut random = self.random.lock().unwrap();
        let mut target_bytes = [0u8; NODE_ID_LEN];
        for b in target_bytes.iter_mut() {
            *b = random.next_below(256) as u8;
        }
        table.closest(&NodeId::new(target_bytes), count)
    }

    pub fn ban_peer(&self, node_id: NodeId, duration_secs: u64, reason: crate::domain::errors::BanReason) {
        let now = self.now();
        self.routing_table.lock().unwrap().ban_peer(node_id, duration_secs, reason, now);
        self.handlers.lock().unwrap().retain(|_, h| h.node_id() != Some(node_id));
    }

    pub fn is_banned(&self, node_id: NodeId) -> bool {
        self.routing_table.lock().unwrap().is_banned(&node_id, self.now())
    }

    /// A snapshot of reputation scores, for the maintenance scheduler's
    /// periodic persistence (§4.5).
    pub fn reputation_snapshot(&self) -> Vec<(NodeId, i32, u64)> {
        self.reputation.lock().unwrap().snapshot()
    }

    /// Restores reputation scores loaded from disk at startup.
    pub fn load_reputation(&self, entries: Vec<(NodeId, i32, u64)>) {
        *self.reputation.lock().unwrap() = ReputationTable::load_snapshot(entries);
    }

    /// Drops bans that have expired, so the table doesn't carry dead
    /// entries forever (§4.5 / maintenance scheduler).
    pub fn gc_expired_bans(&self) {
        self.routing_table.lock().unwrap().gc_expired_bans(self.now());
    }

    pub fn touch_peer(&self, node_id: NodeId) -> Result<(), crate::domain::errors::PeerDiscoveryError> {
        let now = self.now();
        self.routing_table.lock().unwrap().touch(&node_id, now)
    }

    pub fn remove_peer(&self, node_id: NodeId) -> Result<(), crate::domain::errors::PeerDiscoveryError> {
        self.routing_table.lock().unwrap().drop_node(&node_id)
    }

    /// `getNodeHandler`: O(1) lookup by the node's preferred address,
    /// creating a fresh handler (after trimming if at capacity) when absent.
    pub fn get_node_handler(&self, node: Node) -> Option<SocketAddr> {
        let addr = node.preferred_address(self.local_has_ipv4)?;
        let mut handlers = self.handlers.lock().unwrap();
        if !handlers.contains_key(&addr) {
            if handlers.len() >= self.config.handler_map_soft_cap {
                drop(handlers);
                self.trim_table();
                handlers = self.handlers.lock().unwrap();
            }
            handlers.insert(addr, NodeHandler::new(node));
        }
        Some(addr)
    }

    /// `trimTable`: drop non-connectible handlers first, then drop by
    /// ascending `update_time` until at or under the hard cap.
    pub fn trim_table(&self) {
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.len() <= self.config.handler_map_soft_cap {
            return;
        }
        let local_network_id = self.config.local_network_id;
        handlers.retain(|_, h| h.node.is_connectible(local_network_id));
        if handlers.len() <= self.config.handler_map_hard_cap {
            return;
        }
        let mut by_age: Vec<(SocketAddr, Timestamp)> =
            handlers.iter().map(|(addr, h)| (*addr, h.node.update_time)).collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        let overflow = handlers.len().saturating_sub(self.config.handler_map_hard_cap);
        for (addr, _) in by_age.into_iter().take(overflow) {
            handlers.remove(&addr);
        }
    }

    fn ping_handler(&self, addr: SocketAddr) {
        {
            let mut handlers = self.handlers.lock().unwrap();
            if let Some(handler) = handlers.get_mut(&addr) {
                handler.send_ping();
            } else {
                return;
            }
        }
        self.pending_pings.lock().unwrap().insert(addr, self.now());
        let _ = self.socket.send_ping(addr, self.local_node_id);
        self.metrics.incr("kademlia.ping_out", 1);
    }

    /// Offers a single already-identified node to the handler map and
    /// pings it, the same admission path a `FIND_NODE` discovery or a
    /// host-supplied peer hint goes through. Returns whether a handler
    /// address could be derived for the node at all.
    pub fn offer_peer(&self, node: Node) -> bool {
        let Some(addr) = self.get_node_handler(node) else {
            return false;
        };
        self.ping_handler(addr);
        true
    }

    /// `channelActivated`: seed handlers for every configured boot node and
    /// ping them. Boot addresses arrive without a known node id; the id is
    /// learned from the reply pong's payload (see [`Self::on_pong`]).
    pub fn channel_activated(&self, boot_addrs: Vec<SocketAddr>) {
        let now = self.now();
        for addr in boot_addrs {
            let (ipv4, ipv6) = match addr.ip {
                crate::domain::identity::IpAddr::V4(b) => (Some(b), None),
                crate::domain::identity::IpAddr::V6(b) => (None, Some(b)),
            };
            let node = Node {
                id: None,
                ipv4,
                ipv6,
                port: addr.port,
                bind_port: addr.port,
                network_id: self.config.local_network_id,
                network_version: 1,
                update_time: now,
            };
            let mut handlers = self.handlers.lock().unwrap();
            handlers.entry(addr).or_insert_with(|| NodeHandler::new(node));
            drop(handlers);
            self.ping_handler(addr);
        }
    }

    /// `connectableNodes`: handlers that have passed at least one pong
    /// round trip.
    pub fn connectable_nodes(&self) -> Vec<Node> {
        self.handlers
            .lock()
            .unwrap()
            .values()
            .filter(|h| matches!(h.state, HandlerState::Alive | HandlerState::Active))
            .map(|h| h.node.clone())
            .collect()
    }

    fn apply_ping_outcome(&self, node_id: Option<NodeId>, outcome: PingOutcome, now: Timestamp) {
        let Some(id) = node_id else { return };
        let mut reputation = self.reputation.lock().unwrap();
        match outcome {
            PingOutcome::RewardAndAdvance => {
                reputation.adjust(id, PING_REWARD, now);
            }
            PingOutcome::PenalizeAndRetry | PingOutcome::PenalizeAndFail => {
                reputation.adjust(id, -PING_PENALTY, now);
            }
        }
    }

    /// Table admission for a handler whose pong just resolved: on a clean
    /// insert, promote straight to `ACTIVE`; on a full bucket, challenge
    /// the offered eviction candidate.
    fn try_admit(&self, addr: SocketAddr, node: Node) {
        let outcome = self.routing_table.lock().unwrap().add(node.clone());
        match outcome {
            Ok(None) => {
                if let Some(handler) = self.handlers.lock().unwrap().get_mut(&addr) {
                    handler.promote();
                }
            }
            Ok(Some(candidate)) => {
                if let Some(candidate_addr) = candidate.preferred_address(self.local_has_ipv4) {
                    if let Some(candidate_handler) = self.handlers.lock().unwrap().get_mut(&candidate_addr) {
                        candidate_handler.begin_eviction_contest(node);
                    }
                    self.ping_handler(candidate_addr);
                }
            }
            Err(_) => {}
        }
    }

    /// Replace an eviction candidate's table slot with its challenger, once
    /// the incumbent has been declared dead by a failed challenge.
    fn complete_eviction(&self, incumbent_addr: SocketAddr) {
        let challenger = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(&incumbent_addr).and_then(|h| h.challenger().cloned())
        };
        let Some(challenger) = challenger else { return };
        let Some(incumbent_id) = self.handlers.lock().unwrap().get(&incumbent_addr).and_then(|h| h.node_id()) else {
            return;
        };
        let mut table = self.routing_table.lock().unwrap();
        if table.replace(&incumbent_id, challenger.clone()).is_ok() {
            drop(table);
            self.handlers.lock().unwrap().remove(&incumbent_addr);
            if let Some(new_addr) = challenger.preferred_address(self.local_has_ipv4) {
                if let Some(handler) = self.handlers.lock().unwrap().get_mut(&new_addr) {
                    handler.promote();
                }
            }
        }
    }

    fn on_ping(&self, body: &[u8], sender: SocketAddr) {
        let Some(remote_id) = parse_node_id(body) else { return };
        let now = self.now();
        let node = Node::new(remote_id, sender.ip, sender.port, self.config.local_network_id, now);
        let Some(addr) = self.get_node_handler(node) else { return };
        {
            let mut handlers = self.handlers.lock().unwrap();
            if let Some(handler) = handlers.get_mut(&addr) {
                handler.on_incoming_ping(self.config.local_network_id, self.config.local_network_id);
            }
        }
        let _ = self.socket.send_pong(sender, self.local_node_id);
        self.metrics.incr("kademlia.ping_in", 1);
    }

    fn on_pong(&self, body: &[u8], sender: SocketAddr) {
        let now = self.now();
        self.pending_pings.lock().unwrap().remove(&sender);
        let learned_id = parse_node_id(body);
        let (node_id, node_snapshot, was_evict_candidate, outcome) = {
            let mut handlers = self.handlers.lock().unwrap();
            let Some(handler) = handlers.get_mut(&sender) else { return };
            if handler.node.id.is_none() {
                handler.node.id = learned_id;
            }
            let was_evict_candidate = handler.state == HandlerState::EvictCandidate;
            let outcome = handler.on_pong(self.config.local_network_id, self.config.local_network_id);
            (handler.node_id(), handler.node.clone(), was_evict_candidate, outcome)
        };
        self.apply_ping_outcome(node_id, outcome, now);
        if outcome == PingOutcome::RewardAndAdvance && !was_evict_candidate {
            self.try_admit(sender, node_snapshot);
        }
        self.metrics.incr("kademlia.pong_in", 1);
    }

    fn on_find_node(&self, body: &[u8], sender: SocketAddr) {
        let Some(target) = parse_node_id(body) else { return };
        if !self.handlers.lock().unwrap().contains_key(&sender) {
            return;
        }
        let closest = self.routing_table.lock().unwrap().closest(&target, crate::domain::routing_table::K);
        let filtered = filter_self(closest, &self.local_node_id);
        let _ = self.socket.send_neighbors(sender, &filtered);
        self.metrics.incr("kademlia.find_node_in", 1);
    }

    fn on_neighbors(&self, body: &[u8], sender: SocketAddr) {
        let accepted = {
            let mut handlers = self.handlers.lock().unwrap();
            match handlers.get_mut(&sender) {
                Some(handler) => handler.accept_neighbors(),
                None => false,
            }
        };
        if !accepted {
            return;
        }
        let neighbors = filter_self(decode_neighbors(body), &self.local_node_id);
        for neighbor in neighbors {
            if let Some(addr) = self.get_node_handler(neighbor) {
                self.ping_handler(addr);
            }
        }
        self.metrics.incr("kademlia.neighbors_in", 1);
    }

    /// `handleEvent`: dispatch an inbound UDP packet on its first byte.
    pub fn handle_event(&self, packet: &[u8], sender: SocketAddr) {
        if self.closed.load(Ordering::SeqCst) || packet.is_empty() {
            return;
        }
        let Some(msg_type) = MessageType::from_byte(packet[0]) else {
            return;
        };
        let body = &packet[1..];
        match msg_type {
            MessageType::Ping => self.on_ping(body, sender),
            MessageType::Pong => self.on_pong(body, sender),
            MessageType::FindNode => self.on_find_node(body, sender),
            MessageType::Neighbors => self.on_neighbors(body, sender),
        }
    }

    /// Scans outstanding pings for timeouts and drives the handler state
    /// machine's retry/death/eviction-resolution path.
    pub fn tick_ping_timeouts(&self) {
        let now = self.now();
        let expired: Vec<SocketAddr> = self
            .pending_pings
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, sent_at)| now.as_secs().saturating_sub(sent_at.as_secs()) > PING_TIMEOUT_SECS)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in expired {
            self.pending_pings.lock().unwrap().remove(&addr);
            let reputation_now = {
                let handlers = self.handlers.lock().unwrap();
                let Some(handler) = handlers.get(&addr) else { continue };
                let id = handler.node_id();
                drop(handlers);
                id.map(|id| self.reputation.lock().unwrap().get(&id, now)).unwrap_or(100)
            };
            let (node_id, outcome, became_dead, was_evict_candidate) = {
                let mut handlers = self.handlers.lock().unwrap();
                let Some(handler) = handlers.get_mut(&addr) else { continue };
                let was_evict_candidate = handler.state == HandlerState::EvictCandidate;
                let outcome = handler.on_ping_timeout(reputation_now);
                (handler.node_id(), outcome, handler.is_dead(), was_evict_candidate)
            };
            self.apply_ping_outcome(node_id, outcome, now);
            if outcome == PingOutcome::PenalizeAndRetry {
                self.ping_handler(addr);
            } else if was_evict_candidate && became_dead {
                self.complete_eviction(addr);
            } else if became_dead {
                self.handlers.lock().unwrap().remove(&addr);
            }
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.discover_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.ping_timeout_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Spawns the dedicated single-threaded ping-timeout scheduler (§4.3,
    /// §5 "dedicated single-threaded scheduler"): polls for outstanding
    /// pings that have exceeded [`PING_TIMEOUT_SECS`] and drives the
    /// handler state machine's retry/death/eviction-resolution path.
    /// Cancellation short-circuits via the shared `closed` flag.
    pub fn start_ping_timeout_loop(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if service.closed.load(Ordering::SeqCst) {
                    break;
                }
                service.tick_ping_timeouts();
                tokio::time::sleep(PING_TIMEOUT_TICK).await;
            }
        });
        *self.ping_timeout_task.lock().unwrap() = Some(handle);
    }

    /// Spawns the single-threaded discover loop (§4.3): every
    /// `discover_cycle_ms`, pick a lookup target (self-lookup every
    /// `max_loop_num`-th cycle, else a random id) and run an iterative
    /// `ALPHA`-wide `FIND_NODE` search for up to `max_steps` rounds.
    pub fn start_discover_loop(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut cycle: u64 = 0;
            loop {
                if service.closed.load(Ordering::SeqCst) {
                    break;
                }
                cycle += 1;
                let target = if cycle % service.config.max_loop_num == 0 {
                    service.local_node_id
                } else {
                    let mut bytes = [0u8; NODE_ID_LEN];
                    let mut random = service.random.lock().unwrap();
                    for b in bytes.iter_mut() {
                        *b = random.next_below(256) as u8;
                    }
                    NodeId::new(bytes)
                };
                service.run_lookup(target).await;
                tokio::time::sleep(Duration::from_millis(service.config.discover_cycle_ms)).await;
            }
        });
        *self.discover_task.lock().unwrap() = Some(handle);
    }

    async fn run_lookup(&self, target: NodeId) {
        let mut tried: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
        for _ in 0..self.config.max_steps {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            let closest = self.routing_table.lock().unwrap().closest(&target, self.config.alpha * 4);
            let round: Vec<Node> = closest
                .into_iter()
                .filter(|n| n.id.is_some_and(|id| !tried.contains(&id)))
                .take(self.config.alpha)
                .collect();
            if round.is_empty() {
                return;
            }
            for node in &round {
                if let Some(id) = node.id {
                    tried.insert(id);
                }
                if let Some(addr) = node.preferred_address(self.local_has_ipv4) {
                    if let Some(handler) = self.handlers.lock().unwrap().get_mut(&addr) {
                        handler.request_neighbors();
                    }
                    let _ = self.socket.send_find_node(addr, target);
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.wait_time_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::network::{NoOpNetworkSocket, SystemTimeSource};
    use crate::adapters::security::OsRandomSource;
    use crate::adapters::TracingMetricsSink;
    use crate::domain::identity::IpAddr;

    fn service(local_id: NodeId) -> KademliaService {
        KademliaService::new(
            local_id,
            KademliaConfig::default(),
            true,
            Arc::new(NoOpNetworkSocket),
            Arc::new(SystemTimeSource::new()),
            Box::new(OsRandomSource::new()),
            Arc::new(TracingMetricsSink),
        )
    }

    fn node(b: u8) -> Node {
        Node::new(NodeId::new([b; NODE_ID_LEN]), IpAddr::v4(10, 0, 0, b), 30303, 1, Timestamp::new(0))
    }

    #[test]
    fn get_node_handler_creates_then_reuses() {
        let svc = service(NodeId::new([0u8; NODE_ID_LEN]));
        let addr1 = svc.get_node_handler(node(1)).unwrap();
        let addr2 = svc.get_node_handler(node(1)).unwrap();
        assert_eq!(addr1, addr2);
        assert_eq!(svc.handlers.lock().unwrap().len(), 1);
    }

    #[test]
    fn full_ping_pong_cycle_admits_to_routing_table() {
        let svc = service(NodeId::new([0u8; NODE_ID_LEN]));
        let addr = SocketAddr::new(IpAddr::v4(10, 0, 0, 1), 30303);
        svc.channel_activated(vec![addr]);
        let mut pong = vec![MessageType::Pong as u8];
        pong.extend_from_slice(NodeId::new([1u8; NODE_ID_LEN]).as_bytes());
        svc.handle_event(&pong, addr);
        assert_eq!(svc.stats().total_peers, 1);
        assert!(svc.connectable_nodes().iter().any(|n| n.id == Some(NodeId::new([1u8; NODE_ID_LEN]))));
    }

    #[test]
    fn ping_from_unknown_peer_registers_a_handler() {
        let svc = service(NodeId::new([0u8; NODE_ID_LEN]));
        let peer_id = NodeId::new([2u8; NODE_ID_LEN]);
        let mut packet = vec![MessageType::Ping as u8];
        packet.extend_from_slice(peer_id.as_bytes());
        svc.handle_event(&packet, SocketAddr::new(IpAddr::v4(10, 0, 0, 2), 30303));
        assert_eq!(svc.handlers.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsolicited_neighbors_are_ignored() {
        let svc = service(NodeId::new([0u8; NODE_ID_LEN]));
        let addr = SocketAddr::new(IpAddr::v4(10, 0, 0, 1), 30303);
        svc.channel_activated(vec![addr]);
        svc.handle_event(&[MessageType::Neighbors as u8], addr);
        assert_eq!(svc.stats().total_peers, 0);
    }
}
