//! Liveness probing over a tracked set of addresses, independent of the
//! Kademlia routing table.
//!
//! Reference: §4.6 (Node Detect Handler). Grounded on the upstream
//! feeler probe state machine, generalized to the tracked-map/bad-node-
//! cache shape this component actually specifies.

use std::collections::HashMap;

use crate::domain::identity::{Node, SocketAddr, Timestamp};

pub const NODE_DETECT_TIMEOUT_SECS: u64 = 2;
pub const MIN_NODES: usize = 200;
pub const MAX_NODES: usize = 300;
pub const MAX_NODE_FAST_DETECT: usize = 100;
pub const NODE_DETECT_MIN_THRESHOLD_SECS: u64 = 30;
pub const NODE_DETECT_THRESHOLD_SECS: u64 = 300;
pub const MAX_NODE_NORMAL_DETECT: usize = 10;
pub const MAX_NODE_SLOW_DETECT: usize = 3;
pub const BAD_NODE_TTL_SECS: u64 = 3_600;
pub const BAD_NODE_CACHE_CAP: usize = 5_000;

#[derive(Debug, Clone)]
pub struct NodeStats {
    pub node: Node,
    pub last_detect_time: Timestamp,
    pub last_success_detect_time: Option<Timestamp>,
    pub status_message: Option<String>,
    pub remain_connections: u32,
    probe_started_at: Option<Timestamp>,
}

impl NodeStats {
    fn new(node: Node, now: Timestamp) -> Self {
        Self {
            node,
            last_detect_time: now,
            last_success_detect_time: None,
            status_message: None,
            remain_connections: 0,
            probe_started_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BadNodeEntry {
    banned_at: Timestamp,
}

/// Tracks candidate addresses and drives the probe cadence described in
/// §4.6. The actual UDP/TCP round trip is performed by the service layer;
/// this type only decides *who* to probe and records outcomes.
#[derive(Debug, Clone, Default)]
pub struct NodeDetectTracker {
    tracked: HashMap<SocketAddr, NodeStats>,
    bad_nodes: HashMap<SocketAddr, BadNodeEntry>,
}

impl NodeDetectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn is_bad(&self, addr: &SocketAddr, now: Timestamp) -> bool {
        self.bad_nodes
            .get(addr)
            .is_some_and(|e| now.as_secs() - e.banned_at.as_secs() < BAD_NODE_TTL_SECS)
    }

    fn mark_bad(&mut self, addr: SocketAddr, now: Timestamp) {
        self.tracked.remove(&addr);
        if self.bad_nodes.len() >= BAD_NODE_CACHE_CAP {
            // drop an arbitrary entry to make room; a real LRU would evict
            // the oldest, but membership testing only needs a cap.
            if let Some(key) = self.bad_nodes.keys().next().cloned() {
                self.bad_nodes.remove(&key);
            }
        }
        self.bad_nodes.insert(addr, BadNodeEntry { banned_at: now });
    }

    /// Step 1: drop probes that started more than `NODE_DETECT_TIMEOUT`
    /// ago without completing, moving them to the bad-node cache.
    pub fn expire_stale_probes(&mut self, now: Timestamp) {
        let expired: Vec<SocketAddr> = self
            .tracked
            .iter()
            .filter(|(_, s)| {
                s.probe_started_at
                    .is_some_and(|started| now.as_secs() - started.as_secs() > NODE_DETECT_TIMEOUT_SECS)
            })
            .map(|(addr, _)| *addr)
            .collect();
        for addr in expired {
            self.mark_bad(addr, now);
        }
    }

    /// Step 2: refill from `candidates` (e.g. Kademlia's connectable
    /// nodes) up to `MAX_NODE_FAST_DETECT` new entries this cycle,
    /// respecting `MAX_NODES` and skipping tracked/bad-node addresses.
    pub fn refill(&mut self, candidates: Vec<Node>, now: Timestamp) -> usize {
        if self.tracked.len() >= MIN_NODES {
            return 0;
        }
        let mut added = 0;
        for node in candidates {
            if added >= MAX_NODE_FAST_DETECT || self.tracked.len() >= MAX_NODES {
                break;
            }
            let Some(addr) = node.preferred_address(true) else {
                continue;
            };
            if self.tracked.contains_key(&addr) || self.is_bad(&addr, now) {
                continue;
            }
            self.tracked.insert(addr, NodeStats::new(node, now));
            added += 1;
        }
        added
    }

    /// Steps 3-4: choose which addresses to probe this cycle.
    pub fn select_probe_targets(&self, now: Timestamp) -> Vec<SocketAddr> {
        let mut by_staleness: Vec<&SocketAddr> = self.tracked.keys().collect();
        by_staleness.sort_by_key(|addr| self.tracked[addr].last_detect_time);

        let Some(stalest_addr) = by_staleness.first() else {
            return Vec::new();
        };
        let stalest_age = now.as_secs() - self.tracked[*stalest_addr].last_detect_time.as_secs();

        if stalest_age < NODE_DETECT_MIN_THRESHOLD_SECS {
            return Vec::new();
        }
        let limit = if stalest_age < NODE_DETECT_THRESHOLD_SECS {
            MAX_NODE_NORMAL_DETECT
        } else {
            MAX_NODE_SLOW_DETECT
        };
        by_staleness.into_iter().take(limit).copied().collect()
    }

    pub fn begin_probe(&mut self, addr: &SocketAddr, now: Timestamp) {
        if let Some(stats) = self.tracked.get_mut(addr) {
            stats.probe_started_at = Some(now);
            stats.last_detect_time = now;
        }
    }

    /// Record a probe response. If `remain_connections == 0` or the round
    /// trip exceeded the timeout, the entry is demoted to the bad-node
    /// cache instead of being kept.
    pub fn record_response(
        &mut self,
        addr: SocketAddr,
        remain_connections: u32,
        round_trip_secs: u64,
        now: Timestamp,
    ) {
        if remain_connections == 0 || round_trip_secs > NODE_DETECT_TIMEOUT_SECS {
            self.mark_bad(addr, now);
            return;
        }
        if let Some(stats) = self.tracked.get_mut(&addr) {
            stats.probe_started_at = None;
            stats.last_success_detect_time = Some(now);
            stats.remain_connections = remain_connections;
            stats.status_message = Some(format!("remain={remain_connections}"));
        }
    }

    /// Tracked nodes with a status message, sorted by descending
    /// `remain_connections`.
    pub fn connectable_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<&NodeStats> = self
            .tracked
            .values()
            .filter(|s| s.status_message.is_some())
            .collect();
        nodes.sort_by(|a, b| b.remain_connections.cmp(&a.remain_connections));
        nodes.into_iter().map(|s| s.node.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{IpAddr, NodeId};

    fn node(b: u8) -> Node {
        Node::new(
            NodeId::new([b; crate::domain::identity::NODE_ID_LEN]),
            IpAddr::v4(10, 0, 0, b),
            30303,
            1,
            Timestamp::new(0),
        )
    }

    #[test]
    fn refill_stops_below_min_nodes_needed() {
        let mut tracker = NodeDetectTracker::new();
        let candidates = vec![node(1), node(2)];
        let added = tracker.refill(candidates, Timestamp::new(0));
        assert_eq!(added, 2);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn refill_skips_bad_nodes() {
        let mut tracker = NodeDetectTracker::new();
        let addr = node(1).preferred_address(true).unwrap();
        tracker.mark_bad(addr, Timestamp::new(0));
        let added = tracker.refill(vec![node(1)], Timestamp::new(1));
        assert_eq!(added, 0);
    }

    #[test]
    fn stale_probe_moves_to_bad_cache() {
        let mut tracker = NodeDetectTracker::new();
        tracker.refill(vec![node(1)], Timestamp::new(0));
        let addr = node(1).preferred_address(true).unwrap();
        tracker.begin_probe(&addr, Timestamp::new(0));
        tracker.expire_stale_probes(Timestamp::new(10));
        assert_eq!(tracker.len(), 0);
        assert!(tracker.is_bad(&addr, Timestamp::new(10)));
    }

    #[test]
    fn fresh_tracked_nodes_are_skipped_below_min_threshold() {
        let mut tracker = NodeDetectTracker::new();
        tracker.refill(vec![node(1)], Timestamp::new(100));
        let targets = tracker.select_probe_targets(Timestamp::new(110));
        assert!(targets.is_empty());
    }

    #[test]
    fn response_with_zero_remaining_demotes_to_bad() {
        let mut tracker = NodeDetectTracker::new();
        tracker.refill(vec![node(1)], Timestamp::new(0));
        let addr = node(1).preferred_address(true).unwrap();
        tracker.record_response(addr, 0, 1, Timestamp::new(1));
        assert_eq!(tracker.len(), 0);
        assert!(tracker.is_bad(&addr, Timestamp::new(1)));
    }

    #[test]
    fn connectable_nodes_sorted_descending_by_remaining() {
        let mut tracker = NodeDetectTracker::new();
        tracker.refill(vec![node(1), node(2)], Timestamp::new(0));
        let a1 = node(1).preferred_address(true).unwrap();
        let a2 = node(2).preferred_address(true).unwrap();
        tracker.record_response(a1, 3, 1, Timestamp::new(1));
        tracker.record_response(a2, 9, 1, Timestamp::new(1));
        let nodes = tracker.connectable_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, node(2).id);
    }
}
