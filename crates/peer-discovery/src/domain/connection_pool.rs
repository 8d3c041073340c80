//! Candidate selection for the outbound connection pool.
//!
//! Reference: §4.7 (Connection Pool Controller). Grounded on the upstream
//! connection-slot manager's eviction-by-score and subnet-diversity
//! checks, generalized to the lack/validNode/ranking pipeline this
//! component specifies.

use std::collections::HashSet;

use crate::domain::identity::{IpAddr, Node, NodeId, SocketAddr, Timestamp};

pub const DISCONNECT_RANDOM_CAP_SECS: u64 = 30;
pub const PEER_CLIENT_CACHE_TTL_SECS: u64 = 120;

#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub min_connections: usize,
    pub min_active_connections: usize,
    pub max_connections: usize,
    pub max_connections_with_same_ip: usize,
}

/// Snapshot of pool state the controller needs to plan a cycle, supplied
/// by the service layer (which owns the actual channel map).
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pub connecting_count: usize,
    pub passive_count: usize,
    pub nodes_in_use: HashSet<NodeId>,
    pub addresses_in_use: HashSet<IpAddr>,
    pub inet_in_use: HashSet<SocketAddr>,
    pub banned_addresses: HashSet<IpAddr>,
    pub recently_attempted: HashSet<SocketAddr>,
    pub ip_connection_counts: std::collections::HashMap<IpAddr, usize>,
}

/// How many additional outbound dials are needed this cycle.
pub fn compute_lack(limits: &PoolLimits, connected_total: usize, snapshot: &PoolSnapshot) -> usize {
    let min_term = limits
        .min_connections
        .saturating_sub(snapshot.connecting_count + snapshot.passive_count);
    let active_term = limits
        .min_active_connections
        .saturating_sub(snapshot.connecting_count);
    let lack = min_term.max(active_term);
    if connected_total >= limits.min_connections && active_term == 0 {
        0
    } else {
        lack
    }
}

/// Whether `node` may be dialed this cycle.
pub fn valid_node(node: &Node, limits: &PoolLimits, snapshot: &PoolSnapshot, local_has_ipv4: bool) -> bool {
    let Some(addr) = node.preferred_address(local_has_ipv4) else {
        return false;
    };
    if snapshot.banned_addresses.contains(&addr.ip) {
        return false;
    }
    if snapshot
        .ip_connection_counts
        .get(&addr.ip)
        .is_some_and(|count| *count >= limits.max_connections_with_same_ip)
    {
        return false;
    }
    if let Some(id) = node.id {
        if snapshot.nodes_in_use.contains(&id) {
            return false;
        }
    }
    if snapshot.recently_attempted.contains(&addr) {
        return false;
    }
    if snapshot.inet_in_use.contains(&addr) {
        return false;
    }
    true
}

/// Select dial targets for this cycle: configured active nodes first
/// (unconditionally), then fill `lack` slots from the candidate sources
/// in priority order (node-detect, kademlia, dns), ranking kademlia
/// candidates by descending `update_time`.
pub fn select_dial_targets(
    configured_active: Vec<Node>,
    node_detect_candidates: Vec<Node>,
    kademlia_candidates: Vec<Node>,
    dns_candidates: Vec<Node>,
    limits: &PoolLimits,
    snapshot: &PoolSnapshot,
    local_has_ipv4: bool,
) -> Vec<Node> {
    let mut chosen = Vec::new();
    let mut picked_addrs: HashSet<SocketAddr> = HashSet::new();

    for node in configured_active {
        if let Some(addr) = node.preferred_address(local_has_ipv4) {
            if picked_addrs.insert(addr) {
                chosen.push(node);
            }
        }
    }

    let lack = compute_lack(limits, snapshot.connecting_count + snapshot.passive_count, snapshot);
    if lack == 0 {
        return chosen;
    }

    let mut kademlia_ranked = kademlia_candidates;
    kademlia_ranked.sort_by(|a, b| b.update_time.cmp(&a.update_time));

    let mut remaining = lack;
    for pool in [node_detect_candidates, kademlia_ranked, dns_candidates] {
        for node in pool {
            if remaining == 0 {
                break;
            }
            if !valid_node(&node, limits, snapshot, local_has_ipv4) {
                continue;
            }
            let Some(addr) = node.preferred_address(local_has_ipv4) else {
                continue;
            };
            if !picked_addrs.insert(addr) {
                continue;
            }
            chosen.push(node);
            remaining -= 1;
        }
    }
    chosen
}

/// Same /prefix-length subnet check used to enforce IP diversity when
/// ranking or rejecting dial candidates.
pub fn is_same_subnet(a: &IpAddr, b: &IpAddr, prefix_bits: u8) -> bool {
    match (a, b) {
        (IpAddr::V4(a_bytes), IpAddr::V4(b_bytes)) => prefix_matches(a_bytes, b_bytes, prefix_bits, 4),
        (IpAddr::V6(a_bytes), IpAddr::V6(b_bytes)) => prefix_matches(a_bytes, b_bytes, prefix_bits, 16),
        _ => false,
    }
}

fn prefix_matches(a: &[u8], b: &[u8], prefix_bits: u8, max_bytes: usize) -> bool {
    let prefix_bytes = (prefix_bits / 8) as usize;
    let remaining_bits = prefix_bits % 8;
    for i in 0..prefix_bytes.min(max_bytes) {
        if a[i] != b[i] {
            return false;
        }
    }
    if remaining_bits > 0 && prefix_bytes < max_bytes {
        let mask_byte = 0xFFu8 << (8 - remaining_bits);
        return (a[prefix_bytes] & mask_byte) == (b[prefix_bytes] & mask_byte);
    }
    true
}

/// Whether `now` is beyond the "recently attempted" window for `stamped_at`.
pub fn attempt_expired(stamped_at: Timestamp, now: Timestamp) -> bool {
    now.as_secs().saturating_sub(stamped_at.as_secs()) >= PEER_CLIENT_CACHE_TTL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::NODE_ID_LEN;

    fn node(b: u8) -> Node {
        Node::new(NodeId::new([b; NODE_ID_LEN]), IpAddr::v4(10, 0, 0, b), 30303, 1, Timestamp::new(b as u64))
    }

    fn limits() -> PoolLimits {
        PoolLimits {
            min_connections: 8,
            min_active_connections: 4,
            max_connections: 50,
            max_connections_with_same_ip: 2,
        }
    }

    #[test]
    fn lack_zero_when_targets_met() {
        let snapshot = PoolSnapshot {
            connecting_count: 8,
            passive_count: 0,
            ..Default::default()
        };
        assert_eq!(compute_lack(&limits(), 8, &snapshot), 0);
    }

    #[test]
    fn lack_positive_when_below_min_connections() {
        let snapshot = PoolSnapshot::default();
        assert_eq!(compute_lack(&limits(), 0, &snapshot), 8);
    }

    #[test]
    fn valid_node_rejects_banned_ip() {
        let mut snapshot = PoolSnapshot::default();
        snapshot.banned_addresses.insert(IpAddr::v4(10, 0, 0, 1));
        assert!(!valid_node(&node(1), &limits(), &snapshot, true));
    }

    #[test]
    fn valid_node_rejects_in_use_node_id() {
        let mut snapshot = PoolSnapshot::default();
        snapshot.nodes_in_use.insert(node(1).id.unwrap());
        assert!(!valid_node(&node(1), &limits(), &snapshot, true));
    }

    #[test]
    fn select_dial_targets_prioritizes_configured_active() {
        let limits = limits();
        let snapshot = PoolSnapshot::default();
        let chosen = select_dial_targets(
            vec![node(1)],
            vec![],
            vec![node(2), node(3)],
            vec![],
            &limits,
            &snapshot,
            true,
        );
        assert_eq!(chosen[0].id, node(1).id);
        assert!(chosen.len() > 1);
    }

    #[test]
    fn subnet_check_respects_prefix() {
        let a = IpAddr::v4(10, 0, 0, 1);
        let b = IpAddr::v4(10, 0, 0, 200);
        assert!(is_same_subnet(&a, &b, 24));
        let c = IpAddr::v4(10, 0, 1, 1);
        assert!(!is_same_subnet(&a, &c, 24));
    }
}
