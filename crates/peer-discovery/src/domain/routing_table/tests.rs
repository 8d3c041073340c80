use super::*;
use crate::domain::errors::BanReason;
use crate::domain::identity::{IpAddr, Node, NodeId, Timestamp};

fn node(id_byte: u8, network_id: u64, now: u64) -> Node {
    Node::new(
        NodeId::new([id_byte; crate::domain::identity::NODE_ID_LEN]),
        IpAddr::v4(10, 0, 0, id_byte),
        30303,
        network_id,
        Timestamp::new(now),
    )
}

#[test]
fn add_and_contains() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    let n = node(1, 1, 0);
    let id = n.id.unwrap();
    assert_eq!(table.add(n).unwrap(), None);
    assert!(table.contains(&id));
    assert_eq!(table.total_peer_count(), 1);
}

#[test]
fn rejects_self() {
    let local = NodeId::new([9u8; crate::domain::identity::NODE_ID_LEN]);
    let mut table = RoutingTable::new(local);
    let mut n = node(9, 1, 0);
    n.id = Some(local);
    assert_eq!(table.add(n), Err(crate::domain::errors::PeerDiscoveryError::SelfConnection));
}

#[test]
fn full_bucket_yields_eviction_candidate_without_mutating() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    // All of these ids collide in bucket 0 (same leading-bit distance class
    // as `local` once xor'd) because they all share the id byte pattern
    // that forces a first-bit difference from zero.
    let mut base = [0u8; crate::domain::identity::NODE_ID_LEN];
    base[0] = 0b1000_0000;
    for i in 0..super::K {
        let mut bytes = base;
        bytes[crate::domain::identity::NODE_ID_LEN - 1] = i as u8;
        let n = Node::new(NodeId::new(bytes), IpAddr::v4(10, 0, 0, i as u8), 30303, 1, Timestamp::new(i as u64));
        assert_eq!(table.add(n).unwrap(), None);
    }
    assert_eq!(table.total_peer_count(), super::K);

    let mut overflow_bytes = base;
    overflow_bytes[crate::domain::identity::NODE_ID_LEN - 1] = 99;
    let overflow = Node::new(NodeId::new(overflow_bytes), IpAddr::v4(10, 0, 0, 99), 30303, 1, Timestamp::new(100));
    let candidate = table.add(overflow).unwrap();
    assert!(candidate.is_some());
    // bucket unchanged: still K, candidate not yet evicted
    assert_eq!(table.total_peer_count(), super::K);
}

#[test]
fn closest_orders_by_xor_distance() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    for i in 1..=5u8 {
        table.add(node(i, 1, i as u64)).unwrap();
    }
    let target = NodeId::zero();
    let closest = table.closest(&target, 3);
    assert_eq!(closest.len(), 3);
}

#[test]
fn ban_then_drop_then_unbanned_after_expiry() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    let n = node(1, 1, 0);
    let id = n.id.unwrap();
    table.add(n).unwrap();
    assert!(table.contains(&id));

    table.ban_peer(id, 10, BanReason::ManualBan, Timestamp::new(0));
    assert!(!table.contains(&id));
    assert!(table.is_banned(&id, Timestamp::new(5)));
    assert!(!table.is_banned(&id, Timestamp::new(11)));
}

#[test]
fn touch_moves_to_most_recently_seen() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    let n = node(1, 1, 0);
    let id = n.id.unwrap();
    table.add(n).unwrap();
    table.touch(&id, Timestamp::new(42)).unwrap();
    let bucket_idx = crate::domain::identity::calculate_bucket_index(&local, &id);
    let bucket = table.get_bucket(bucket_idx).unwrap();
    assert_eq!(bucket.entries().last().unwrap().update_time, Timestamp::new(42));
}

#[test]
fn trim_drops_network_mismatched_nodes() {
    let local = NodeId::zero();
    let mut table = RoutingTable::new(local);
    let mismatched = node(1, 999, 0);
    let id = mismatched.id.unwrap();
    table.add(mismatched).unwrap();
    table.trim(1, 0, usize::MAX);
    assert!(!table.contains(&id));
}
