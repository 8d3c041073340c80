//! The Kademlia routing table.
//!
//! Reference: §4.1 (Routing Table & K-Buckets contract).

use crate::domain::errors::{BanReason, PeerDiscoveryError};
use crate::domain::identity::{calculate_bucket_index, xor_distance, Node, NodeId, Timestamp};

use super::banned::BannedPeers;
use super::bucket::NodeBucket;
use super::config::NUM_BUCKETS;

#[derive(Debug, Clone, Default)]
pub struct RoutingTableStats {
    pub total_peers: usize,
    pub buckets_used: usize,
    pub banned_count: usize,
}

/// 256 k-buckets plus a fast membership index, excluding the local node.
#[derive(Debug)]
pub struct RoutingTable {
    local_node_id: NodeId,
    buckets: Vec<NodeBucket>,
    banned_peers: BannedPeers,
}

impl RoutingTable {
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            buckets: (0..NUM_BUCKETS).map(|_| NodeBucket::new()).collect(),
            banned_peers: BannedPeers::new(),
        }
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    pub fn total_peer_count(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn stats(&self, now: Timestamp) -> RoutingTableStats {
        RoutingTableStats {
            total_peers: self.total_peer_count(),
            buckets_used: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            banned_count: self.banned_peers.count(now),
        }
    }

    fn bucket_index(&self, id: &NodeId) -> usize {
        calculate_bucket_index(&self.local_node_id, id)
    }

    /// Add `node` to its bucket.
    ///
    /// Returns `Ok(None)` on a clean insert, `Ok(Some(candidate))` when the
    /// target bucket is full and `candidate` (the least-recently-touched
    /// entry) is offered up for an eviction challenge, and `Err` if the
    /// node cannot be added at all (self, or missing id).
    pub fn add(&mut self, node: Node) -> Result<Option<Node>, PeerDiscoveryError> {
        let id = node.id.ok_or(PeerDiscoveryError::InvalidNodeId)?;
        if id == self.local_node_id {
            return Err(PeerDiscoveryError::SelfConnection);
        }
        let idx = self.bucket_index(&id);
        let bucket = self
            .buckets
            .get_mut(idx)
            .ok_or(PeerDiscoveryError::InvalidNodeId)?;
        Ok(bucket.add_node(node))
    }

    /// Replace an eviction candidate with the challenger that defeated it.
    pub fn replace(&mut self, victim: &NodeId, replacement: Node) -> Result<(), PeerDiscoveryError> {
        let idx = self.bucket_index(victim);
        let bucket = self
            .buckets
            .get_mut(idx)
            .ok_or(PeerDiscoveryError::InvalidNodeId)?;
        bucket.replace(victim, replacement);
        Ok(())
    }

    pub fn drop_node(&mut self, id: &NodeId) -> Result<(), PeerDiscoveryError> {
        let idx = self.bucket_index(id);
        let bucket = self
            .buckets
            .get_mut(idx)
            .ok_or(PeerDiscoveryError::InvalidNodeId)?;
        bucket.remove(id).map(|_| ()).ok_or(PeerDiscoveryError::PeerNotFound)
    }

    pub fn touch(&mut self, id: &NodeId, now: Timestamp) -> Result<(), PeerDiscoveryError> {
        let idx = self.bucket_index(id);
        let bucket = self
            .buckets
            .get_mut(idx)
            .ok_or(PeerDiscoveryError::InvalidNodeId)?;
        if bucket.touch(id, now) {
            Ok(())
        } else {
            Err(PeerDiscoveryError::PeerNotFound)
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        let idx = self.bucket_index(id);
        self.buckets
            .get(idx)
            .is_some_and(|b| b.contains(id))
    }

    /// Closest known nodes to `target`, capped at `count`. For the returned
    /// set `S`, every node not in `S` has XOR-distance at least the
    /// maximum distance within `S` (modulo the `count` truncation).
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Node> {
        let mut all: Vec<_> = self
            .buckets
            .iter()
            .flat_map(|b| b.entries().iter())
            .filter_map(|n| n.id.map(|id| (xor_distance(&id, target), n)))
            .collect();
        all.sort_by(|a, b| b.0.cmp(&a.0));
        all.into_iter().take(count).map(|(_, n)| n.clone()).collect()
    }

    pub fn get_bucket(&self, index: usize) -> Option<&NodeBucket> {
        self.buckets.get(index)
    }

    /// `duration_secs == 0` means permanent, per the driving API's contract.
    pub fn ban_peer(&mut self, node_id: NodeId, duration_secs: u64, reason: BanReason, now: Timestamp) {
        let _ = self.drop_node(&node_id);
        let until = if duration_secs == 0 { Timestamp::new(u64::MAX) } else { now.add_secs(duration_secs) };
        self.banned_peers.ban(node_id, until, reason);
    }

    pub fn is_banned(&self, node_id: &NodeId, now: Timestamp) -> bool {
        self.banned_peers.is_banned(node_id, now)
    }

    pub fn gc_expired_bans(&mut self, now: Timestamp) -> usize {
        self.banned_peers.gc_expired(now)
    }

    /// Drop handlers not connectible under `local_network_id`; if the
    /// table is still above `soft_cap`, drop by ascending `update_time`
    /// until at or under `hard_cap`. Mirrors the Kademlia service's
    /// `trimTable` policy (§4.3), applied here at the table level since
    /// buckets are the home of node records.
    pub fn trim(&mut self, local_network_id: u64, soft_cap: usize, hard_cap: usize) {
        if self.total_peer_count() <= soft_cap {
            return;
        }
        for bucket in &mut self.buckets {
            let stale: Vec<NodeId> = bucket
                .entries()
                .iter()
                .filter(|n| !n.is_connectible(local_network_id))
                .filter_map(|n| n.id)
                .collect();
            for id in stale {
                bucket.remove(&id);
            }
        }
        if self.total_peer_count() <= hard_cap {
            return;
        }
        let mut all: Vec<(Timestamp, NodeId)> = self
            .buckets
            .iter()
            .flat_map(|b| b.entries().iter())
            .filter_map(|n| n.id.map(|id| (n.update_time, id)))
            .collect();
        all.sort_by_key(|(ts, _)| *ts);
        let overflow = self.total_peer_count().saturating_sub(hard_cap);
        for (_, id) in all.into_iter().take(overflow) {
            let _ = self.drop_node(&id);
        }
    }
}
