//! Driving port: the public API this crate exposes to the host node.

use crate::domain::errors::{BanReason, PeerDiscoveryError};
use crate::domain::identity::{Node, NodeId};
use crate::domain::routing_table::RoutingTableStats;

/// Primary API surface for interacting with peer discovery.
pub trait PeerDiscoveryApi {
    /// The `count` known peers closest to `target_id` by XOR distance.
    fn find_closest_peers(&self, target_id: NodeId, count: usize) -> Vec<Node>;

    /// Offer a newly observed node to the routing table (via the node
    /// handler state machine, not a direct table insert).
    fn add_peer(&mut self, node: Node) -> Result<bool, PeerDiscoveryError>;

    /// Randomly selected peers, for gossip/broadcast callers.
    fn get_random_peers(&self, count: usize) -> Vec<Node>;

    /// Ban a peer for `duration_seconds` (0 = permanent).
    ///
    /// `BanReason::InvalidSignature` does not exist: UDP source addresses
    /// are spoofable, so signature failures are dropped silently instead
    /// of banned (see [`crate::domain::errors::DnsTreeError::SignatureInvalid`]).
    fn ban_peer(&mut self, node_id: NodeId, duration_seconds: u64, reason: BanReason) -> Result<(), PeerDiscoveryError>;

    fn is_banned(&self, node_id: NodeId) -> bool;

    /// Keep-alive: move a peer to the most-recently-seen position.
    fn touch_peer(&mut self, node_id: NodeId) -> Result<(), PeerDiscoveryError>;

    fn remove_peer(&mut self, node_id: NodeId) -> Result<(), PeerDiscoveryError>;

    fn get_stats(&self) -> RoutingTableStats;
}
