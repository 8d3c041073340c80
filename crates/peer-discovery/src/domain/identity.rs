//! Node identity, addressing, and XOR distance.
//!
//! Reference: component A (Node Identity & Addressing) and component B's
//! distance metric.

use std::hash::Hash;

/// Length in bytes of the canonical node identifier.
///
/// The source material in this lineage carries two coexisting id widths: a
/// 20-byte identity used throughout the routing table and a 64-byte random
/// value used as a lookup target in some call sites. We standardize on the
/// 20-byte form everywhere (including lookup targets) and keep the distance
/// function generic over slice length so a mismatched width degrades
/// gracefully instead of panicking.
pub const NODE_ID_LEN: usize = 20;

/// Canonical node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    pub fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    pub fn zero() -> Self {
        Self([0u8; NODE_ID_LEN])
    }

    /// Derive a NodeId from an arbitrary-length digest by taking its
    /// trailing `NODE_ID_LEN` bytes (or zero-padding on the left if shorter).
    ///
    /// Used to normalize lookup targets and hashed public keys to the
    /// canonical width.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut out = [0u8; NODE_ID_LEN];
        if digest.len() >= NODE_ID_LEN {
            let start = digest.len() - NODE_ID_LEN;
            out.copy_from_slice(&digest[start..]);
        } else {
            out[NODE_ID_LEN - digest.len()..].copy_from_slice(digest);
        }
        Self(out)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// IP address, dual-stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddr {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl IpAddr {
    pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        IpAddr::V4([a, b, c, d])
    }

    pub fn v6(bytes: [u8; 16]) -> Self {
        IpAddr::V6(bytes)
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, IpAddr::V4(_))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, IpAddr::V6(_))
    }
}

impl From<std::net::IpAddr> for IpAddr {
    fn from(ip: std::net::IpAddr) -> Self {
        match ip {
            std::net::IpAddr::V4(v4) => IpAddr::V4(v4.octets()),
            std::net::IpAddr::V6(v6) => IpAddr::V6(v6.octets()),
        }
    }
}

/// Socket address (IP + Port), an abstraction over `std::net::SocketAddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl SocketAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl From<std::net::SocketAddr> for SocketAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self {
            ip: addr.ip().into(),
            port: addr.port(),
        }
    }
}

impl From<SocketAddr> for std::net::SocketAddr {
    fn from(addr: SocketAddr) -> Self {
        let ip = match addr.ip {
            IpAddr::V4(bytes) => std::net::IpAddr::V4(std::net::Ipv4Addr::from(bytes)),
            IpAddr::V6(bytes) => std::net::IpAddr::V6(std::net::Ipv6Addr::from(bytes)),
        };
        std::net::SocketAddr::new(ip, addr.port)
    }
}

/// Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.saturating_mul(1000)
    }

    pub fn add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Whole days elapsed between `self` and a later instant `now`.
    pub fn whole_days_until(&self, now: Timestamp) -> u64 {
        now.as_secs().saturating_sub(self.as_secs()) / 86_400
    }
}

/// A fully described remote node, per component A.
///
/// Two nodes are considered equal by identity if their [`NodeId`]s match;
/// when an id is absent on either side, equality falls back to the
/// preferred-address/port pair. See the hand-written [`PartialEq`] impl
/// below — deriving it would compare every field (including `update_time`),
/// making two records for the same peer compare unequal the moment either
/// is touched.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<NodeId>,
    pub ipv4: Option<[u8; 4]>,
    pub ipv6: Option<[u8; 16]>,
    pub port: u16,
    pub bind_port: u16,
    pub network_id: u64,
    pub network_version: u32,
    pub update_time: Timestamp,
}

impl Node {
    pub fn new(id: NodeId, ip: IpAddr, port: u16, network_id: u64, update_time: Timestamp) -> Self {
        let (ipv4, ipv6) = match ip {
            IpAddr::V4(b) => (Some(b), None),
            IpAddr::V6(b) => (None, Some(b)),
        };
        Self {
            id: Some(id),
            ipv4,
            ipv6,
            port,
            bind_port: port,
            network_id,
            network_version: 1,
            update_time,
        }
    }

    /// A node is connectible iff its advertised port matches the port it
    /// actually bound, and its network id matches ours.
    pub fn is_connectible(&self, local_network_id: u64) -> bool {
        self.port == self.bind_port && self.network_id == local_network_id
    }

    /// Preferred address, given whether the local node advertises IPv4.
    ///
    /// Prefers IPv4 when the local node also has IPv4, else IPv6, else
    /// whichever is present.
    pub fn preferred_address(&self, local_has_ipv4: bool) -> Option<SocketAddr> {
        match (local_has_ipv4, self.ipv4, self.ipv6) {
            (true, Some(v4), _) => Some(SocketAddr::new(IpAddr::V4(v4), self.port)),
            (true, None, Some(v6)) => Some(SocketAddr::new(IpAddr::V6(v6), self.port)),
            (false, _, Some(v6)) => Some(SocketAddr::new(IpAddr::V6(v6), self.port)),
            (false, Some(v4), None) => Some(SocketAddr::new(IpAddr::V4(v4), self.port)),
            _ => None,
        }
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.update_time = now;
    }

    /// Canonical address used as the identity fallback when one side lacks
    /// a [`NodeId`]: IPv4 if present, else IPv6. Unlike
    /// [`Self::preferred_address`] this doesn't need a local-stack hint,
    /// since it's only used to compare two remote records against each
    /// other, not to pick a socket to dial.
    fn fallback_address(&self) -> Option<SocketAddr> {
        match (self.ipv4, self.ipv6) {
            (Some(v4), _) => Some(SocketAddr::new(IpAddr::V4(v4), self.port)),
            (None, Some(v6)) => Some(SocketAddr::new(IpAddr::V6(v6), self.port)),
            (None, None) => None,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.fallback_address() == other.fallback_address(),
        }
    }
}

impl Eq for Node {}

/// XOR distance between two node ids, expressed as the index of the
/// highest differing bit (MSB-first, 0-indexed). Equal ids yield `None`.
///
/// Reference: component B, `max(0, leadingDistance - 1)` bucket formula.
pub fn xor_distance_bit(a: &NodeId, b: &NodeId) -> Option<u32> {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    for i in 0..NODE_ID_LEN {
        let xor = a_bytes[i] ^ b_bytes[i];
        if xor != 0 {
            let leading_zeros = xor.leading_zeros();
            return Some((i as u32) * 8 + leading_zeros);
        }
    }
    None
}

/// Bucket index per the spec's formula: `max(0, leadingDistance - 1)`, where
/// `leadingDistance` is 1-indexed from the MSB. Identical ids map to bucket 0.
pub fn calculate_bucket_index(local: &NodeId, remote: &NodeId) -> usize {
    match xor_distance_bit(local, remote) {
        Some(bit) => {
            let leading_distance = bit + 1;
            (leading_distance.saturating_sub(1)) as usize
        }
        None => 0,
    }
}

/// Total ordering distance value used for sorting closest-first; larger
/// bit index (more leading bits shared) means closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub u32);

pub fn xor_distance(a: &NodeId, b: &NodeId) -> Distance {
    match xor_distance_bit(a, b) {
        Some(bit) => Distance(bit),
        None => Distance((NODE_ID_LEN as u32) * 8),
    }
}
