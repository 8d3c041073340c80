//! Domain error taxonomy.
//!
//! Reference: component design §7 (Error Handling Design).

use std::fmt;

/// Errors raised by routing-table and node-handler operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerDiscoveryError {
    PeerNotFound,
    PeerBanned,
    BucketFull,
    InvalidNodeId,
    SelfConnection,
    RoutingTableFull,
}

impl fmt::Display for PeerDiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerNotFound => write!(f, "peer not found in routing table"),
            Self::PeerBanned => write!(f, "peer is currently banned"),
            Self::BucketFull => write!(f, "k-bucket is at capacity"),
            Self::InvalidNodeId => write!(f, "invalid node identifier"),
            Self::SelfConnection => write!(f, "cannot add local node to routing table"),
            Self::RoutingTableFull => write!(f, "routing table at maximum capacity"),
        }
    }
}

impl std::error::Error for PeerDiscoveryError {}

/// Reasons for banning a peer's IP from the connection pool / routing table.
///
/// `InvalidSignature` is intentionally excluded. UDP source addresses are
/// trivially spoofable; banning on a bad signature would let an attacker
/// frame a victim IP by spoofing its address and sending a malformed
/// message. Failed signature checks are silently dropped instead (see
/// [`DnsTreeError::SignatureInvalid`] and the node-handler's
/// revival-not-ban policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanReason {
    MalformedMessage,
    NetworkMismatch,
    ExcessiveRequests,
    ManualBan,
}

impl fmt::Display for BanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage => write!(f, "malformed message"),
            Self::NetworkMismatch => write!(f, "network id mismatch"),
            Self::ExcessiveRequests => write!(f, "excessive requests"),
            Self::ManualBan => write!(f, "manual ban"),
        }
    }
}

/// Reasons a peer was disconnected by the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Timeout,
    ExplicitRemoval,
    BucketReplacement,
    NetworkError,
    RandomElimination,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ExplicitRemoval => write!(f, "explicit removal"),
            Self::BucketReplacement => write!(f, "bucket replacement"),
            Self::NetworkError => write!(f, "network error"),
            Self::RandomElimination => write!(f, "random elimination"),
        }
    }
}

/// Errors produced while resolving and validating the DNS tree.
///
/// Reference: §7, "SignatureInvalid / HashMismatch / InvalidChild".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsTreeError {
    DnsLookupFailed,
    InvalidRoot,
    SignatureInvalid,
    HashMismatch,
    InvalidChild,
    NodesInLinkTree,
    LinkInNodesTree,
    CacheMiss,
}

impl fmt::Display for DnsTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsLookupFailed => write!(f, "dns TXT lookup failed or returned empty"),
            Self::InvalidRoot => write!(f, "root entry failed structural validation"),
            Self::SignatureInvalid => write!(f, "root signature verification failed"),
            Self::HashMismatch => write!(f, "fetched entry hash does not match requested hash"),
            Self::InvalidChild => write!(f, "child hash failed structural validation"),
            Self::NodesInLinkTree => write!(f, "nodes entry encountered inside a link subtree"),
            Self::LinkInNodesTree => write!(f, "link entry encountered inside a nodes subtree"),
            Self::CacheMiss => write!(f, "entry not present in cache"),
        }
    }
}

impl std::error::Error for DnsTreeError {}

/// Errors from the reputation store's persistence layer.
///
/// Per §7: persistence failures are logged; in-memory state remains
/// authoritative and existing on-disk files are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    Io(String),
    Corrupt(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "persistence i/o error: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt reputation snapshot: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Health warnings surfaced about the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningType {
    TooFewPeers,
    NoRecentActivity,
    HighChurnRate,
}

impl fmt::Display for WarningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewPeers => write!(f, "too few peers"),
            Self::NoRecentActivity => write!(f, "no recent activity"),
            Self::HighChurnRate => write!(f, "high churn rate"),
        }
    }
}
