//! Driven ports (SPI): everything this crate requires the host
//! application to supply — network I/O, time, randomness, crypto,
//! configuration, and metrics.

use crate::domain::identity::{NodeId, SocketAddr, Timestamp};

/// Abstract interface for UDP network I/O (component C/§4.3 wire traffic).
///
/// Implementations must be `Send + Sync` for use from concurrent handler
/// and discover-loop tasks.
pub trait NetworkSocket: Send + Sync {
    fn send_ping(&self, target: SocketAddr, local_id: NodeId) -> Result<(), NetworkError>;
    fn send_pong(&self, target: SocketAddr, local_id: NodeId) -> Result<(), NetworkError>;
    fn send_find_node(&self, target: SocketAddr, search_id: NodeId) -> Result<(), NetworkError>;
    fn send_neighbors(&self, target: SocketAddr, nodes: &[crate::domain::identity::Node]) -> Result<(), NetworkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    Timeout,
    ConnectionRefused,
    InvalidAddress,
    MessageTooLarge,
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Timeout => write!(f, "network operation timed out"),
            NetworkError::ConnectionRefused => write!(f, "connection refused by peer"),
            NetworkError::InvalidAddress => write!(f, "invalid socket address"),
            NetworkError::MessageTooLarge => write!(f, "message exceeds maximum size"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Opens outbound TCP connections for the connection pool controller
/// (§4.7). Dialing is fire-and-forget from the controller's point of
/// view; completion is reported back through the host's own channel
/// bookkeeping, not through this trait's return value.
#[async_trait::async_trait]
pub trait TcpDialer: Send + Sync {
    async fn dial(&self, addr: SocketAddr) -> Result<(), NetworkError>;
}

/// Closes an established TCP channel on behalf of the connection pool
/// controller (§4.7 disconnection policy). Separate from [`TcpDialer`]
/// because the controller only ever tears down channels it didn't
/// necessarily open itself (inbound/passive peers included).
pub trait ChannelController: Send + Sync {
    fn disconnect(&self, addr: SocketAddr, reason: crate::domain::DisconnectReason);
}

/// Resolves DNS TXT records for the DNS-tree sync client (§4.4).
#[async_trait::async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, NetworkError>;
}

/// Hashing and signature verification for DNS-tree roots (§4.4).
pub trait Verifier: Send + Sync {
    fn sha256(&self, data: &[u8]) -> [u8; 32];
    fn verify(&self, digest: &[u8; 32], signature: &[u8; 65], public_key: &[u8]) -> bool;
}

/// Current time, injected so state-machine timers are deterministically
/// testable.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Uniform randomness, re-exported at the port boundary so adapters can
/// supply a real CSPRNG while domain logic stays on
/// [`crate::domain::random::RandomSource`].
pub use crate::domain::random::RandomSource;

/// Emits counters/gauges as the host application sees fit. Per the
/// ambient logging stack, a `tracing`-backed implementation is provided
/// and no dedicated metrics exporter is required in scope.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &'static str, value: u64);
    fn gauge(&self, name: &'static str, value: i64);
}

/// Tunable parameters for the connection pool controller (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub limits: crate::domain::connection_pool::PoolLimits,
    pub disconnection_policy_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            limits: crate::domain::connection_pool::PoolLimits {
                min_connections: 8,
                min_active_connections: 4,
                max_connections: 50,
                max_connections_with_same_ip: 2,
            },
            disconnection_policy_enabled: true,
        }
    }
}

/// Tunable parameters for the Kademlia service (component C).
#[derive(Debug, Clone, Copy)]
pub struct KademliaConfig {
    pub local_network_id: u64,
    pub alpha: usize,
    pub discover_cycle_ms: u64,
    pub max_loop_num: u64,
    pub max_steps: u32,
    pub wait_time_ms: u64,
    pub handler_map_soft_cap: usize,
    pub handler_map_hard_cap: usize,
}

impl Default for KademliaConfig {
    fn default() -> Self {
        Self {
            local_network_id: 1,
            alpha: 3,
            discover_cycle_ms: 7_200,
            max_loop_num: 10,
            max_steps: 4,
            wait_time_ms: 500,
            handler_map_soft_cap: 3_000,
            handler_map_hard_cap: 2_000,
        }
    }
}

/// Source of bootstrap nodes and all subsystem configuration the host
/// surfaces (CLI flags, config file, environment).
pub trait ConfigProvider: Send + Sync {
    fn get_bootstrap_nodes(&self) -> Vec<SocketAddr>;
    fn get_dns_tree_urls(&self) -> Vec<String>;
    fn get_kademlia_config(&self) -> KademliaConfig;
    fn local_node_id(&self) -> NodeId;
    fn local_has_ipv4(&self) -> bool;

    /// Nodes always dialed first each pool cycle, bypassing the
    /// lack-of-capacity guard (the CLI surface's `activeNodes`).
    fn get_active_nodes(&self) -> Vec<SocketAddr>;
    fn get_pool_config(&self) -> PoolConfig;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTimeSource(u64);

    impl TimeSource for FixedTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0)
        }
    }

    #[test]
    fn fixed_time_source_returns_configured_value() {
        let source = FixedTimeSource(1000);
        assert_eq!(source.now().as_secs(), 1000);
    }

    #[test]
    fn network_error_display() {
        assert_eq!(NetworkError::Timeout.to_string(), "network operation timed out");
    }
}
