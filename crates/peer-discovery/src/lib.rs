//! # Peer Discovery & Connection Pool Substrate
//!
//! Kademlia UDP DHT discovery, a signed DNS-tree directory client, durable
//! per-peer reputation, and an outbound connection pool controller that
//! converges toward configured connection targets.
//!
//! ## Architecture
//!
//! Hexagonal: a dependency-free `domain` layer (k-buckets, the node-handler
//! state machine, reputation decay, DNS-tree parsing/codec, connection-pool
//! selection), `ports` trait boundaries the host application implements
//! (UDP/TCP I/O, DNS resolution, signing, time, randomness, config,
//! metrics), and `adapters` providing default implementations of those
//! ports (`tokio` UDP/TCP, `hickory-resolver` DNS, `k256`/`sha2` signing,
//! `tracing` metrics). The `service` layer composes the four subsystems
//! (Kademlia, DNS sync, node-detect, connection pool) behind the
//! [`PeerDiscoveryApi`] driving port.
//!
//! ## Example
//!
//! ```rust
//! use qc_peer_discovery::domain::{IpAddr, Node, NodeId, Timestamp};
//! use qc_peer_discovery::domain::routing_table::RoutingTable;
//!
//! let local_id = NodeId::new([0u8; 20]);
//! let mut table = RoutingTable::new(local_id);
//!
//! let peer = Node::new(
//!     NodeId::new([1u8; 20]),
//!     IpAddr::v4(192, 168, 1, 100),
//!     30303,
//!     1,
//!     Timestamp::new(1_000),
//! );
//!
//! assert!(table.add(peer).unwrap().is_none());
//! assert_eq!(table.total_peer_count(), 1);
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod test_utils;

pub use domain::errors::{BanReason, DisconnectReason, DnsTreeError, PeerDiscoveryError, PersistenceError, WarningType};
pub use domain::identity::{
    calculate_bucket_index, xor_distance, xor_distance_bit, Distance, IpAddr, Node, NodeId,
    SocketAddr, Timestamp,
};
pub use domain::routing_table::{NodeBucket, RoutingTable, RoutingTableStats};

pub use ports::inbound::PeerDiscoveryApi;
pub use ports::outbound::{
    ChannelController, ConfigProvider, DnsResolver, KademliaConfig, MetricsSink, NetworkError,
    NetworkSocket, PoolConfig, RandomSource, TcpDialer, TimeSource, Verifier,
};

pub use service::PeerDiscoveryService;

pub use adapters::{
    HickoryDnsResolver, NoOpChannelController, NoOpNetworkSocket, NoOpTcpDialer, OsRandomSource,
    ReputationStore, Secp256k1Verifier, StaticConfigProvider, StaticDnsResolver,
    SystemTimeSource, TokioTcpDialer, TracingMetricsSink, UdpNetworkSocket,
};

#[cfg(feature = "network")]
pub use adapters::{ConfigError, TomlConfigProvider};
