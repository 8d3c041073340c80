//! Hexagonal architecture boundaries: driving (inbound) and driven
//! (outbound) ports.

pub mod inbound;
pub mod outbound;

pub use inbound::PeerDiscoveryApi;
pub use outbound::{
    ChannelController, ConfigProvider, DnsResolver, KademliaConfig, MetricsSink, NetworkError,
    NetworkSocket, PoolConfig, RandomSource, TcpDialer, TimeSource, Verifier,
};
