//! # Adapters Layer
//!
//! Concrete implementations of the port traits defined in [`crate::ports`].
//!
//! | Adapter | Module | Dependencies |
//! |---------|--------|--------------|
//! | Network transport, clock, static/TOML config | `network` | `tokio` (UDP send path is sync `std`), `toml`+`serde` behind `network` |
//! | Secp256k1 signature verification, OS randomness | `security` | `k256`, `sha2`, `rand` |
//! | DNS TXT resolution for the tree sync client | `dns` | `hickory-resolver` |
//! | Outbound TCP dialing for the connection pool | `tcp` | `tokio` |
//! | Metrics forwarding | `metrics` | `tracing` |
//! | Reputation score persistence | `reputation_store` | `std::fs` |

pub mod dns;
pub mod metrics;
pub mod network;
pub mod reputation_store;
pub mod security;
pub mod tcp;

pub use dns::{HickoryDnsResolver, StaticDnsResolver};
pub use metrics::TracingMetricsSink;
pub use network::{
    decode_neighbors, MessageType, NoOpNetworkSocket, StaticConfigProvider, SystemTimeSource,
    UdpNetworkSocket,
};
pub use reputation_store::ReputationStore;
pub use security::{OsRandomSource, Secp256k1Verifier};
pub use tcp::{NoOpChannelController, NoOpTcpDialer, TokioTcpDialer};

#[cfg(feature = "network")]
pub use network::{ConfigError, TomlConfigProvider};
