//! Network-facing adapters: UDP transport, config loading, system clock.
//!
//! Reference: §6 (External Interfaces).

pub mod config;
pub mod time;
pub mod transport;

pub use config::StaticConfigProvider;
pub use time::SystemTimeSource;
pub use transport::{decode_neighbors, MessageType, NoOpNetworkSocket, UdpNetworkSocket};

#[cfg(feature = "network")]
pub use config::{ConfigError, TomlConfigProvider};

#[cfg(test)]
mod tests;
