//! # Peer Discovery Service
//!
//! Composes the four subsystems behind the [`PeerDiscoveryApi`] driving
//! port: the Kademlia UDP service (component D), the DNS-tree sync client
//! (component G/K), the node-detect probe loop (component I), and the
//! connection pool controller (component J). [`PeerDiscoveryService`] is
//! the facade a host node actually holds; [`maintenance::MaintenanceScheduler`]
//! is a separate, optional piece a host wires up when it has a data
//! directory to persist reputation into.

mod connection_pool_service;
mod core;
mod dns_sync;
mod kademlia;
pub mod maintenance;
mod node_detect_service;

pub use connection_pool_service::ConnectionPoolService;
pub use core::PeerDiscoveryService;
pub use dns_sync::DnsSyncService;
pub use kademlia::KademliaService;
pub use maintenance::MaintenanceScheduler;
pub use node_detect_service::NodeDetectService;
