//! Domain layer: pure Kademlia, reputation, and DNS-tree logic with no I/O.

pub mod connection_pool;
pub mod dns_tree;
pub mod errors;
pub mod identity;
pub mod node_detect;
pub mod node_handler;
pub mod random;
pub mod reputation;
pub mod routing_table;

pub use errors::*;
pub use identity::*;
