//! DNS-Tree Sync: resolving and validating the signed node-list tree
//! served over DNS TXT records.
//!
//! Reference: §4.4 (DNS Tree Sync).

pub mod client_tree;
pub mod codec;
pub mod entry;
pub mod link_cache;
pub mod random_iterator;
pub mod subtree_sync;

pub use client_tree::{ClientTree, RECHECK_INTERVAL_SECS};
pub use entry::{parse_entry, parse_root, root_signing_payload, BranchEntry, LinkEntry, NodesEntry, RootEntry, TreeEntry};
pub use link_cache::LinkCache;
pub use random_iterator::{next_step, NextStep, RANDOM_RETRY_TIMES};
pub use subtree_sync::SubtreeSync;
