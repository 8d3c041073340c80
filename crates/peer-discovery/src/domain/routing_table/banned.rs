//! Node-id bans tracked against the routing table.
//!
//! IP-level bans used by the connection pool (§4.7) live in
//! [`crate::domain::connection_pool`]; this tracker exists so the inbound
//! API (`ban_peer` / `is_banned`) can reject a specific identity regardless
//! of which address it is currently advertising.

use std::collections::HashMap;

use crate::domain::errors::BanReason;
use crate::domain::identity::{NodeId, Timestamp};

#[derive(Debug, Clone)]
struct BannedEntry {
    banned_until: Timestamp,
    reason: BanReason,
}

#[derive(Debug, Clone, Default)]
pub struct BannedPeers {
    entries: HashMap<NodeId, BannedEntry>,
}

impl BannedPeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&mut self, node_id: NodeId, until: Timestamp, reason: BanReason) {
        self.entries.insert(node_id, BannedEntry {
            banned_until: until,
            reason,
        });
    }

    pub fn is_banned(&self, node_id: &NodeId, now: Timestamp) -> bool {
        self.entries
            .get(node_id)
            .is_some_and(|e| e.banned_until > now)
    }

    pub fn reason(&self, node_id: &NodeId) -> Option<BanReason> {
        self.entries.get(node_id).map(|e| e.reason)
    }

    pub fn gc_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.banned_until > now);
        before - self.entries.len()
    }

    pub fn count(&self, now: Timestamp) -> usize {
        self.entries
            .values()
            .filter(|e| e.banned_until > now)
            .count()
    }
}
