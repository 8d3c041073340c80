//! Per-URL sync state: the validated root plus both subtrees.
//!
//! Reference: §4.4, `ClientTree` data model and `updateRoot()`/`syncAll()`.

use std::collections::HashSet;

use crate::domain::identity::Timestamp;

use super::entry::RootEntry;
use super::link_cache::LinkCache;
use super::subtree_sync::SubtreeSync;

pub const RECHECK_INTERVAL_SECS: u64 = 3_600;

#[derive(Debug, Clone)]
pub struct ClientTree {
    pub url_domain: String,
    pub root: Option<RootEntry>,
    pub last_validated_at: Timestamp,
    pub last_seq: u64,
    pub link_sync: SubtreeSync,
    pub nodes_sync: SubtreeSync,
    pub link_cache: LinkCache,
    pub current_link_urls: HashSet<String>,
}

impl ClientTree {
    pub fn new(url_domain: String) -> Self {
        Self {
            url_domain,
            root: None,
            last_validated_at: Timestamp::new(0),
            last_seq: 0,
            link_sync: SubtreeSync::new(String::new(), true),
            nodes_sync: SubtreeSync::new(String::new(), false),
            link_cache: LinkCache::new(),
            current_link_urls: HashSet::new(),
        }
    }

    pub fn next_scheduled_root_check(&self) -> Timestamp {
        self.last_validated_at.add_secs(RECHECK_INTERVAL_SECS)
    }

    /// Apply a freshly fetched and verified root. Returns
    /// `(link_root_changed, node_root_changed)`; `(false, false)` when the
    /// fetched root is stale (`seq <= last_seq`), in which case no
    /// subtree reinitialization happens.
    pub fn apply_root(&mut self, new_root: RootEntry, now: Timestamp) -> (bool, bool) {
        self.last_validated_at = now;
        if new_root.seq <= self.last_seq {
            return (false, false);
        }
        self.last_seq = new_root.seq;
        let link_changed = self.root.as_ref().map(|r| r.l_root != new_root.l_root).unwrap_or(true);
        let node_changed = self.root.as_ref().map(|r| r.e_root != new_root.e_root).unwrap_or(true);
        if link_changed {
            self.link_sync.reinit(new_root.l_root.clone());
            self.current_link_urls.clear();
        }
        if node_changed {
            self.nodes_sync.reinit(new_root.e_root.clone());
        }
        self.root = Some(new_root);
        (link_changed, node_changed)
    }

    pub fn is_fully_synced(&self) -> bool {
        self.link_sync.is_complete() && self.nodes_sync.is_complete()
    }
}
