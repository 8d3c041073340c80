//! BFS-style fetch-tracking for one subtree (link or nodes).
//!
//! Reference: §4.4, `SubtreeSync` data model and "Kind constraints".

use std::collections::{HashMap, VecDeque};

use crate::domain::errors::DnsTreeError;

use super::entry::TreeEntry;

#[derive(Debug, Clone)]
pub struct SubtreeSync {
    pub root: String,
    pub is_link: bool,
    missing: VecDeque<String>,
    seen: HashMap<String, ()>,
}

impl SubtreeSync {
    pub fn new(root: String, is_link: bool) -> Self {
        let mut missing = VecDeque::new();
        missing.push_back(root.clone());
        Self {
            root,
            is_link,
            missing,
            seen: HashMap::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    pub fn next_missing(&self) -> Option<&str> {
        self.missing.front().map(String::as_str)
    }

    pub fn pop_missing(&mut self) -> Option<String> {
        self.missing.pop_front()
    }

    /// Record a resolved entry for `hash`: validates the kind constraint,
    /// removes `hash` from the missing queue, and enqueues any branch
    /// children not already seen.
    ///
    /// A kind-constraint violation (`NodesInLinkTree`/`LinkInNodesTree`) is
    /// a hard error the caller must treat as fatal for this subtree (abort,
    /// don't keep walking `missing`) — it still removes `hash` from the
    /// queue since the fetch itself succeeded; only its kind was wrong.
    pub fn resolve(&mut self, hash: &str, entry: &TreeEntry) -> Result<(), DnsTreeError> {
        self.missing.retain(|h| h != hash);
        match entry {
            TreeEntry::Nodes(_) if self.is_link => return Err(DnsTreeError::NodesInLinkTree),
            TreeEntry::Link(_) if !self.is_link => return Err(DnsTreeError::LinkInNodesTree),
            _ => {}
        }
        self.seen.insert(hash.to_string(), ());
        if let TreeEntry::Branch(branch) = entry {
            for child in &branch.children {
                if !self.seen.contains_key(child) && !self.missing.contains(child) {
                    self.missing.push_back(child.clone());
                }
            }
        }
        Ok(())
    }

    pub fn reinit(&mut self, new_root: String) {
        self.root = new_root.clone();
        self.missing.clear();
        self.missing.push_back(new_root);
        self.seen.clear();
    }
}
