//! K-bucket implementation.
//!
//! Reference: §4.1 (Routing Table & K-Buckets contract).

use crate::domain::identity::{Node, NodeId, Timestamp};

use super::config::K;

/// An ordered list of at most `K` nodes, oldest (least-recently-touched)
/// first.
#[derive(Debug, Clone, Default)]
pub struct NodeBucket {
    entries: Vec<Node>,
}

impl NodeBucket {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= K
    }

    pub fn entries(&self) -> &[Node] {
        &self.entries
    }

    pub fn oldest(&self) -> Option<&Node> {
        self.entries.first()
    }

    fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.entries.iter().position(|n| n.id.as_ref() == Some(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.position_of(id).is_some()
    }

    /// Insert `node` if there is space; otherwise return the
    /// least-recently-touched entry as an eviction candidate without
    /// mutating the bucket (the caller decides whether to evict).
    pub fn add_node(&mut self, node: Node) -> Option<Node> {
        if self.is_full() {
            return self.oldest().cloned();
        }
        self.entries.push(node);
        None
    }

    /// Evict `victim` and insert `replacement` in its place (appended at
    /// the most-recently-seen end).
    pub fn replace(&mut self, victim: &NodeId, replacement: Node) {
        self.remove(victim);
        self.entries.push(replacement);
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        self.position_of(id).map(|pos| self.entries.remove(pos))
    }

    /// Move a node to the most-recently-seen end and stamp its update time.
    pub fn touch(&mut self, id: &NodeId, now: Timestamp) -> bool {
        if let Some(pos) = self.position_of(id) {
            let mut node = self.entries.remove(pos);
            node.touch(now);
            self.entries.push(node);
            true
        } else {
            false
        }
    }
}
