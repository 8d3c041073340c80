//! Decision logic for `RandomIterator.next()`: which tree, and which
//! missing hash to chase next, without performing the fetch itself.
//!
//! Reference: §4.4, "Random iteration".

use crate::domain::random::RandomSource;

use super::client_tree::ClientTree;

pub const RANDOM_RETRY_TIMES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// The link subtree for the chosen tree isn't finished; nothing to
    /// fetch from the node subtree yet.
    LinkTreeIncomplete,
    /// Fetch this hash next (it may resolve to a branch, link, or a
    /// `NodesEntry` the caller can sample a node from).
    FetchHash { tree_index: usize, hash: String },
    /// The node subtree is fully walked; caller should reinitialize it
    /// under the tree's current `e_root` to keep iterating.
    RestartNodeSubtree { tree_index: usize, e_root: String },
    /// No trees configured.
    NoTrees,
}

/// Pick a tree uniformly at random and decide the next fetch, retrying up
/// to [`RANDOM_RETRY_TIMES`] times if a picked tree has nothing to offer.
pub fn next_step(trees: &[ClientTree], random: &mut dyn RandomSource) -> NextStep {
    if trees.is_empty() {
        return NextStep::NoTrees;
    }
    for _ in 0..RANDOM_RETRY_TIMES {
        let idx = random.next_below(trees.len());
        let tree = &trees[idx];
        if !tree.link_sync.is_complete() {
            return NextStep::LinkTreeIncomplete;
        }
        if let Some(hash) = tree.nodes_sync.next_missing() {
            return NextStep::FetchHash { tree_index: idx, hash: hash.to_string() };
        }
        if let Some(root) = &tree.root {
            return NextStep::RestartNodeSubtree { tree_index: idx, e_root: root.e_root.clone() };
        }
    }
    NextStep::NoTrees
}
