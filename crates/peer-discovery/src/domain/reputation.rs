//! Reputation scoring: pure decay logic. Persistence (write-temp, rename,
//! `.bak` fallback) lives in the reputation store adapter.
//!
//! Reference: §4.5 (Reputation Store).

use std::collections::HashMap;

use crate::domain::identity::{NodeId, Timestamp};

pub const NEUTRAL_SCORE: i32 = 100;
pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 200;
pub const DECAY_PER_DAY: i32 = 5;

#[derive(Debug, Clone, Copy)]
struct ScoreEntry {
    score: i32,
    recorded_at: Timestamp,
}

/// Decay `score` toward [`NEUTRAL_SCORE`] by `DECAY_PER_DAY` points per
/// whole elapsed day, never overshooting neutral.
pub fn decay(score: i32, elapsed_days: u64) -> i32 {
    if elapsed_days == 0 {
        return score;
    }
    let delta = DECAY_PER_DAY as i64 * elapsed_days as i64;
    if score > NEUTRAL_SCORE {
        (score as i64 - delta).max(NEUTRAL_SCORE as i64) as i32
    } else if score < NEUTRAL_SCORE {
        (score as i64 + delta).min(NEUTRAL_SCORE as i64) as i32
    } else {
        score
    }
}

/// In-memory reputation table. `get` applies decay at read time; the
/// decayed value is NOT written back, matching the read-only semantics of
/// the upstream contract (only explicit `set` mutates the stored score).
#[derive(Debug, Clone, Default)]
pub struct ReputationTable {
    entries: HashMap<NodeId, ScoreEntry>,
}

impl ReputationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &NodeId, now: Timestamp) -> i32 {
        match self.entries.get(node_id) {
            Some(entry) => decay(entry.score, entry.recorded_at.whole_days_until(now)),
            None => NEUTRAL_SCORE,
        }
    }

    pub fn set(&mut self, node_id: NodeId, score: i32, now: Timestamp) {
        let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
        self.entries.insert(node_id, ScoreEntry {
            score: clamped,
            recorded_at: now,
        });
    }

    /// Apply `delta` to the peer's current (decayed) score and persist
    /// the result as the new baseline.
    pub fn adjust(&mut self, node_id: NodeId, delta: i32, now: Timestamp) -> i32 {
        let current = self.get(&node_id, now);
        let updated = current + delta;
        self.set(node_id, updated, now);
        updated.clamp(MIN_SCORE, MAX_SCORE)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot for serialization: (node_id, score, recorded_at_secs).
    pub fn snapshot(&self) -> Vec<(NodeId, i32, u64)> {
        self.entries
            .iter()
            .map(|(id, e)| (*id, e.score, e.recorded_at.as_secs()))
            .collect()
    }

    pub fn load_snapshot(entries: Vec<(NodeId, i32, u64)>) -> Self {
        let mut table = Self::new();
        for (id, score, recorded_at) in entries {
            table.entries.insert(id, ScoreEntry {
                score,
                recorded_at: Timestamp::new(recorded_at),
            });
        }
        table
    }
}
