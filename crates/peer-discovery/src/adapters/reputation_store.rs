//! Persists [`crate::domain::reputation::ReputationTable`] snapshots to
//! disk. Reference: §4.5 ("write-temp, rename" atomicity, `.bak` fallback).

use std::io;
use std::path::{Path, PathBuf};

use crate::domain::errors::PersistenceError;
use crate::domain::identity::NodeId;
use crate::domain::reputation::ReputationTable;

/// Deterministic binary layout: repeated `(20-byte node id, 4-byte score,
/// 8-byte timestamp)` records, each field big-endian.
fn serialize(entries: &[(NodeId, i32, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * (crate::domain::identity::NODE_ID_LEN + 12));
    for (id, score, ts) in entries {
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(&score.to_be_bytes());
        out.extend_from_slice(&ts.to_be_bytes());
    }
    out
}

fn deserialize(bytes: &[u8]) -> Result<Vec<(NodeId, i32, u64)>, PersistenceError> {
    const RECORD_LEN: usize = crate::domain::identity::NODE_ID_LEN + 4 + 8;
    if bytes.len() % RECORD_LEN != 0 {
        return Err(PersistenceError::Corrupt(format!(
            "snapshot length {} is not a multiple of record length {}",
            bytes.len(),
            RECORD_LEN
        )));
    }
    let mut out = Vec::with_capacity(bytes.len() / RECORD_LEN);
    for chunk in bytes.chunks_exact(RECORD_LEN) {
        let mut id_bytes = [0u8; crate::domain::identity::NODE_ID_LEN];
        id_bytes.copy_from_slice(&chunk[..crate::domain::identity::NODE_ID_LEN]);
        let id = NodeId::new(id_bytes);
        let score_offset = crate::domain::identity::NODE_ID_LEN;
        let score = i32::from_be_bytes(chunk[score_offset..score_offset + 4].try_into().unwrap());
        let ts = u64::from_be_bytes(chunk[score_offset + 4..score_offset + 12].try_into().unwrap());
        out.push((id, score, ts));
    }
    Ok(out)
}

pub struct ReputationStore {
    path: PathBuf,
}

impl ReputationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn backup_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("dat");
        p.set_extension(format!("{ext}.bak"));
        p
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("dat");
        p.set_extension(format!("{ext}.tmp"));
        p
    }

    /// Write-temp, copy-to-backup, rename. Failures are returned to the
    /// caller to log; in-memory state remains authoritative regardless.
    pub fn save(&self, table: &ReputationTable) -> Result<(), PersistenceError> {
        let bytes = serialize(&table.snapshot());
        let tmp = self.tmp_path();
        std::fs::write(&tmp, &bytes).map_err(io_err)?;
        if self.path.exists() {
            std::fs::copy(&self.path, self.backup_path()).map_err(io_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Load `reputation.dat`, falling back to the `.bak` sibling.
    pub fn load(&self) -> Result<ReputationTable, PersistenceError> {
        match self.load_from(&self.path) {
            Ok(table) => Ok(table),
            Err(_) => self.load_from(&self.backup_path()),
        }
    }

    fn load_from(&self, path: &Path) -> Result<ReputationTable, PersistenceError> {
        let bytes = std::fs::read(path).map_err(io_err)?;
        let entries = deserialize(&bytes)?;
        Ok(ReputationTable::load_snapshot(entries))
    }
}

fn io_err(e: io::Error) -> PersistenceError {
    PersistenceError::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::Timestamp;

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("repstore-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = ReputationStore::new(dir.join("reputation.dat"));

        let mut table = ReputationTable::new();
        table.set(NodeId::new([3u8; crate::domain::identity::NODE_ID_LEN]), 150, Timestamp::new(42));
        store.save(&table).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.get(&NodeId::new([3u8; crate::domain::identity::NODE_ID_LEN]), Timestamp::new(42)),
            150
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_falls_back_to_backup_when_primary_missing() {
        let dir = std::env::temp_dir().join(format!("repstore-test-bak-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = ReputationStore::new(dir.join("reputation.dat"));

        let mut table = ReputationTable::new();
        table.set(NodeId::new([5u8; crate::domain::identity::NODE_ID_LEN]), 120, Timestamp::new(0));
        store.save(&table).unwrap();
        // simulate a corrupted primary by removing it but keeping no backup yet
        // on first save there is no backup; save again to produce one, then
        // corrupt the primary.
        store.save(&table).unwrap();
        std::fs::write(dir.join("reputation.dat"), b"corrupt").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.get(&NodeId::new([5u8; crate::domain::identity::NODE_ID_LEN]), Timestamp::new(0)),
            120
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
