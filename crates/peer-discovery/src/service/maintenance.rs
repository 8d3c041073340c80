//! Maintenance scheduler: periodic reputation persistence and expired-ban
//! garbage collection (§4.5, §5 "Reputation save uses temp-then-rename,
//! blocking only the save scheduler").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::adapters::reputation_store::ReputationStore;
use crate::service::kademlia::KademliaService;

const SAVE_INTERVAL: Duration = Duration::from_secs(60);

/// Drives the reputation-save cadence and ban garbage collection for a
/// [`KademliaService`]. Kept separate from `KademliaService` itself since
/// persistence is an ambient, swappable concern (a host without a data
/// directory can simply never construct this).
pub struct MaintenanceScheduler {
    kademlia: Arc<KademliaService>,
    store: Arc<ReputationStore>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    pub fn new(kademlia: Arc<KademliaService>, store: Arc<ReputationStore>) -> Self {
        Self { kademlia, store, closed: AtomicBool::new(false), task: Mutex::new(None) }
    }

    /// Loads any previously persisted reputation scores into the
    /// Kademlia service. Call once at startup before `start()`.
    pub fn load(&self) {
        if let Ok(table) = self.store.load() {
            self.kademlia.load_reputation(table.snapshot());
        }
    }

    /// One maintenance pass: persist reputation, then drop expired bans.
    pub fn run_once(&self) {
        let snapshot = self.kademlia.reputation_snapshot();
        let table = crate::domain::reputation::ReputationTable::load_snapshot(snapshot);
        if let Err(e) = self.store.save(&table) {
            tracing::warn!(error = %e, "reputation save failed");
        }
        self.kademlia.gc_expired_bans();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Spawns the recurring 60s maintenance loop.
    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if scheduler.closed.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.run_once();
                tokio::time::sleep(SAVE_INTERVAL).await;
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::network::{NoOpNetworkSocket, SystemTimeSource};
    use crate::adapters::security::OsRandomSource;
    use crate::adapters::TracingMetricsSink;
    use crate::domain::errors::BanReason;
    use crate::domain::identity::{NodeId, NODE_ID_LEN};
    use crate::ports::outbound::KademliaConfig;

    fn build_kademlia() -> Arc<KademliaService> {
        Arc::new(KademliaService::new(
            NodeId::new([1u8; NODE_ID_LEN]),
            KademliaConfig::default(),
            true,
            Arc::new(NoOpNetworkSocket),
            Arc::new(SystemTimeSource),
            Box::new(OsRandomSource::new()),
            Arc::new(TracingMetricsSink),
        ))
    }

    #[test]
    fn run_once_persists_reputation_and_load_restores_it() {
        let dir = std::env::temp_dir().join(format!("peer-discovery-maintenance-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = Arc::new(ReputationStore::new(dir.join("reputation.dat")));

        let peer = NodeId::new([2u8; NODE_ID_LEN]);
        let kademlia = build_kademlia();
        kademlia.load_reputation(vec![(peer, 150, 0)]);

        let scheduler = MaintenanceScheduler::new(Arc::clone(&kademlia), Arc::clone(&store));
        scheduler.run_once();

        let reloaded = build_kademlia();
        let maintenance = MaintenanceScheduler::new(Arc::clone(&reloaded), store);
        maintenance.load();
        assert!(reloaded.reputation_snapshot().iter().any(|(id, score, _)| *id == peer && *score == 150));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn run_once_drops_expired_bans() {
        let dir = std::env::temp_dir().join(format!("peer-discovery-maintenance-bans-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = Arc::new(ReputationStore::new(dir.join("reputation.dat")));

        let kademlia = build_kademlia();
        let still_banned = NodeId::new([3u8; NODE_ID_LEN]);
        kademlia.ban_peer(still_banned, 3600, BanReason::ManualBan);
        let scheduler = MaintenanceScheduler::new(Arc::clone(&kademlia), store);
        scheduler.run_once();
        assert!(kademlia.is_banned(still_banned), "an unexpired ban must survive gc");

        std::fs::remove_dir_all(&dir).ok();
    }
}
