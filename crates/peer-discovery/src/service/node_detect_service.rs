//! Node Detect service: drives the 5s liveness-probe cycle over
//! [`NodeDetectTracker`], independent of the Kademlia routing table.
//!
//! Reference: §4.6 (Node Detect Handler).
//!
//! The probe round trip itself is a bare TCP dial via [`TcpDialer`] rather
//! than a dedicated wire message: the component contract's
//! `remain_connections` field describes a capacity hint this substrate's
//! wire codec has no carrier for, so a successful connect is treated as
//! `remain_connections = 1` (reachable) and a failed/timed-out dial as
//! `remain_connections = 0` (unreachable, demoted to the bad-node cache).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::domain::identity::Node;
use crate::domain::node_detect::{NodeDetectTracker, NODE_DETECT_TIMEOUT_SECS};
use crate::ports::outbound::{MetricsSink, TcpDialer, TimeSource};

const WORK_CYCLE: Duration = Duration::from_secs(5);

pub struct NodeDetectService {
    tracker: Mutex<NodeDetectTracker>,
    dialer: Arc<dyn TcpDialer>,
    time: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NodeDetectService {
    pub fn new(dialer: Arc<dyn TcpDialer>, time: Arc<dyn TimeSource>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            tracker: Mutex::new(NodeDetectTracker::new()),
            dialer,
            time,
            metrics,
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn connectable_nodes(&self) -> Vec<Node> {
        self.tracker.lock().unwrap().connectable_nodes()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracker.lock().unwrap().len()
    }

    /// `work()`: one full probe cycle — expire stale probes, refill from
    /// `candidates` (normally Kademlia's own connectable set), pick this
    /// cycle's probe targets, and dial each.
    pub async fn work(&self, candidates: Vec<Node>) {
        let now = self.time.now();
        {
            let mut tracker = self.tracker.lock().unwrap();
            tracker.expire_stale_probes(now);
            tracker.refill(candidates, now);
        }
        let targets = {
            let mut tracker = self.tracker.lock().unwrap();
            let targets = tracker.select_probe_targets(now);
            for addr in &targets {
                tracker.begin_probe(addr, now);
            }
            targets
        };
        for addr in targets {
            let started = self.time.now();
            let result = tokio::time::timeout(
                Duration::from_secs(NODE_DETECT_TIMEOUT_SECS),
                self.dialer.dial(addr),
            )
            .await;
            let finished = self.time.now();
            let round_trip = finished.as_secs().saturating_sub(started.as_secs());
            let remain_connections = match result {
                Ok(Ok(())) => 1,
                _ => 0,
            };
            self.tracker.lock().unwrap().record_response(addr, remain_connections, round_trip, finished);
            self.metrics.incr("node_detect.probe", 1);
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Spawns the recurring 5s probe loop. `candidates_fn` is called each
    /// cycle to source refill candidates (normally the Kademlia service's
    /// `connectable_nodes()`).
    pub fn start<F>(self: &Arc<Self>, candidates_fn: F)
    where
        F: Fn() -> Vec<Node> + Send + Sync + 'static,
    {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if service.closed.load(Ordering::SeqCst) {
                    break;
                }
                service.work(candidates_fn()).await;
                tokio::time::sleep(WORK_CYCLE).await;
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tcp::{NoOpTcpDialer, TokioTcpDialer};
    use crate::adapters::TracingMetricsSink;
    use crate::domain::identity::{IpAddr, NodeId, Timestamp, NODE_ID_LEN};
    use crate::ports::outbound::NetworkError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

    fn node(b: u8) -> Node {
        Node::new(NodeId::new([b; NODE_ID_LEN]), IpAddr::v4(10, 0, 0, b), 30303, 1, Timestamp::new(0))
    }

    struct FakeTimeSource(AtomicU64);
    impl TimeSource for FakeTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.load(AtomicOrdering::SeqCst))
        }
    }
    impl FakeTimeSource {
        fn advance(&self, secs: u64) {
            self.0.fetch_add(secs, AtomicOrdering::SeqCst);
        }
    }

    #[tokio::test]
    async fn successful_dial_marks_node_connectable_once_stale_enough() {
        let time = Arc::new(FakeTimeSource(AtomicU64::new(0)));
        let service = NodeDetectService::new(Arc::new(NoOpTcpDialer), time.clone(), Arc::new(TracingMetricsSink));
        service.work(vec![node(1)]).await;
        assert!(service.connectable_nodes().is_empty(), "freshly tracked node isn't probed yet");
        time.advance(40);
        service.work(vec![]).await;
        assert_eq!(service.connectable_nodes().len(), 1);
    }

    struct AlwaysRefusedDialer;
    #[async_trait]
    impl TcpDialer for AlwaysRefusedDialer {
        async fn dial(&self, _addr: crate::domain::identity::SocketAddr) -> Result<(), NetworkError> {
            Err(NetworkError::ConnectionRefused)
        }
    }

    #[tokio::test]
    async fn failed_dial_demotes_to_bad_node_cache() {
        let time = Arc::new(FakeTimeSource(AtomicU64::new(0)));
        let service = NodeDetectService::new(Arc::new(AlwaysRefusedDialer), time.clone(), Arc::new(TracingMetricsSink));
        service.work(vec![node(2)]).await;
        time.advance(40);
        service.work(vec![]).await;
        assert!(service.connectable_nodes().is_empty());
        assert_eq!(service.tracked_count(), 0);
    }

    #[tokio::test]
    async fn real_dialer_type_is_wired_for_production() {
        let _ = TokioTcpDialer;
    }
}
