//! Connection pool controller: the outbound dial cycle and the passive-peer
//! disconnection policy.
//!
//! Reference: §4.7 (Connection Pool Controller).
//!
//! This service owns the live channel bookkeeping the domain layer's
//! [`PoolSnapshot`] only describes the shape of: which addresses are
//! connecting, established, banned, or recently attempted. The domain
//! functions stay pure; this module is the thin, stateful wrapper a host
//! node actually drives.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::domain::connection_pool::{
    attempt_expired, select_dial_targets, PoolLimits, PoolSnapshot, DISCONNECT_RANDOM_CAP_SECS,
};
use crate::domain::identity::{IpAddr, Node, NodeId, SocketAddr, Timestamp};
use crate::domain::DisconnectReason;
use crate::ports::outbound::{ChannelController, MetricsSink, RandomSource, TcpDialer, TimeSource};

const DIAL_CYCLE: Duration = Duration::from_millis(3_600);
const DISCONNECT_CYCLE: Duration = Duration::from_secs(DISCONNECT_RANDOM_CAP_SECS);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Connecting,
    Active,
    Passive,
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    node_id: Option<NodeId>,
    ip: IpAddr,
    kind: ChannelKind,
}

pub struct ConnectionPoolService {
    local_node_id: NodeId,
    limits: PoolLimits,
    active_nodes: Vec<SocketAddr>,
    disconnection_policy_enabled: bool,
    local_has_ipv4: bool,
    channels: Mutex<HashMap<SocketAddr, Channel>>,
    banned: Mutex<HashSet<IpAddr>>,
    recently_attempted: Mutex<HashMap<SocketAddr, Timestamp>>,
    dialer: Arc<dyn TcpDialer>,
    channel_controller: Arc<dyn ChannelController>,
    time: Arc<dyn TimeSource>,
    random: Mutex<Box<dyn RandomSource + Send>>,
    metrics: Arc<dyn MetricsSink>,
    closed: AtomicBool,
    dial_task: Mutex<Option<JoinHandle<()>>>,
    disconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPoolService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_node_id: NodeId,
        limits: PoolLimits,
        active_nodes: Vec<SocketAddr>,
        disconnection_policy_enabled: bool,
        local_has_ipv4: bool,
        dialer: Arc<dyn TcpDialer>,
        channel_controller: Arc<dyn ChannelController>,
        time: Arc<dyn TimeSource>,
        random: Box<dyn RandomSource + Send>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            local_node_id,
            limits,
            active_nodes,
            disconnection_policy_enabled,
            local_has_ipv4,
            channels: Mutex::new(HashMap::new()),
            banned: Mutex::new(HashSet::new()),
            recently_attempted: Mutex::new(HashMap::new()),
            dialer,
            channel_controller,
            time,
            random: Mutex::new(random),
            metrics,
            closed: AtomicBool::new(false),
            dial_task: Mutex::new(None),
            disconnect_task: Mutex::new(None),
        }
    }

    pub fn ban(&self, ip: IpAddr) {
        self.banned.lock().unwrap().insert(ip);
    }

    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.banned.lock().unwrap().contains(&ip)
    }

    pub fn mark_active_connected(&self, addr: SocketAddr, node_id: Option<NodeId>) {
        self.channels.lock().unwrap().insert(
            addr,
            Channel { node_id, ip: addr.ip, kind: ChannelKind::Active },
        );
    }

    pub fn mark_passive_connected(&self, addr: SocketAddr, node_id: Option<NodeId>) {
        self.channels.lock().unwrap().insert(
            addr,
            Channel { node_id, ip: addr.ip, kind: ChannelKind::Passive },
        );
    }

    pub fn mark_disconnected(&self, addr: SocketAddr) {
        self.channels.lock().unwrap().remove(&addr);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    fn prune_attempts(&self, now: Timestamp) {
        self.recently_attempted.lock().unwrap().retain(|_, stamped_at| !attempt_expired(*stamped_at, now));
    }

    fn snapshot(&self, now: Timestamp) -> PoolSnapshot {
        self.prune_attempts(now);
        let channels = self.channels.lock().unwrap();

        let mut nodes_in_use: HashSet<NodeId> = HashSet::new();
        nodes_in_use.insert(self.local_node_id);
        let mut addresses_in_use: HashSet<IpAddr> = HashSet::new();
        let mut inet_in_use: HashSet<SocketAddr> = HashSet::new();
        let mut ip_connection_counts: HashMap<IpAddr, usize> = HashMap::new();
        let mut connecting_count = 0usize;
        let mut passive_count = 0usize;

        for (addr, channel) in channels.iter() {
            if let Some(id) = channel.node_id {
                nodes_in_use.insert(id);
            }
            addresses_in_use.insert(channel.ip);
            inet_in_use.insert(*addr);
            *ip_connection_counts.entry(channel.ip).or_insert(0) += 1;
            match channel.kind {
                ChannelKind::Connecting => connecting_count += 1,
                ChannelKind::Passive => passive_count += 1,
                ChannelKind::Active => {}
            }
        }

        PoolSnapshot {
            connecting_count,
            passive_count,
            nodes_in_use,
            addresses_in_use,
            inet_in_use,
            banned_addresses: self.banned.lock().unwrap().clone(),
            recently_attempted: self.recently_attempted.lock().unwrap().keys().copied().collect(),
            ip_connection_counts,
        }
    }

    fn active_node_placeholder(&self, addr: SocketAddr) -> Node {
        let (ipv4, ipv6) = match addr.ip {
            IpAddr::V4(b) => (Some(b), None),
            IpAddr::V6(b) => (None, Some(b)),
        };
        Node {
            id: None,
            ipv4,
            ipv6,
            port: addr.port,
            bind_port: addr.port,
            network_id: 0,
            network_version: 1,
            update_time: self.time.now(),
        }
    }

    /// One dial cycle (§4.7): compute the snapshot, pick targets from the
    /// configured-active list plus the three candidate pools, and fire a
    /// dial for each. Dials are fan-out-and-forget: completion only
    /// updates this service's own bookkeeping, never blocks the cycle.
    pub async fn dial_cycle(
        self: &Arc<Self>,
        node_detect_candidates: Vec<Node>,
        kademlia_candidates: Vec<Node>,
        dns_candidates: Vec<Node>,
    ) -> Vec<SocketAddr> {
        let now = self.time.now();
        let snapshot = self.snapshot(now);

        let configured_active: Vec<Node> = self
            .active_nodes
            .iter()
            .filter(|addr| !snapshot.inet_in_use.contains(addr))
            .map(|addr| self.active_node_placeholder(*addr))
            .collect();

        let targets = select_dial_targets(
            configured_active,
            node_detect_candidates,
            kademlia_candidates,
            dns_candidates,
            &self.limits,
            &snapshot,
            self.local_has_ipv4,
        );

        let mut dialed = Vec::with_capacity(targets.len());
        for node in targets {
            let Some(addr) = node.preferred_address(self.local_has_ipv4) else {
                continue;
            };
            let is_configured_active = self.active_nodes.contains(&addr);

            self.recently_attempted.lock().unwrap().insert(addr, now);
            self.channels.lock().unwrap().entry(addr).or_insert(Channel {
                node_id: node.id,
                ip: addr.ip,
                kind: ChannelKind::Connecting,
            });
            if !is_configured_active {
                self.metrics.incr("connection_pool.connecting", 1);
            }
            dialed.push(addr);

            let service = Arc::clone(self);
            let node_id = node.id;
            tokio::spawn(async move {
                match service.dialer.dial(addr).await {
                    Ok(()) => service.mark_active_connected(addr, node_id),
                    Err(_) => {
                        service.mark_disconnected(addr);
                        service.metrics.incr("connection_pool.dial_failed", 1);
                    }
                }
            });
        }
        dialed
    }

    /// Disconnection policy (§4.7): if saturated, evict one uniformly
    /// random passive (inbound) peer.
    pub fn disconnect_cycle(&self) {
        if !self.disconnection_policy_enabled {
            return;
        }
        if self.channels.lock().unwrap().len() < self.limits.max_connections {
            return;
        }
        let passive_addrs: Vec<SocketAddr> = self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c.kind == ChannelKind::Passive)
            .map(|(addr, _)| *addr)
            .collect();
        if passive_addrs.is_empty() {
            return;
        }
        let index = self.random.lock().unwrap().next_below(passive_addrs.len());
        let victim = passive_addrs[index];
        self.channel_controller.disconnect(victim, DisconnectReason::RandomElimination);
        self.mark_disconnected(victim);
        self.metrics.incr("connection_pool.random_eliminations", 1);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.dial_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.disconnect_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Spawns the 3600ms dial loop and, if enabled, the 30s disconnection
    /// policy loop. `candidates_fn` sources this cycle's node-detect,
    /// Kademlia, and DNS candidate pools.
    pub fn start<F>(self: &Arc<Self>, candidates_fn: F)
    where
        F: Fn() -> (Vec<Node>, Vec<Node>, Vec<Node>) + Send + Sync + 'static,
    {
        let service = Arc::clone(self);
        let dial_handle = tokio::spawn(async move {
            loop {
                if service.closed.load(Ordering::SeqCst) {
                    break;
                }
                let (node_detect, kademlia, dns) = candidates_fn();
                service.dial_cycle(node_detect, kademlia, dns).await;
                tokio::time::sleep(DIAL_CYCLE).await;
            }
        });
        *self.dial_task.lock().unwrap() = Some(dial_handle);

        if self.disconnection_policy_enabled {
            let service = Arc::clone(self);
            let disconnect_handle = tokio::spawn(async move {
                loop {
                    if service.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    service.disconnect_cycle();
                    tokio::time::sleep(DISCONNECT_CYCLE).await;
                }
            });
            *self.disconnect_task.lock().unwrap() = Some(disconnect_handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tcp::NoOpChannelController;
    use crate::adapters::TracingMetricsSink;
    use crate::domain::identity::NODE_ID_LEN;
    use crate::domain::random::FixedRandomSource;
    use crate::ports::outbound::NetworkError;
    use async_trait::async_trait;

    fn node(b: u8) -> Node {
        Node::new(NodeId::new([b; NODE_ID_LEN]), IpAddr::v4(10, 0, 0, b), 30303, 1, Timestamp::new(0))
    }

    fn local_id() -> NodeId {
        NodeId::new([0xffu8; NODE_ID_LEN])
    }

    fn limits() -> PoolLimits {
        PoolLimits {
            min_connections: 2,
            min_active_connections: 1,
            max_connections: 4,
            max_connections_with_same_ip: 2,
        }
    }

    struct FixedTimeSource;
    impl TimeSource for FixedTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(1_000)
        }
    }

    struct AlwaysRefusedDialer;
    #[async_trait]
    impl TcpDialer for AlwaysRefusedDialer {
        async fn dial(&self, _addr: SocketAddr) -> Result<(), NetworkError> {
            Err(NetworkError::ConnectionRefused)
        }
    }

    fn make_service(dialer: Arc<dyn TcpDialer>, limits: PoolLimits, active_nodes: Vec<SocketAddr>) -> Arc<ConnectionPoolService> {
        Arc::new(ConnectionPoolService::new(
            local_id(),
            limits,
            active_nodes,
            true,
            true,
            dialer,
            Arc::new(NoOpChannelController),
            Arc::new(FixedTimeSource),
            Box::new(FixedRandomSource::default()),
            Arc::new(TracingMetricsSink),
        ))
    }

    #[tokio::test]
    async fn dial_cycle_fills_lack_from_kademlia_candidates() {
        let service = make_service(Arc::new(crate::adapters::tcp::NoOpTcpDialer), limits(), vec![]);
        let dialed = service.dial_cycle(vec![], vec![node(1), node(2)], vec![]).await;
        assert_eq!(dialed.len(), 2);
        // let the fire-and-forget tasks run
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.channel_count(), 2);
    }

    #[tokio::test]
    async fn configured_active_nodes_are_always_dialed() {
        let active_addr = SocketAddr::new(IpAddr::v4(192, 168, 1, 1), 30303);
        let service = make_service(Arc::new(crate::adapters::tcp::NoOpTcpDialer), limits(), vec![active_addr]);
        // satisfy lack so only the active node would otherwise be skipped
        let dialed = service.dial_cycle(vec![], vec![], vec![]).await;
        assert!(dialed.contains(&active_addr));
    }

    #[tokio::test]
    async fn failed_dial_clears_the_connecting_channel() {
        let service = make_service(Arc::new(AlwaysRefusedDialer), limits(), vec![]);
        service.dial_cycle(vec![], vec![node(1)], vec![]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.channel_count(), 0);
    }

    #[test]
    fn disconnect_cycle_evicts_a_passive_peer_when_saturated() {
        let service = make_service(Arc::new(crate::adapters::tcp::NoOpTcpDialer), limits(), vec![]);
        for b in 1..=4u8 {
            service.mark_passive_connected(SocketAddr::new(IpAddr::v4(10, 0, 0, b), 30303), None);
        }
        assert_eq!(service.channel_count(), 4);
        service.disconnect_cycle();
        assert_eq!(service.channel_count(), 3);
    }

    #[test]
    fn disconnect_cycle_is_a_no_op_when_disabled() {
        let service = Arc::new(ConnectionPoolService::new(
            local_id(),
            limits(),
            vec![],
            false,
            true,
            Arc::new(crate::adapters::tcp::NoOpTcpDialer),
            Arc::new(NoOpChannelController),
            Arc::new(FixedTimeSource),
            Box::new(FixedRandomSource::default()),
            Arc::new(TracingMetricsSink),
        ));
        for b in 1..=4u8 {
            service.mark_passive_connected(SocketAddr::new(IpAddr::v4(10, 0, 0, b), 30303), None);
        }
        service.disconnect_cycle();
        assert_eq!(service.channel_count(), 4);
    }

    #[test]
    fn banning_an_ip_is_reflected_immediately() {
        let service = make_service(Arc::new(crate::adapters::tcp::NoOpTcpDialer), limits(), vec![]);
        let ip = IpAddr::v4(10, 0, 0, 99);
        assert!(!service.is_banned(ip));
        service.ban(ip);
        assert!(service.is_banned(ip));
    }
}
