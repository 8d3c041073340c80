//! `PeerDiscoveryService`: the facade a host node actually holds. Composes
//! the Kademlia, DNS-tree sync, node-detect, and connection-pool services
//! behind the [`PeerDiscoveryApi`] driving port.

use std::sync::Arc;

use crate::domain::errors::{BanReason, PeerDiscoveryError};
use crate::domain::identity::{Node, NodeId, SocketAddr};
use crate::domain::routing_table::RoutingTableStats;
use crate::ports::inbound::PeerDiscoveryApi;
use crate::ports::outbound::{
    ChannelController, ConfigProvider, DnsResolver, MetricsSink, NetworkSocket, RandomSource,
    TcpDialer, TimeSource, Verifier,
};

use super::connection_pool_service::ConnectionPoolService;
use super::dns_sync::DnsSyncService;
use super::kademlia::KademliaService;
use super::node_detect_service::NodeDetectService;

/// Owns every component of the peer-discovery substrate and wires their
/// candidate pools together: node-detect probes Kademlia's connectable
/// set, the connection pool dials from node-detect's and Kademlia's own
/// connectable sets.
pub struct PeerDiscoveryService {
    kademlia: Arc<KademliaService>,
    dns_sync: Arc<DnsSyncService>,
    node_detect: Arc<NodeDetectService>,
    connection_pool: Arc<ConnectionPoolService>,
}

impl PeerDiscoveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &dyn ConfigProvider,
        socket: Arc<dyn NetworkSocket>,
        dialer: Arc<dyn TcpDialer>,
        channel_controller: Arc<dyn ChannelController>,
        dns_resolver: Arc<dyn DnsResolver>,
        verifier: Arc<dyn Verifier>,
        time: Arc<dyn TimeSource>,
        random_kademlia: Box<dyn RandomSource + Send>,
        random_dns: Box<dyn RandomSource + Send>,
        random_pool: Box<dyn RandomSource + Send>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let kademlia = Arc::new(KademliaService::new(
            config.local_node_id(),
            config.get_kademlia_config(),
            config.local_has_ipv4(),
            socket,
            time.clone(),
            random_kademlia,
            metrics.clone(),
        ));
        kademlia.channel_activated(config.get_bootstrap_nodes());

        let dns_sync = Arc::new(DnsSyncService::new(
            config.get_dns_tree_urls(),
            dns_resolver,
            verifier,
            time.clone(),
            random_dns,
            metrics.clone(),
        ));

        let node_detect = Arc::new(NodeDetectService::new(dialer.clone(), time.clone(), metrics.clone()));

        let pool_config = config.get_pool_config();
        let connection_pool = Arc::new(ConnectionPoolService::new(
            config.local_node_id(),
            pool_config.limits,
            config.get_active_nodes(),
            pool_config.disconnection_policy_enabled,
            config.local_has_ipv4(),
            dialer,
            channel_controller,
            time,
            random_pool,
            metrics,
        ));

        Self { kademlia, dns_sync, node_detect, connection_pool }
    }

    pub fn kademlia(&self) -> &Arc<KademliaService> {
        &self.kademlia
    }

    pub fn dns_sync(&self) -> &Arc<DnsSyncService> {
        &self.dns_sync
    }

    pub fn node_detect(&self) -> &Arc<NodeDetectService> {
        &self.node_detect
    }

    pub fn connection_pool(&self) -> &Arc<ConnectionPoolService> {
        &self.connection_pool
    }

    /// Routes an inbound wire datagram (the UDP discovery socket's
    /// receive loop calls this).
    pub fn handle_wire_event(&self, body: &[u8], sender: SocketAddr) {
        self.kademlia.handle_event(body, sender);
    }

    /// Starts every background scheduler: Kademlia's discover loop, the
    /// DNS-tree recheck loop, the node-detect probe loop, and the
    /// connection pool's dial/disconnect loops.
    pub fn start(self: &Arc<Self>) {
        self.kademlia.start_discover_loop();
        self.kademlia.start_ping_timeout_loop();
        self.dns_sync.start_recheck_loop();

        let node_detect_candidates_source = Arc::clone(&self.kademlia);
        self.node_detect.start(move || node_detect_candidates_source.connectable_nodes());

        let node_detect_for_pool = Arc::clone(&self.node_detect);
        let kademlia_for_pool = Arc::clone(&self.kademlia);
        self.connection_pool.start(move || {
            (
                node_detect_for_pool.connectable_nodes(),
                kademlia_for_pool.connectable_nodes(),
                Vec::new(),
            )
        });
    }

    pub fn close(&self) {
        self.kademlia.close();
        self.dns_sync.close();
        self.node_detect.close();
        self.connection_pool.close();
    }
}

impl PeerDiscoveryApi for PeerDiscoveryService {
    fn find_closest_peers(&self, target_id: NodeId, count: usize) -> Vec<Node> {
        self.kademlia.closest_peers(target_id, count)
    }

    fn add_peer(&mut self, node: Node) -> Result<bool, PeerDiscoveryError> {
        Ok(self.kademlia.offer_peer(node))
    }

    fn get_random_peers(&self, count: usize) -> Vec<Node> {
        self.kademlia.random_peers(count)
    }

    fn ban_peer(&mut self, node_id: NodeId, duration_seconds: u64, reason: BanReason) -> Result<(), PeerDiscoveryError> {
        self.kademlia.ban_peer(node_id, duration_seconds, reason);
        Ok(())
    }

    fn is_banned(&self, node_id: NodeId) -> bool {
        self.kademlia.is_banned(node_id)
    }

    fn touch_peer(&mut self, node_id: NodeId) -> Result<(), PeerDiscoveryError> {
        self.kademlia.touch_peer(node_id)
    }

    fn remove_peer(&mut self, node_id: NodeId) -> Result<(), PeerDiscoveryError> {
        self.kademlia.remove_peer(node_id)
    }

    fn get_stats(&self) -> RoutingTableStats {
        self.kademlia.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::network::{NoOpNetworkSocket, StaticConfigProvider, SystemTimeSource};
    use crate::adapters::security::{OsRandomSource, Secp256k1Verifier};
    use crate::adapters::tcp::{NoOpChannelController, NoOpTcpDialer};
    use crate::adapters::{StaticDnsResolver, TracingMetricsSink};
    use crate::domain::identity::NODE_ID_LEN;
    use std::collections::HashMap;

    fn build_service() -> PeerDiscoveryService {
        let local_id = NodeId::new([9u8; NODE_ID_LEN]);
        let config = StaticConfigProvider::new(local_id);
        PeerDiscoveryService::new(
            &config,
            Arc::new(NoOpNetworkSocket),
            Arc::new(NoOpTcpDialer),
            Arc::new(NoOpChannelController),
            Arc::new(StaticDnsResolver { records: HashMap::new() }),
            Arc::new(Secp256k1Verifier),
            Arc::new(SystemTimeSource),
            Box::new(OsRandomSource::new()),
            Box::new(OsRandomSource::new()),
            Box::new(OsRandomSource::new()),
            Arc::new(TracingMetricsSink),
        )
    }

    #[test]
    fn composed_service_starts_with_an_empty_table() {
        let service = build_service();
        assert_eq!(service.get_stats().total_peers, 0);
    }

    #[test]
    fn add_peer_registers_a_handler_for_the_offered_node() {
        let mut service = build_service();
        let node = Node::new(NodeId::new([1u8; NODE_ID_LEN]), crate::domain::identity::IpAddr::v4(10, 0, 0, 1), 30303, 1, crate::domain::identity::Timestamp::new(0));
        assert!(service.add_peer(node).unwrap());
    }

    #[test]
    fn ban_then_is_banned_round_trips() {
        let mut service = build_service();
        let id = NodeId::new([2u8; NODE_ID_LEN]);
        service.ban_peer(id, 3600, BanReason::ManualBan).unwrap();
        assert!(service.is_banned(id));
    }
}
