use super::*;
use crate::domain::identity::{IpAddr, NodeId, SocketAddr, NODE_ID_LEN};
use crate::ports::{ConfigProvider, NetworkSocket, TimeSource};

fn local_id() -> NodeId {
    NodeId::new([1u8; NODE_ID_LEN])
}

#[test]
fn system_time_source_returns_recent_timestamp() {
    let source = SystemTimeSource::new();
    assert!(source.now().as_secs() > 1_700_000_000);
}

#[test]
fn system_time_source_is_monotonic() {
    let source = SystemTimeSource::new();
    let t1 = source.now();
    let t2 = source.now();
    assert!(t2.as_secs() >= t1.as_secs());
}

#[test]
fn noop_network_socket_accepts_all_messages() {
    let socket = NoOpNetworkSocket;
    let addr = SocketAddr::new(IpAddr::v4(127, 0, 0, 1), 8080);
    assert!(socket.send_ping(addr, local_id()).is_ok());
    assert!(socket.send_pong(addr, local_id()).is_ok());
    assert!(socket.send_find_node(addr, local_id()).is_ok());
    assert!(socket.send_neighbors(addr, &[]).is_ok());
}

#[test]
fn static_config_provider_defaults_to_empty_bootstrap() {
    let provider = StaticConfigProvider::new(local_id());
    assert!(provider.get_bootstrap_nodes().is_empty());
    assert_eq!(provider.local_node_id(), local_id());
}

#[test]
fn static_config_provider_with_bootstrap() {
    let nodes = vec![
        SocketAddr::new(IpAddr::v4(192, 168, 1, 100), 30303),
        SocketAddr::new(IpAddr::v4(10, 0, 0, 1), 30303),
    ];
    let provider = StaticConfigProvider::new(local_id()).with_bootstrap_nodes(nodes);
    assert_eq!(provider.get_bootstrap_nodes().len(), 2);
}

#[cfg(feature = "network")]
mod toml_tests {
    use super::*;

    #[test]
    fn toml_config_provider_parses_bootstrap_and_kademlia() {
        let toml = r#"
            [bootstrap]
            nodes = ["192.168.1.100:30303", "10.0.0.1:30303"]

            [kademlia]
            alpha = 5
            discover_cycle_ms = 1000
        "#;
        let provider = TomlConfigProvider::parse(toml, local_id()).unwrap();
        assert_eq!(provider.get_bootstrap_nodes().len(), 2);
        let config = provider.get_kademlia_config();
        assert_eq!(config.alpha, 5);
        assert_eq!(config.discover_cycle_ms, 1000);
    }

    #[test]
    fn toml_config_provider_empty_uses_defaults() {
        let provider = TomlConfigProvider::parse("", local_id()).unwrap();
        assert!(provider.get_bootstrap_nodes().is_empty());
        assert_eq!(provider.get_kademlia_config().alpha, 3);
    }
}
