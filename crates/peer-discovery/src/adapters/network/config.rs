use crate::domain::identity::{NodeId, SocketAddr};
use crate::ports::{ConfigProvider, KademliaConfig, PoolConfig};

/// Static configuration provider with hardcoded values. Useful for
/// testing and development; production nodes load `TomlConfigProvider`.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    bootstrap_nodes: Vec<SocketAddr>,
    active_nodes: Vec<SocketAddr>,
    dns_tree_urls: Vec<String>,
    config: KademliaConfig,
    pool_config: PoolConfig,
    local_node_id: NodeId,
    local_has_ipv4: bool,
}

impl StaticConfigProvider {
    #[must_use]
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            bootstrap_nodes: Vec::new(),
            active_nodes: Vec::new(),
            dns_tree_urls: Vec::new(),
            config: KademliaConfig::default(),
            pool_config: PoolConfig::default(),
            local_node_id,
            local_has_ipv4: true,
        }
    }

    #[must_use]
    pub fn with_bootstrap_nodes(mut self, nodes: Vec<SocketAddr>) -> Self {
        self.bootstrap_nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_active_nodes(mut self, nodes: Vec<SocketAddr>) -> Self {
        self.active_nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_dns_tree_urls(mut self, urls: Vec<String>) -> Self {
        self.dns_tree_urls = urls;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: KademliaConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_bootstrap_nodes(&self) -> Vec<SocketAddr> {
        self.bootstrap_nodes.clone()
    }

    fn get_dns_tree_urls(&self) -> Vec<String> {
        self.dns_tree_urls.clone()
    }

    fn get_kademlia_config(&self) -> KademliaConfig {
        self.config
    }

    fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    fn local_has_ipv4(&self) -> bool {
        self.local_has_ipv4
    }

    fn get_active_nodes(&self) -> Vec<SocketAddr> {
        self.active_nodes.clone()
    }

    fn get_pool_config(&self) -> PoolConfig {
        self.pool_config
    }
}

#[cfg(feature = "network")]
mod toml_config {
    use super::*;
    use crate::domain::identity::IpAddr;
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;

    #[derive(Debug, Deserialize)]
    struct ConfigFile {
        #[serde(default)]
        bootstrap: BootstrapConfig,
        #[serde(default)]
        dns_tree: DnsTreeConfig,
        #[serde(default)]
        kademlia: KademliaConfigFile,
        #[serde(default)]
        connection_pool: ConnectionPoolConfigFile,
    }

    #[derive(Debug, Deserialize, Default)]
    struct BootstrapConfig {
        #[serde(default)]
        nodes: Vec<String>,
        #[serde(default)]
        active_nodes: Vec<String>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct DnsTreeConfig {
        #[serde(default)]
        urls: Vec<String>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct KademliaConfigFile {
        local_network_id: Option<u64>,
        alpha: Option<usize>,
        discover_cycle_ms: Option<u64>,
        max_loop_num: Option<u64>,
        max_steps: Option<u32>,
        wait_time_ms: Option<u64>,
        handler_map_soft_cap: Option<usize>,
        handler_map_hard_cap: Option<usize>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct ConnectionPoolConfigFile {
        min_connections: Option<usize>,
        min_active_connections: Option<usize>,
        max_connections: Option<usize>,
        max_connections_with_same_ip: Option<usize>,
        disconnection_policy_enabled: Option<bool>,
    }

    /// TOML-based configuration provider.
    ///
    /// ```toml
    /// [bootstrap]
    /// nodes = ["192.168.1.100:30303"]
    ///
    /// [dns_tree]
    /// urls = ["tree://AKA3AM6LPBYEUDMVNU3BSVQJ5AD45Y7YPOHJLEF6W26QOE4VTUDPE@nodes.example.org"]
    ///
    /// [kademlia]
    /// alpha = 3
    /// discover_cycle_ms = 7200
    /// ```
    pub struct TomlConfigProvider {
        bootstrap_nodes: Vec<SocketAddr>,
        active_nodes: Vec<SocketAddr>,
        dns_tree_urls: Vec<String>,
        config: KademliaConfig,
        pool_config: PoolConfig,
        local_node_id: NodeId,
        local_has_ipv4: bool,
    }

    impl TomlConfigProvider {
        pub fn load<P: AsRef<Path>>(path: P, local_node_id: NodeId) -> Result<Self, ConfigError> {
            let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
                path: path.as_ref().display().to_string(),
                error: e.to_string(),
            })?;
            Self::parse(&content, local_node_id)
        }

        pub fn parse(content: &str, local_node_id: NodeId) -> Result<Self, ConfigError> {
            let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

            let bootstrap_nodes = file
                .bootstrap
                .nodes
                .iter()
                .filter_map(|s| Self::parse_socket_addr(s))
                .collect();
            let active_nodes = file
                .bootstrap
                .active_nodes
                .iter()
                .filter_map(|s| Self::parse_socket_addr(s))
                .collect();

            let kc = file.kademlia;
            let defaults = KademliaConfig::default();
            let config = KademliaConfig {
                local_network_id: kc.local_network_id.unwrap_or(defaults.local_network_id),
                alpha: kc.alpha.unwrap_or(defaults.alpha),
                discover_cycle_ms: kc.discover_cycle_ms.unwrap_or(defaults.discover_cycle_ms),
                max_loop_num: kc.max_loop_num.unwrap_or(defaults.max_loop_num),
                max_steps: kc.max_steps.unwrap_or(defaults.max_steps),
                wait_time_ms: kc.wait_time_ms.unwrap_or(defaults.wait_time_ms),
                handler_map_soft_cap: kc.handler_map_soft_cap.unwrap_or(defaults.handler_map_soft_cap),
                handler_map_hard_cap: kc.handler_map_hard_cap.unwrap_or(defaults.handler_map_hard_cap),
            };

            let cp = file.connection_pool;
            let pool_defaults = PoolConfig::default();
            let pool_config = PoolConfig {
                limits: crate::domain::connection_pool::PoolLimits {
                    min_connections: cp.min_connections.unwrap_or(pool_defaults.limits.min_connections),
                    min_active_connections: cp
                        .min_active_connections
                        .unwrap_or(pool_defaults.limits.min_active_connections),
                    max_connections: cp.max_connections.unwrap_or(pool_defaults.limits.max_connections),
                    max_connections_with_same_ip: cp
                        .max_connections_with_same_ip
                        .unwrap_or(pool_defaults.limits.max_connections_with_same_ip),
                },
                disconnection_policy_enabled: cp
                    .disconnection_policy_enabled
                    .unwrap_or(pool_defaults.disconnection_policy_enabled),
            };

            Ok(Self {
                bootstrap_nodes,
                active_nodes,
                dns_tree_urls: file.dns_tree.urls,
                config,
                pool_config,
                local_node_id,
                local_has_ipv4: true,
            })
        }

        fn parse_socket_addr(s: &str) -> Option<SocketAddr> {
            let std_addr: std::net::SocketAddr = s.parse().ok()?;
            let ip = match std_addr.ip() {
                std::net::IpAddr::V4(v4) => IpAddr::V4(v4.octets()),
                std::net::IpAddr::V6(v6) => IpAddr::V6(v6.octets()),
            };
            Some(SocketAddr::new(ip, std_addr.port()))
        }
    }

    impl ConfigProvider for TomlConfigProvider {
        fn get_bootstrap_nodes(&self) -> Vec<SocketAddr> {
            self.bootstrap_nodes.clone()
        }

        fn get_dns_tree_urls(&self) -> Vec<String> {
            self.dns_tree_urls.clone()
        }

        fn get_kademlia_config(&self) -> KademliaConfig {
            self.config
        }

        fn local_node_id(&self) -> NodeId {
            self.local_node_id
        }

        fn local_has_ipv4(&self) -> bool {
            self.local_has_ipv4
        }

        fn get_active_nodes(&self) -> Vec<SocketAddr> {
            self.active_nodes.clone()
        }

        fn get_pool_config(&self) -> PoolConfig {
            self.pool_config
        }
    }

    #[derive(Debug, Clone)]
    pub enum ConfigError {
        Io { path: String, error: String },
        Parse(String),
    }

    impl std::fmt::Display for ConfigError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Io { path, error } => write!(f, "failed to read {path}: {error}"),
                Self::Parse(e) => write!(f, "failed to parse config: {e}"),
            }
        }
    }

    impl std::error::Error for ConfigError {}
}

#[cfg(feature = "network")]
pub use toml_config::{ConfigError, TomlConfigProvider};
