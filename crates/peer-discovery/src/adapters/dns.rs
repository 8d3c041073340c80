//! DNS TXT resolution for the tree sync client (§4.4).

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use crate::ports::{DnsResolver, NetworkError};

pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    pub fn from_system_config() -> Result<Self, NetworkError> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Ok(Self { resolver })
    }
}

#[async_trait::async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, NetworkError> {
        let lookup = self
            .resolver
            .txt_lookup(name)
            .await
            .map_err(|_| NetworkError::Timeout)?;
        Ok(lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .flat_map(|chunk| chunk.iter().copied())
                    .map(|b| b as char)
                    .collect::<String>()
            })
            .collect())
    }
}

/// Fixed responses for tests that exercise DNS-tree sync without a
/// network.
#[derive(Debug, Clone, Default)]
pub struct StaticDnsResolver {
    pub records: std::collections::HashMap<String, Vec<String>>,
}

#[async_trait::async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, NetworkError> {
        self.records.get(name).cloned().ok_or(NetworkError::Timeout)
    }
}
