//! DNS-Tree Sync service: walks configured `tree://` link URLs, verifying
//! and caching the signed node-list tree served over DNS TXT records.
//!
//! Reference: §4.4 (DNS Tree Sync).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::domain::dns_tree::{
    next_step, parse_entry, parse_root, root_signing_payload, ClientTree, NextStep, TreeEntry,
    RECHECK_INTERVAL_SECS,
};
use crate::domain::dns_tree::codec::{base32_decode, entry_hash};
use crate::domain::errors::DnsTreeError;
use crate::domain::identity::Node;
use crate::ports::outbound::{DnsResolver, MetricsSink, RandomSource, TimeSource, Verifier};

const ENTRY_CACHE_CAP: usize = 2_000;

struct ConfiguredTree {
    tree: ClientTree,
    public_key: Vec<u8>,
}

fn parse_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("tree://")?;
    let (pubkey_b32, domain) = rest.split_once('@')?;
    Some((pubkey_b32.to_string(), domain.to_string()))
}

fn select_root_string(records: &[String]) -> Option<&str> {
    records.iter().find_map(|r| r.strip_prefix("tree-root-v1:").map(|_| r.as_str()))
}

fn join_txt_chunks(records: Vec<String>) -> String {
    records.concat()
}

pub struct DnsSyncService {
    trees: Mutex<Vec<ConfiguredTree>>,
    entry_cache: Mutex<LruCache<String, TreeEntry>>,
    resolver: Arc<dyn DnsResolver>,
    verifier: Arc<dyn Verifier>,
    time: Arc<dyn TimeSource>,
    random: Mutex<Box<dyn RandomSource + Send>>,
    metrics: Arc<dyn MetricsSink>,
    closed: AtomicBool,
    recheck_task: Mutex<Option<JoinHandle<()>>>,
}

impl DnsSyncService {
    pub fn new(
        urls: Vec<String>,
        resolver: Arc<dyn DnsResolver>,
        verifier: Arc<dyn Verifier>,
        time: Arc<dyn TimeSource>,
        random: Box<dyn RandomSource + Send>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let trees = urls
            .into_iter()
            .filter_map(|url| {
                let (pubkey_b32, domain) = parse_url(&url)?;
                let public_key = base32_decode(&pubkey_b32)?;
                Some(ConfiguredTree { tree: ClientTree::new(domain), public_key })
            })
            .collect();
        Self {
            trees: Mutex::new(trees),
            entry_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(ENTRY_CACHE_CAP).unwrap())),
            resolver,
            verifier,
            time,
            random: Mutex::new(random),
            metrics,
            closed: AtomicBool::new(false),
            recheck_task: Mutex::new(None),
        }
    }

    fn now(&self) -> crate::domain::identity::Timestamp {
        self.time.now()
    }

    /// `updateRoot()`: re-fetch and verify the root for tree `index`,
    /// folding in the apply_root subtree-reinitialization logic.
    async fn update_root(&self, index: usize) -> Result<(bool, bool), DnsTreeError> {
        let (domain, public_key) = {
            let trees = self.trees.lock().unwrap();
            let entry = trees.get(index).ok_or(DnsTreeError::InvalidRoot)?;
            (entry.tree.url_domain.clone(), entry.public_key.clone())
        };
        let records = self.resolver.lookup_txt(&domain).await.map_err(|_| DnsTreeError::DnsLookupFailed)?;
        let root_text = select_root_string(&records).ok_or(DnsTreeError::InvalidRoot)?.to_string();
        let root = parse_root(&root_text)?;
        let payload = root_signing_payload(&root.e_root, &root.l_root, root.seq);
        let digest = self.verifier.sha256(&payload);
        if !self.verifier.verify(&digest, &root.signature, &public_key) {
            return Err(DnsTreeError::SignatureInvalid);
        }
        let now = self.now();
        let mut trees = self.trees.lock().unwrap();
        let entry = trees.get_mut(index).ok_or(DnsTreeError::InvalidRoot)?;
        Ok(entry.tree.apply_root(root, now))
    }

    /// Resolve one hash under `domain`, validating its content hash and
    /// caching the parsed entry.
    async fn resolve_entry(&self, domain: &str, hash: &str) -> Result<TreeEntry, DnsTreeError> {
        if let Some(cached) = self.entry_cache.lock().unwrap().get(hash) {
            return Ok(cached.clone());
        }
        let name = format!("{hash}.{domain}");
        let records = self.resolver.lookup_txt(&name).await.map_err(|_| DnsTreeError::DnsLookupFailed)?;
        let text = join_txt_chunks(records);
        let entry = parse_entry(&text)?;
        if entry_hash(&text) != hash {
            return Err(DnsTreeError::HashMismatch);
        }
        self.entry_cache.lock().unwrap().put(hash.to_string(), entry.clone());
        Ok(entry)
    }

    /// `syncAll()`: BFS-resolve every outstanding hash in both subtrees of
    /// every configured tree, then `gcLinks()` any that finished their link
    /// subtree this round.
    pub async fn sync_all(&self) {
        let count = self.trees.lock().unwrap().len();
        for index in 0..count {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if self.update_root(index).await.is_err() {
                self.metrics.incr("dns_sync.root_failed", 1);
                continue;
            }
            self.sync_subtrees(index).await;
        }
    }

    async fn sync_subtrees(&self, index: usize) {
        let domain = {
            let trees = self.trees.lock().unwrap();
            trees[index].tree.url_domain.clone()
        };
        loop {
            let next = {
                let trees = self.trees.lock().unwrap();
                trees[index].tree.link_sync.next_missing().map(str::to_string)
            };
            let Some(hash) = next else { break };
            match self.resolve_entry(&domain, &hash).await {
                Ok(entry) => {
                    let mut trees = self.trees.lock().unwrap();
                    // A kind-constraint violation is fatal for this subtree
                    // (§4.4/§7): stop walking `missing` rather than skip past it.
                    if trees[index].tree.link_sync.resolve(&hash, &entry).is_err() {
                        break;
                    }
                    if let TreeEntry::Link(link) = &entry {
                        trees[index].tree.current_link_urls.insert(link.domain.clone());
                        trees[index].tree.link_cache.add_edge(&domain, &link.domain);
                    }
                }
                Err(_) => {
                    let mut trees = self.trees.lock().unwrap();
                    trees[index].tree.link_sync.pop_missing();
                    break;
                }
            }
        }
        let link_complete = self.trees.lock().unwrap()[index].tree.link_sync.is_complete();
        if link_complete {
            let mut trees = self.trees.lock().unwrap();
            trees[index].tree.link_cache.gc(&domain);
        }
        loop {
            let next = {
                let trees = self.trees.lock().unwrap();
                trees[index].tree.nodes_sync.next_missing().map(str::to_string)
            };
            let Some(hash) = next else { break };
            match self.resolve_entry(&domain, &hash).await {
                Ok(entry) => {
                    let mut trees = self.trees.lock().unwrap();
                    // Same fatal-abort rule as the link subtree above.
                    if trees[index].tree.nodes_sync.resolve(&hash, &entry).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    let mut trees = self.trees.lock().unwrap();
                    trees[index].tree.nodes_sync.pop_missing();
                    break;
                }
            }
        }
    }

    /// `RandomIterator.next()`: pick a client tree uniformly at random and
    /// surface a single random node, chasing branches/links/restarts as
    /// needed up to `RANDOM_RETRY_TIMES`.
    pub async fn random_node(&self) -> Option<Node> {
        for _ in 0..crate::domain::dns_tree::RANDOM_RETRY_TIMES {
            let step = {
                let trees = self.trees.lock().unwrap();
                let views: Vec<ClientTree> = trees.iter().map(|t| t.tree.clone()).collect();
                let mut random = self.random.lock().unwrap();
                next_step(&views, &mut **random)
            };
            match step {
                NextStep::NoTrees | NextStep::LinkTreeIncomplete => return None,
                NextStep::RestartNodeSubtree { tree_index, e_root } => {
                    let mut trees = self.trees.lock().unwrap();
                    trees[tree_index].tree.nodes_sync.reinit(e_root);
                }
                NextStep::FetchHash { tree_index, hash } => {
                    let domain = self.trees.lock().unwrap()[tree_index].tree.url_domain.clone();
                    if let Ok(TreeEntry::Nodes(nodes_entry)) = self.resolve_entry(&domain, &hash).await {
                        if nodes_entry.nodes.is_empty() {
                            continue;
                        }
                        let idx = self.random.lock().unwrap().next_below(nodes_entry.nodes.len());
                        return nodes_entry.nodes.get(idx).cloned();
                    }
                }
            }
        }
        None
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.recheck_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Background recheck: re-runs `sync_all` every `recheckInterval`.
    pub fn start_recheck_loop(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if service.closed.load(Ordering::SeqCst) {
                    break;
                }
                service.sync_all().await;
                tokio::time::sleep(Duration::from_secs(RECHECK_INTERVAL_SECS)).await;
            }
        });
        *self.recheck_task.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dns::StaticDnsResolver;
    use crate::adapters::security::OsRandomSource;
    use crate::adapters::network::SystemTimeSource;
    use crate::adapters::TracingMetricsSink;
    use crate::domain::identity::{IpAddr, NodeId, Timestamp, NODE_ID_LEN};
    use k256::ecdsa::{SigningKey, VerifyingKey};

    struct FixedVerifier;
    impl Verifier for FixedVerifier {
        fn sha256(&self, data: &[u8]) -> [u8; 32] {
            use sha2::{Digest, Sha256};
            Sha256::digest(data).into()
        }
        fn verify(&self, _digest: &[u8; 32], _signature: &[u8; 65], _public_key: &[u8]) -> bool {
            true
        }
    }

    fn node_record() -> String {
        let node = Node::new(NodeId::new([9u8; NODE_ID_LEN]), IpAddr::v4(1, 2, 3, 4), 30303, 1, Timestamp::new(0));
        format!("nodes:{}", crate::domain::dns_tree::codec::encode_node_list(&[node]))
    }

    #[tokio::test]
    async fn resolves_root_and_one_node_leaf() {
        let hash = crate::domain::dns_tree::codec::entry_hash(&node_record());
        let record = crate::domain::dns_tree::codec::encode_root_record(&hash, &hash, 1, &[0u8; 65]);
        let root_text = format!("tree-root-v1:{record}");
        let mut records = std::collections::HashMap::new();
        records.insert("example.org".to_string(), vec![root_text]);
        records.insert(format!("{hash}.example.org"), vec![node_record()]);

        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let verifying_key = VerifyingKey::from(&signing_key);
        let pubkey_b32 = crate::domain::dns_tree::codec::base32_encode(verifying_key.to_encoded_point(true).as_bytes());
        let url = format!("tree://{pubkey_b32}@example.org");

        let service = DnsSyncService::new(
            vec![url],
            Arc::new(StaticDnsResolver { records }),
            Arc::new(FixedVerifier),
            Arc::new(SystemTimeSource::new()),
            Box::new(OsRandomSource::new()),
            Arc::new(TracingMetricsSink),
        );
        service.sync_all().await;
        let node = service.random_node().await;
        assert!(node.is_some());
    }

    #[tokio::test]
    async fn unparseable_url_is_skipped_without_panicking() {
        let service = DnsSyncService::new(
            vec!["not-a-tree-url".to_string()],
            Arc::new(StaticDnsResolver::default()),
            Arc::new(FixedVerifier),
            Arc::new(SystemTimeSource::new()),
            Box::new(OsRandomSource::new()),
            Arc::new(TracingMetricsSink),
        );
        service.sync_all().await;
        assert!(service.random_node().await.is_none());
    }
}
