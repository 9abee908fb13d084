//! Node configuration.
//!
//! Values resolve in order: environment variable (key uppercased, dots and
//! dashes replaced with underscores), then a `cluster.properties`-style
//! key=value file, then the built-in default. Only unrecoverable problems
//! (an unparseable bind address, a malformed properties file path that was
//! explicitly configured) abort startup.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_PROPERTIES_FILE: &str = "cluster.properties";

/// Resolved configuration for one cluster node.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Unique identifier for this node.
    pub node_id: String,
    /// UDP bind address for the gossip protocol.
    pub gossip_bind: SocketAddr,
    /// Seed nodes used to join an existing cluster.
    pub seed_nodes: Vec<SocketAddr>,
    /// Base directory of the local datalake partition.
    pub datalake_dir: PathBuf,
    /// Ordered list of peer base URLs for datalake replication.
    pub datalake_peers: Vec<String>,
    /// Total number of copies of each document, including the originator.
    pub replication_factor: usize,
    /// Number of synchronous backup replicas per index partition.
    pub backup_count: usize,
    /// Queue name for indexing requests.
    pub indexing_queue: String,
    /// Queue name for document-ingested notifications.
    pub ingested_queue: String,
    /// Consumer tasks subscribed to the indexing queue on this node.
    pub consumer_count: usize,
    /// Worker tasks in the bulk-ingest pool on this node.
    pub worker_count: usize,
    /// Maximum accepted HTTP body, in bytes.
    pub max_body_bytes: usize,
}

impl ClusterConfig {
    /// Loads configuration for a node bound to `gossip_bind`.
    ///
    /// `seed_nodes` comes from the command line; everything else resolves
    /// through the environment and the optional properties file.
    pub fn load(gossip_bind: SocketAddr, seed_nodes: Vec<SocketAddr>) -> Result<Self> {
        let props = load_properties()?;

        let node_id = get(&props, "node.id", None)
            .unwrap_or_else(|| format!("node-{}", gossip_bind.port()));

        Ok(Self {
            node_id,
            gossip_bind,
            seed_nodes,
            datalake_dir: PathBuf::from(
                get(&props, "datalake.dir", Some("./datalake")).unwrap_or_default(),
            ),
            datalake_peers: get_list(&props, "datalake.peers"),
            replication_factor: get_usize(&props, "datalake.replication.factor", 2),
            backup_count: get_usize(&props, "cluster.backup.count", 1),
            indexing_queue: get(&props, "bus.queue.indexing", Some("index.request"))
                .unwrap_or_default(),
            ingested_queue: get(&props, "bus.queue.ingested", Some("doc.ingested"))
                .unwrap_or_default(),
            consumer_count: get_usize(&props, "indexer.consumers", 2),
            worker_count: get_usize(&props, "workqueue.workers", 4),
            max_body_bytes: get_usize(&props, "http.max.body.bytes", 20 * 1024 * 1024),
        })
    }

    /// HTTP bind address, derived from the gossip port.
    pub fn http_bind(&self) -> SocketAddr {
        SocketAddr::new(self.gossip_bind.ip(), self.gossip_bind.port() + 1000)
    }
}

fn load_properties() -> Result<HashMap<String, String>> {
    let explicit = std::env::var("GUTENSEARCH_CONFIG").ok();
    let path = explicit
        .clone()
        .unwrap_or_else(|| DEFAULT_PROPERTIES_FILE.to_string());

    let mut props = HashMap::new();
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    props.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        Err(e) => {
            // A missing default file is fine; an explicitly configured one must exist.
            if explicit.is_some() {
                return Err(e).context(format!("cannot read configuration file {}", path));
            }
        }
    }
    Ok(props)
}

fn env_key(key: &str) -> String {
    key.to_uppercase().replace(['.', '-'], "_")
}

fn get(props: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_key(key)) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    if let Some(value) = props.get(key) {
        if !value.trim().is_empty() {
            return Some(value.clone());
        }
    }
    default.map(|s| s.to_string())
}

fn get_usize(props: &HashMap<String, String>, key: &str, default: usize) -> usize {
    get(props, key, None)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_list(props: &HashMap<String, String>, key: &str) -> Vec<String> {
    get(props, key, None)
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env_or_file() {
        let bind: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let config = ClusterConfig::load(bind, vec![]).unwrap();

        assert_eq!(config.node_id, "node-5000");
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.backup_count, 1);
        assert_eq!(config.indexing_queue, "index.request");
        assert!(config.datalake_peers.is_empty());
        assert_eq!(config.http_bind().port(), 6000);
    }

    #[test]
    fn env_key_mapping() {
        assert_eq!(env_key("datalake.replication.factor"), "DATALAKE_REPLICATION_FACTOR");
        assert_eq!(env_key("bus.queue.indexing"), "BUS_QUEUE_INDEXING");
    }

    #[test]
    fn list_parsing_trims_and_drops_empty() {
        let mut props = HashMap::new();
        props.insert(
            "datalake.peers".to_string(),
            " http://a:6000 , http://b:6000 ,, ".to_string(),
        );
        let peers = get_list(&props, "datalake.peers");
        assert_eq!(peers, vec!["http://a:6000", "http://b:6000"]);
    }
}
