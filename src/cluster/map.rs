use super::partitioner::PartitionManager;
use super::protocol::*;
use super::transport::{get_with_retry, post_json_with_retry, RetryPolicy};
use crate::membership::{service::MembershipService, types::NodeId};

use anyhow::Result;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const HOP_TIMEOUT: Duration = Duration::from_millis(500);
const BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Sharded, replicated in-memory map.
///
/// Entries live in the partition derived from their key. The partition's
/// primary owner coordinates writes and pushes copies to its backups; reads
/// prefer local data, then the primary, then any backup. Several maps share
/// one HTTP server by nesting their endpoints under distinct base paths.
pub struct DistributedMap<K, V> {
    local_data: Arc<DashMap<u32, DashMap<K, V>>>,
    processed_ops: Arc<DashMap<String, u64>>,
    membership: Arc<MembershipService>,
    partitioner: Arc<PartitionManager>,
    http_client: reqwest::Client,
    base_path: String,
}

impl<K, V> DistributedMap<K, V>
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        membership: Arc<MembershipService>,
        partitioner: Arc<PartitionManager>,
        base_path: &str,
    ) -> Self {
        let cleaned = base_path.trim_end_matches('/');
        let base_path = if cleaned.is_empty() {
            String::new()
        } else if cleaned.starts_with('/') {
            cleaned.to_string()
        } else {
            format!("/{}", cleaned)
        };

        Self {
            local_data: Arc::new(DashMap::new()),
            processed_ops: Arc::new(DashMap::new()),
            membership,
            partitioner,
            http_client: reqwest::Client::new(),
            base_path,
        }
    }

    pub fn partitioner(&self) -> &Arc<PartitionManager> {
        &self.partitioner
    }

    pub fn local_node_id(&self) -> NodeId {
        self.membership.local_node.id.clone()
    }

    /// Idempotency gate for replayed operations. The table is bounded by a
    /// coarse flush once it grows past a threshold.
    fn should_process(&self, op_id: &str) -> bool {
        if self.processed_ops.contains_key(op_id) {
            return false;
        }
        if self.processed_ops.len() > 10_000 {
            self.processed_ops.clear();
        }
        self.processed_ops.insert(op_id.to_string(), now_ms());
        true
    }

    // --- local storage primitives ---

    pub fn store_local(&self, partition: u32, key: K, value: V) {
        self.local_data
            .entry(partition)
            .or_insert_with(DashMap::new)
            .insert(key, value);
    }

    pub fn get_local(&self, key: &K) -> Option<V> {
        let partition = self.partitioner.get_partition(&key.to_string());
        self.local_data
            .get(&partition)
            .and_then(|map| map.get(key).map(|v| v.clone()))
    }

    pub fn remove_local(&self, key: &K) -> Option<V> {
        let partition = self.partitioner.get_partition(&key.to_string());
        self.local_data
            .get(&partition)
            .and_then(|map| map.remove(key).map(|(_, v)| v))
    }

    pub fn local_keys(&self) -> Vec<K> {
        self.local_data
            .iter()
            .flat_map(|p| p.value().iter().map(|e| e.key().clone()).collect::<Vec<_>>())
            .collect()
    }

    pub fn clear_local(&self) {
        self.local_data.clear();
        self.processed_ops.clear();
    }

    pub fn local_partition_count(&self) -> usize {
        self.local_data.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.local_data.iter().map(|e| e.value().len()).sum()
    }

    pub fn has_partition(&self, partition: u32) -> bool {
        self.local_data
            .get(&partition)
            .map(|map| !map.is_empty())
            .unwrap_or(false)
    }

    pub fn dump_partition(&self, partition: u32) -> Vec<(K, V)> {
        self.local_data
            .get(&partition)
            .map(|map| {
                map.iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn apply_partition_entries(&self, partition: u32, entries: Vec<(K, V)>) {
        for (key, value) in entries {
            self.store_local(partition, key, value);
        }
    }

    // --- replicated write path ---

    pub async fn put(&self, key: K, value: V) -> Result<()> {
        self.put_with_op(key, value, Uuid::new_v4().to_string()).await
    }

    pub async fn put_with_op(&self, key: K, value: V, op_id: String) -> Result<()> {
        if !self.should_process(&op_id) {
            return Ok(());
        }
        let partition = self.partitioner.get_partition(&key.to_string());
        let owners = self.partitioner.get_owners(partition);

        if owners.is_empty() {
            tracing::warn!("No alive nodes, storing locally as fallback");
            self.store_local(partition, key, value);
            return Ok(());
        }

        if self.membership.local_node.id == owners[0] {
            self.store_local(partition, key.clone(), value.clone());
            for backup in owners.iter().skip(1) {
                self.replicate_to_backup(backup, partition, &op_id, &key, &value)
                    .await?;
            }
        } else {
            self.forward_put(&owners[0], partition, op_id, key, value)
                .await?;
        }

        Ok(())
    }

    /// Entry point for writes that already reached the primary (forwarded or
    /// public). Stores locally and pushes to backups.
    pub async fn store_as_primary(
        &self,
        partition: u32,
        op_id: String,
        key: K,
        value: V,
    ) -> Result<()> {
        if !self.should_process(&op_id) {
            return Ok(());
        }
        self.store_local(partition, key.clone(), value.clone());

        let owners = self.partitioner.get_owners(partition);
        for backup in owners.iter().skip(1) {
            self.replicate_to_backup(backup, partition, &op_id, &key, &value)
                .await?;
        }
        Ok(())
    }

    /// Backup-side write. Never triggers further replication.
    pub fn store_replica(&self, partition: u32, op_id: String, key: K, value: V) -> Result<()> {
        if !self.should_process(&op_id) {
            return Ok(());
        }
        self.store_local(partition, key, value);
        Ok(())
    }

    async fn forward_put(
        &self,
        primary: &NodeId,
        partition: u32,
        op_id: String,
        key: K,
        value: V,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(primary)
            .ok_or_else(|| anyhow::anyhow!("primary node not found: {:?}", primary))?;

        let payload = ForwardPutRequest {
            partition,
            op_id,
            key: key.to_string(),
            value_json: serde_json::to_string(&value)?,
        };
        let url = format!(
            "http://{}{}{}",
            node.http_addr, self.base_path, ENDPOINT_FORWARD_PUT
        );
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("forward put failed: {}", response.status()));
        }
        Ok(())
    }

    async fn replicate_to_backup(
        &self,
        backup: &NodeId,
        partition: u32,
        op_id: &str,
        key: &K,
        value: &V,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(backup)
            .ok_or_else(|| anyhow::anyhow!("backup node not found: {:?}", backup))?;

        let payload = ReplicateRequest {
            partition,
            op_id: op_id.to_string(),
            key: key.to_string(),
            value_json: serde_json::to_string(value)?,
        };
        let url = format!(
            "http://{}{}{}",
            node.http_addr, self.base_path, ENDPOINT_REPLICATE
        );
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("replication failed: {}", response.status()));
        }
        Ok(())
    }

    // --- read path ---

    pub async fn get(&self, key: &K) -> Option<V> {
        if let Some(value) = self.get_local(key) {
            return Some(value);
        }

        let partition = self.partitioner.get_partition(&key.to_string());
        let owners = self.partitioner.get_owners(partition);
        if owners.is_empty() {
            tracing::warn!("GET: no alive nodes to fetch from");
            return None;
        }

        let local_id = &self.membership.local_node.id;
        let candidates: Vec<&NodeId> = owners.iter().filter(|id| *id != local_id).collect();

        for owner in candidates {
            match self.fetch_remote(owner, key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("GET: fetch from {:?} failed: {}", owner, e);
                    continue;
                }
            }
        }
        None
    }

    pub async fn fetch_remote(&self, owner: &NodeId, key: &K) -> Result<Option<V>> {
        let node = self
            .membership
            .get_member(owner)
            .ok_or_else(|| anyhow::anyhow!("owner node not found: {:?}", owner))?;

        let url = format!(
            "http://{}{}{}/{}",
            node.http_addr,
            self.base_path,
            ENDPOINT_GET_INTERNAL,
            key.to_string()
        );
        let response = get_with_retry(
            &self.http_client,
            &url,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("GET request failed: {}", response.status()));
        }

        let get_response: GetResponse = response.json().await?;
        match get_response.value_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // --- batched operations ---

    /// Fetches many keys with at most one request per owning node.
    ///
    /// Keys that exist locally are served from memory; the rest are grouped
    /// by primary owner. Missing keys are simply absent from the result.
    pub async fn get_batch(&self, keys: &[K]) -> HashMap<K, V> {
        let mut found: HashMap<K, V> = HashMap::new();
        let mut by_owner: HashMap<NodeId, Vec<K>> = HashMap::new();
        let local_id = self.membership.local_node.id.clone();

        for key in keys {
            if let Some(value) = self.get_local(key) {
                found.insert(key.clone(), value);
                continue;
            }
            let partition = self.partitioner.get_partition(&key.to_string());
            let owners = self.partitioner.get_owners(partition);
            match owners.first() {
                // We are the primary and hold nothing: the key does not exist.
                Some(primary) if *primary == local_id => continue,
                Some(primary) => by_owner
                    .entry(primary.clone())
                    .or_default()
                    .push(key.clone()),
                None => continue,
            }
        }

        for (owner, owner_keys) in by_owner {
            match self.fetch_batch_remote(&owner, &owner_keys).await {
                Ok(entries) => found.extend(entries),
                Err(e) => {
                    tracing::warn!("Batch fetch from {:?} failed: {}", owner, e);
                }
            }
        }
        found
    }

    async fn fetch_batch_remote(&self, owner: &NodeId, keys: &[K]) -> Result<Vec<(K, V)>> {
        let node = self
            .membership
            .get_member(owner)
            .ok_or_else(|| anyhow::anyhow!("owner node not found: {:?}", owner))?;

        let payload = BatchGetRequest {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        };
        let url = format!(
            "http://{}{}{}",
            node.http_addr, self.base_path, ENDPOINT_GET_BATCH
        );
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            BATCH_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("batch get failed: {}", response.status()));
        }

        let batch: BatchGetResponse = response.json().await?;
        let mut entries = Vec::with_capacity(batch.entries.len());
        for item in batch.entries {
            let key: K = item
                .key
                .parse()
                .map_err(|e: <K as FromStr>::Err| anyhow::anyhow!(e.to_string()))?;
            let value: V = serde_json::from_str(&item.value_json)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Writes many entries, coalescing per owning node: entries we own are
    /// stored and replicated as a batch, the rest travel in one forwarded
    /// request per primary.
    pub async fn put_batch(&self, entries: HashMap<K, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let op_id = Uuid::new_v4().to_string();
        let local_id = self.membership.local_node.id.clone();

        let mut mine: Vec<(u32, K, V)> = Vec::new();
        let mut forwarded: HashMap<NodeId, Vec<KeyValueJson>> = HashMap::new();

        for (key, value) in entries {
            let partition = self.partitioner.get_partition(&key.to_string());
            let owners = self.partitioner.get_owners(partition);
            match owners.first() {
                Some(primary) if *primary == local_id => mine.push((partition, key, value)),
                Some(primary) => forwarded.entry(primary.clone()).or_default().push(
                    KeyValueJson {
                        key: key.to_string(),
                        value_json: serde_json::to_string(&value)?,
                    },
                ),
                // No alive owners: keep the write locally so it is not lost.
                None => mine.push((partition, key, value)),
            }
        }

        if !mine.is_empty() {
            self.store_batch_as_primary(mine, &op_id).await?;
        }
        for (owner, batch) in forwarded {
            self.forward_put_batch(&owner, batch, &op_id).await?;
        }
        Ok(())
    }

    /// Stores a batch this node owns and synchronously replicates each entry
    /// to the backups of its partition, one request per backup node.
    pub async fn store_batch_as_primary(
        &self,
        entries: Vec<(u32, K, V)>,
        op_id: &str,
    ) -> Result<()> {
        let mut per_backup: HashMap<NodeId, Vec<PartitionedEntry>> = HashMap::new();

        for (partition, key, value) in &entries {
            for backup in self.partitioner.get_owners(*partition).into_iter().skip(1) {
                per_backup
                    .entry(backup)
                    .or_default()
                    .push(PartitionedEntry {
                        partition: *partition,
                        key: key.to_string(),
                        value_json: serde_json::to_string(value)?,
                    });
            }
        }

        for (partition, key, value) in entries {
            self.store_local(partition, key, value);
        }

        for (backup, batch) in per_backup {
            if let Err(e) = self.replicate_batch_to_backup(&backup, batch, op_id).await {
                tracing::warn!("Batch replication to {:?} failed: {}", backup, e);
            }
        }
        Ok(())
    }

    async fn forward_put_batch(
        &self,
        primary: &NodeId,
        entries: Vec<KeyValueJson>,
        op_id: &str,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(primary)
            .ok_or_else(|| anyhow::anyhow!("primary node not found: {:?}", primary))?;

        let payload = BatchPutRequest {
            op_id: format!("{}:{:?}", op_id, primary),
            entries,
        };
        let url = format!(
            "http://{}{}{}",
            node.http_addr, self.base_path, ENDPOINT_PUT_BATCH
        );
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            BATCH_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("batch put failed: {}", response.status()));
        }
        Ok(())
    }

    async fn replicate_batch_to_backup(
        &self,
        backup: &NodeId,
        entries: Vec<PartitionedEntry>,
        op_id: &str,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(backup)
            .ok_or_else(|| anyhow::anyhow!("backup node not found: {:?}", backup))?;

        let payload = ReplicateBatchRequest {
            op_id: format!("{}:{:?}", op_id, backup),
            entries,
        };
        let url = format!(
            "http://{}{}{}",
            node.http_addr, self.base_path, ENDPOINT_REPLICATE_BATCH
        );
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            BATCH_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "batch replication failed: {}",
                response.status()
            ));
        }
        Ok(())
    }

    /// Backup-side batch write.
    pub fn store_replica_batch(&self, op_id: String, entries: Vec<(u32, K, V)>) -> Result<()> {
        if !self.should_process(&op_id) {
            return Ok(());
        }
        for (partition, key, value) in entries {
            self.store_local(partition, key, value);
        }
        Ok(())
    }

    /// Primary-side batch write for forwarded requests.
    pub async fn store_batch_forwarded(
        &self,
        op_id: String,
        entries: Vec<(K, V)>,
    ) -> Result<usize> {
        if !self.should_process(&op_id) {
            return Ok(0);
        }
        let partitioned: Vec<(u32, K, V)> = entries
            .into_iter()
            .map(|(k, v)| (self.partitioner.get_partition(&k.to_string()), k, v))
            .collect();
        let count = partitioned.len();
        self.store_batch_as_primary(partitioned, &op_id).await?;
        Ok(count)
    }

    // --- anti-entropy ---

    pub async fn fetch_partition(&self, owner: &NodeId, partition: u32) -> Result<Vec<(K, V)>> {
        let node = self
            .membership
            .get_member(owner)
            .ok_or_else(|| anyhow::anyhow!("owner node not found: {:?}", owner))?;

        let url = format!(
            "http://{}{}{}/{}",
            node.http_addr, self.base_path, ENDPOINT_PARTITION_DUMP, partition
        );
        let response = get_with_retry(
            &self.http_client,
            &url,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("partition dump failed: {}", response.status()));
        }

        let dump: PartitionDumpResponse = response.json().await?;
        let mut entries = Vec::with_capacity(dump.entries.len());
        for item in dump.entries {
            let key: K = item
                .key
                .parse()
                .map_err(|e: <K as FromStr>::Err| anyhow::anyhow!(e.to_string()))?;
            let value: V = serde_json::from_str(&item.value_json)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// One anti-entropy round: pull any partition this node should hold but
    /// does not, from the best available source.
    pub async fn resync_round(&self, name: &str) {
        let mut target_partitions: Vec<u32> = self.partitioner.my_primary_partitions();
        target_partitions.extend(self.partitioner.my_backup_partitions());

        let local_id = self.local_node_id();

        for partition in target_partitions {
            let owners = self.partitioner.get_owners(partition);
            if owners.is_empty() {
                continue;
            }

            let is_primary = owners[0] == local_id;
            let source = if is_primary {
                if self.has_partition(partition) {
                    continue;
                }
                owners.get(1)
            } else {
                Some(&owners[0])
            };
            let Some(source) = source else { continue };
            if *source == local_id {
                continue;
            }

            match self.fetch_partition(source, partition).await {
                Ok(entries) if !entries.is_empty() => {
                    self.apply_partition_entries(partition, entries);
                    tracing::info!("Resynced {} partition {} from {:?}", name, partition, source);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Resync of {} partition {} from {:?} failed: {}",
                        name,
                        partition,
                        source,
                        e
                    );
                }
            }
        }
    }

    /// Removes every entry cluster-wide: clears locally and asks each alive
    /// peer to clear its local store for this map.
    pub async fn clear(&self) {
        self.clear_local();
        let local_id = self.local_node_id();
        for member in self.membership.get_alive_members() {
            if member.id == local_id {
                continue;
            }
            let url = format!(
                "http://{}{}{}",
                member.http_addr, self.base_path, ENDPOINT_CLEAR
            );
            if let Err(e) = post_json_with_retry(
                &self.http_client,
                &url,
                &serde_json::json!({}),
                HOP_TIMEOUT,
                &RetryPolicy::interconnect(),
            )
            .await
            {
                tracing::warn!("Clear broadcast to {:?} failed: {}", member.id, e);
            }
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
