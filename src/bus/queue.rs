use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::types::{DeliveryState, MessageHeaders, QueueMessage};
use crate::cluster::map::now_ms;
use crate::cluster::partitioner::PartitionManager;
use crate::cluster::transport::{get_with_retry, post_json_with_retry, RetryPolicy};
use crate::membership::{service::MembershipService, types::NodeId};

/// How long a claimed message stays invisible before it is redelivered.
const LEASE_MS: u64 = 30_000;
const HOP_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENDPOINT_FORWARD_PUBLISH: &str = "/internal/publish";
pub const ENDPOINT_REPLICATE: &str = "/internal/replicate";
pub const ENDPOINT_ACK: &str = "/internal/ack";
pub const ENDPOINT_PURGE: &str = "/internal/purge";
pub const ENDPOINT_PARTITION_DUMP: &str = "/internal/partition";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ForwardPublishRequest {
    pub partition: u32,
    pub message: QueueMessage,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ReplicateMessageRequest {
    pub partition: u32,
    pub message: QueueMessage,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct AckRequest {
    pub message_id: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MessageDumpResponse {
    pub partition: u32,
    pub messages: Vec<QueueMessage>,
}

/// Partitioned, replicated message store.
///
/// Messages are routed by a stable hash of their id; the partition primary
/// stores each message and pushes a copy to its backups before the publish
/// returns. Consumers only ever claim from partitions their node currently
/// owns as primary, so each message has exactly one live claimant while its
/// lease holds. If the primary dies, a promoted backup redelivers its copy;
/// idempotent consumers absorb the duplicate.
pub struct DurableQueue {
    local_messages: Arc<DashMap<u32, DashMap<String, QueueMessage>>>,
    membership: Arc<MembershipService>,
    partitioner: Arc<PartitionManager>,
    http_client: reqwest::Client,
}

impl DurableQueue {
    pub fn new(membership: Arc<MembershipService>, partitioner: Arc<PartitionManager>) -> Arc<Self> {
        Arc::new(Self {
            local_messages: Arc::new(DashMap::new()),
            membership,
            partitioner,
            http_client: reqwest::Client::new(),
        })
    }

    /// Publishes a message to a logical queue. Returns the message id once
    /// the message is durably stored (locally plus synchronous backups).
    pub async fn publish(
        &self,
        queue: &str,
        headers: MessageHeaders,
        payload: serde_json::Value,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let message = QueueMessage {
            id: id.clone(),
            queue: queue.to_string(),
            headers,
            payload,
            enqueued_at: now_ms(),
            attempts: 0,
            state: DeliveryState::Pending,
            lease_expires: None,
        };

        let partition = self.partitioner.get_partition(&id);
        let owners = self.partitioner.get_owners(partition);

        if owners.is_empty() {
            tracing::warn!("No alive nodes, storing message locally");
            self.store_local(partition, message);
            return Ok(id);
        }

        if owners[0] == self.membership.local_node.id {
            self.store_as_primary(partition, message).await?;
        } else {
            self.forward_publish(&owners[0], partition, message).await?;
        }
        Ok(id)
    }

    pub fn store_local(&self, partition: u32, message: QueueMessage) {
        self.local_messages
            .entry(partition)
            .or_insert_with(DashMap::new)
            .insert(message.id.clone(), message);
    }

    /// Stores a message this node owns and copies it to the partition's
    /// backups. Presence of the message id makes replays harmless.
    pub async fn store_as_primary(&self, partition: u32, message: QueueMessage) -> Result<()> {
        self.store_local(partition, message.clone());

        for backup in self.partitioner.get_owners(partition).into_iter().skip(1) {
            if let Err(e) = self.replicate_to_backup(&backup, partition, &message).await {
                tracing::warn!("Message replication to {:?} failed: {}", backup, e);
            }
        }
        Ok(())
    }

    async fn forward_publish(
        &self,
        primary: &NodeId,
        partition: u32,
        message: QueueMessage,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(primary)
            .ok_or_else(|| anyhow::anyhow!("primary node not found: {:?}", primary))?;

        let payload = ForwardPublishRequest { partition, message };
        let url = format!("http://{}/bus{}", node.http_addr, ENDPOINT_FORWARD_PUBLISH);
        // Broker-grade policy: a restarting owner is worth waiting for.
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            HOP_TIMEOUT,
            &RetryPolicy::broker(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("forwarded publish failed: {}", response.status()));
        }
        Ok(())
    }

    async fn replicate_to_backup(
        &self,
        backup: &NodeId,
        partition: u32,
        message: &QueueMessage,
    ) -> Result<()> {
        let node = self
            .membership
            .get_member(backup)
            .ok_or_else(|| anyhow::anyhow!("backup node not found: {:?}", backup))?;

        let payload = ReplicateMessageRequest { partition, message: message.clone() };
        let url = format!("http://{}/bus{}", node.http_addr, ENDPOINT_REPLICATE);
        let response = post_json_with_retry(
            &self.http_client,
            &url,
            &payload,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("message replication failed: {}", response.status()));
        }
        Ok(())
    }

    /// Backup-side store. Never re-replicates.
    pub fn store_replica(&self, partition: u32, message: QueueMessage) {
        self.local_messages
            .entry(partition)
            .or_insert_with(DashMap::new)
            .entry(message.id.clone())
            .or_insert(message);
    }

    /// Claims the oldest deliverable message of `queue` from the partitions
    /// this node currently owns. Pending messages and in-flight messages
    /// whose lease expired are both deliverable.
    pub fn claim_next(&self, queue: &str) -> Option<QueueMessage> {
        let now = now_ms();
        let mut candidates: Vec<(u64, u32, String)> = Vec::new();

        for partition in self.partitioner.my_primary_partitions() {
            let Some(messages) = self.local_messages.get(&partition) else { continue };
            for entry in messages.iter() {
                let message = entry.value();
                if message.queue == queue && is_deliverable(message, now) {
                    candidates.push((message.enqueued_at, partition, message.id.clone()));
                }
            }
        }

        candidates.sort();
        for (_, partition, id) in candidates {
            if let Some(claimed) = self.try_claim(partition, &id, now) {
                return Some(claimed);
            }
        }
        None
    }

    fn try_claim(&self, partition: u32, id: &str, now: u64) -> Option<QueueMessage> {
        let messages = self.local_messages.get(&partition)?;
        let mut entry = messages.get_mut(id)?;
        if !is_deliverable(&entry, now) {
            return None;
        }
        entry.state = DeliveryState::InFlight;
        entry.lease_expires = Some(now + LEASE_MS);
        entry.attempts += 1;
        Some(entry.clone())
    }

    /// Acknowledges a message: removes it locally and asks the partition's
    /// backups to drop their copies (best-effort; a missed ack only costs a
    /// redelivery after failover).
    pub async fn ack(&self, message_id: &str) {
        let partition = self.partitioner.get_partition(message_id);
        if let Some(messages) = self.local_messages.get(&partition) {
            messages.remove(message_id);
        }

        for backup in self.partitioner.get_owners(partition).into_iter().skip(1) {
            let Some(node) = self.membership.get_member(&backup) else { continue };
            let url = format!("http://{}/bus{}", node.http_addr, ENDPOINT_ACK);
            let payload = AckRequest { message_id: message_id.to_string() };
            if let Err(e) = post_json_with_retry(
                &self.http_client,
                &url,
                &payload,
                HOP_TIMEOUT,
                &RetryPolicy::interconnect(),
            )
            .await
            {
                tracing::debug!("Ack propagation to {:?} failed: {}", backup, e);
            }
        }
    }

    /// Backup-side ack: drop the local copy.
    pub fn ack_local(&self, message_id: &str) {
        let partition = self.partitioner.get_partition(message_id);
        if let Some(messages) = self.local_messages.get(&partition) {
            messages.remove(message_id);
        }
    }

    /// Returns a claimed message to the queue for immediate redelivery.
    /// Used when a handler fails instead of crashing.
    pub fn release(&self, message_id: &str) {
        let partition = self.partitioner.get_partition(message_id);
        if let Some(messages) = self.local_messages.get(&partition) {
            if let Some(mut entry) = messages.get_mut(message_id) {
                entry.state = DeliveryState::Pending;
                entry.lease_expires = None;
            }
        }
    }

    /// Number of locally stored deliverable messages of `queue`.
    pub fn local_depth(&self, queue: &str) -> usize {
        let now = now_ms();
        self.local_messages
            .iter()
            .map(|partition| {
                partition
                    .value()
                    .iter()
                    .filter(|m| m.value().queue == queue && is_deliverable(m.value(), now))
                    .count()
            })
            .sum()
    }

    /// Removes every local message of `queue` and broadcasts the purge to
    /// all alive peers.
    pub async fn purge(&self, queue: &str) {
        self.purge_local(queue);

        let local_id = self.membership.local_node.id.clone();
        for member in self.membership.get_alive_members() {
            if member.id == local_id {
                continue;
            }
            let url = format!("http://{}/bus{}/{}", member.http_addr, ENDPOINT_PURGE, queue);
            if let Err(e) = post_json_with_retry(
                &self.http_client,
                &url,
                &serde_json::json!({}),
                HOP_TIMEOUT,
                &RetryPolicy::interconnect(),
            )
            .await
            {
                tracing::warn!("Purge broadcast to {:?} failed: {}", member.id, e);
            }
        }
    }

    pub fn purge_local(&self, queue: &str) {
        for partition in self.local_messages.iter() {
            partition.value().retain(|_, m| m.queue != queue);
        }
    }

    pub fn dump_partition(&self, partition: u32) -> Vec<QueueMessage> {
        self.local_messages
            .get(&partition)
            .map(|messages| messages.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default()
    }

    pub fn apply_partition_messages(&self, partition: u32, messages: Vec<QueueMessage>) {
        for message in messages {
            self.store_replica(partition, message);
        }
    }

    pub fn has_partition(&self, partition: u32) -> bool {
        self.local_messages
            .get(&partition)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }

    pub fn local_message_count(&self) -> usize {
        self.local_messages.iter().map(|e| e.value().len()).sum()
    }

    /// One anti-entropy round over the partitions this node should hold.
    pub async fn resync_round(&self) {
        let mut targets = self.partitioner.my_primary_partitions();
        targets.extend(self.partitioner.my_backup_partitions());
        let local_id = self.membership.local_node.id.clone();

        for partition in targets {
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
                Ok(messages) if !messages.is_empty() => {
                    self.apply_partition_messages(partition, messages);
                    tracing::info!("Resynced bus partition {} from {:?}", partition, source);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Bus resync of partition {} from {:?} failed: {}",
                        partition,
                        source,
                        e
                    );
                }
            }
        }
    }

    async fn fetch_partition(&self, owner: &NodeId, partition: u32) -> Result<Vec<QueueMessage>> {
        let node = self
            .membership
            .get_member(owner)
            .ok_or_else(|| anyhow::anyhow!("owner node not found: {:?}", owner))?;

        let url = format!(
            "http://{}/bus{}/{}",
            node.http_addr, ENDPOINT_PARTITION_DUMP, partition
        );
        let response = get_with_retry(
            &self.http_client,
            &url,
            HOP_TIMEOUT,
            &RetryPolicy::interconnect(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("message dump failed: {}", response.status()));
        }
        let dump: MessageDumpResponse = response.json().await?;
        Ok(dump.messages)
    }
}

fn is_deliverable(message: &QueueMessage, now: u64) -> bool {
    match message.state {
        DeliveryState::Pending => true,
        DeliveryState::InFlight => message.lease_expires.map(|l| now > l).unwrap_or(false),
    }
}
