use serde::{Deserialize, Serialize};

use crate::fingerprint;

/// Structured properties carried by every message for filtering and
/// idempotency checks, mirroring the payload's key fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageHeaders {
    pub idempotency_key: String,
    pub book_id: u32,
    pub node_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryState {
    /// Stored, waiting for a consumer.
    Pending,
    /// Claimed by a consumer under a lease; redelivered if the lease expires.
    InFlight,
}

/// One message as stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub queue: String,
    pub headers: MessageHeaders,
    pub payload: serde_json::Value,
    pub enqueued_at: u64,
    pub attempts: u32,
    pub state: DeliveryState,
    pub lease_expires: Option<u64>,
}

/// Request for the indexer, published by ingestion after the local write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    pub book_id: u32,
    pub node_id: String,
    /// Relative path of the book directory within the datalake.
    pub datalake_path: String,
    pub content_hash: String,
    /// Epoch milliseconds at publish time.
    pub timestamp: u64,
}

impl IndexRequest {
    pub fn new(book_id: u32, node_id: &str, datalake_path: &str, content_hash: &str) -> Self {
        Self {
            book_id,
            node_id: node_id.to_string(),
            datalake_path: datalake_path.to_string(),
            content_hash: content_hash.to_string(),
            timestamp: crate::cluster::map::now_ms(),
        }
    }

    /// `bookId:contentHash`, the duplicate-delivery guard.
    pub fn idempotency_key(&self) -> String {
        fingerprint::idempotency_key(self.book_id, &self.content_hash)
    }

    pub fn headers(&self) -> MessageHeaders {
        MessageHeaders {
            idempotency_key: self.idempotency_key(),
            book_id: self.book_id,
            node_id: self.node_id.clone(),
        }
    }
}

/// Informational event published by the indexer after a document is fully
/// installed in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocIngested {
    pub book_id: u32,
    pub node_id: String,
    pub terms_indexed: usize,
    pub timestamp: u64,
}
