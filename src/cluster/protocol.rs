//! Storage network protocol.
//!
//! API endpoints and DTOs for inter-node storage coordination (put, get,
//! replication, batch, anti-entropy). Values travel as serialized JSON
//! strings so the endpoints stay generic over the stored type.

use serde::{Deserialize, Serialize};

// --- API endpoints, relative to the map's base path ---

/// Public write.
pub const ENDPOINT_PUT: &str = "/put";
/// Public read.
pub const ENDPOINT_GET: &str = "/get";
/// Local-only read, used for remote fetches during routing and sync.
pub const ENDPOINT_GET_INTERNAL: &str = "/internal/get";
/// Write forwarded from a non-owner to the primary.
pub const ENDPOINT_FORWARD_PUT: &str = "/internal/forward_put";
/// Primary-to-backup synchronization of one entry.
pub const ENDPOINT_REPLICATE: &str = "/internal/replicate";
/// Batched local-only read (one request per owning node).
pub const ENDPOINT_GET_BATCH: &str = "/internal/get_batch";
/// Batched write forwarded to the primary.
pub const ENDPOINT_PUT_BATCH: &str = "/internal/put_batch";
/// Primary-to-backup synchronization of a batch of entries.
pub const ENDPOINT_REPLICATE_BATCH: &str = "/internal/replicate_batch";
/// Bulk export of one partition (anti-entropy).
pub const ENDPOINT_PARTITION_DUMP: &str = "/internal/partition";
/// Removes every entry in the local store.
pub const ENDPOINT_CLEAR: &str = "/internal/clear";

// --- DTOs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    /// Operation id for idempotent replay across hops.
    pub op_id: String,
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardPutRequest {
    pub partition: u32,
    pub op_id: String,
    pub key: String,
    pub value_json: String,
}

/// Sent by the primary immediately after a successful local write. The
/// `op_id` lets the backup ignore retried deliveries.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub partition: u32,
    pub op_id: String,
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    /// `None` means the key does not exist.
    pub value_json: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyValueJson {
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchGetRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchGetResponse {
    /// Only keys that exist on the queried node are present.
    pub entries: Vec<KeyValueJson>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPutRequest {
    pub op_id: String,
    pub entries: Vec<KeyValueJson>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPutResponse {
    pub success: bool,
    pub stored: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionedEntry {
    pub partition: u32,
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateBatchRequest {
    pub op_id: String,
    pub entries: Vec<PartitionedEntry>,
}

/// Complete dataset of one partition, used to resynchronize nodes that fell
/// behind or are recovering from failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionDumpResponse {
    pub partition: u32,
    pub entries: Vec<KeyValueJson>,
}
