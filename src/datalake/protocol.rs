//! Replication wire protocol.
//!
//! Content travels base64-encoded inside JSON so the endpoint stays plain
//! HTTP. The receiver re-hashes the decoded raw bytes and refuses the write
//! on mismatch.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::error::DatalakeError;

/// Endpoint for receiving a replica of an ingested book.
pub const ENDPOINT_REPLICATE: &str = "/replicate";
/// Liveness probe used by peers before replication.
pub const ENDPOINT_STATUS: &str = "/status";

/// A book pushed from the ingesting node to a replica peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRequest {
    pub book_id: u32,
    pub source_node_id: String,
    pub relative_path: String,
    /// Base64 of the original bytes as fetched.
    pub raw_content: String,
    /// Base64 of the metadata header.
    pub header_content: String,
    /// Base64 of the content body.
    pub body_content: String,
    /// Lowercase hex SHA-256 of the raw bytes.
    pub content_hash: String,
}

impl ReplicationRequest {
    pub fn encode(
        book_id: u32,
        source_node_id: &str,
        relative_path: &str,
        raw: &str,
        header: &str,
        body: &str,
        content_hash: &str,
    ) -> Self {
        Self {
            book_id,
            source_node_id: source_node_id.to_string(),
            relative_path: relative_path.to_string(),
            raw_content: BASE64.encode(raw.as_bytes()),
            header_content: BASE64.encode(header.as_bytes()),
            body_content: BASE64.encode(body.as_bytes()),
            content_hash: content_hash.to_string(),
        }
    }

    /// Decodes the three content blobs back into owned byte buffers.
    pub fn decode_contents(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), DatalakeError> {
        let raw = BASE64
            .decode(&self.raw_content)
            .map_err(|e| DatalakeError::InvalidPayload(format!("raw content: {}", e)))?;
        let header = BASE64
            .decode(&self.header_content)
            .map_err(|e| DatalakeError::InvalidPayload(format!("header content: {}", e)))?;
        let body = BASE64
            .decode(&self.body_content)
            .map_err(|e| DatalakeError::InvalidPayload(format!("body content: {}", e)))?;
        Ok((raw, header, body))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationResponse {
    pub success: bool,
    pub node_id: String,
    pub book_id: u32,
    pub message: String,
}

impl ReplicationResponse {
    pub fn success(node_id: &str, book_id: u32) -> Self {
        Self {
            success: true,
            node_id: node_id.to_string(),
            book_id,
            message: "replicated".to_string(),
        }
    }

    pub fn failure(node_id: &str, book_id: u32, message: String) -> Self {
        Self {
            success: false,
            node_id: node_id.to_string(),
            book_id,
            message,
        }
    }
}
