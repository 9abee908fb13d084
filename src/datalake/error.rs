use thiserror::Error;

/// Errors surfaced by the local datalake partition.
///
/// `HashMismatch` refuses a replica whose bytes do not match the announced
/// content hash; the sender counts the attempt as failed and does not retry.
/// `NotFound` is reported to the caller and never retried. I/O errors carry
/// the underlying cause; retrying is the caller's responsibility.
#[derive(Debug, Error)]
pub enum DatalakeError {
    #[error("book {0} not found in the local datalake")]
    NotFound(u32),

    #[error("Hash mismatch (expected={expected}, computed={computed})")]
    HashMismatch { expected: String, computed: String },

    #[error("invalid replication payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
