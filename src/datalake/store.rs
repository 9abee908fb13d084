use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::DatalakeError;
use super::protocol::ReplicationRequest;
use super::splitter;
use crate::fingerprint;

const LOG_FILE_NAME: &str = "ingestions.log";
const RAW_FILE: &str = "raw.txt";
const HEADER_FILE: &str = "header.txt";
const BODY_FILE: &str = "body.txt";

/// One parsed line of the ingestion log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub book_id: u32,
    pub relative_path: String,
    pub bytes: u64,
}

/// Aggregate numbers derived from the ingestion log.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatalakeStats {
    pub book_count: usize,
    pub total_bytes: u64,
}

/// Result of writing a new book into the local partition.
#[derive(Debug, Clone)]
pub struct LocalWrite {
    pub relative_path: String,
    pub bytes: u64,
    pub content_hash: String,
    pub header: String,
    pub body: String,
}

/// The node-local slice of the datalake.
///
/// Book directories are created on first ingest and never modified in place;
/// the append-only log is the catalog. The log mutex keeps appends whole;
/// readers tolerate a torn final line by skipping anything unparseable.
pub struct DatalakePartition {
    root: PathBuf,
    log_path: PathBuf,
    log_lock: Mutex<()>,
}

impl DatalakePartition {
    pub fn new(root: PathBuf) -> Self {
        let log_path = root.join(LOG_FILE_NAME);
        Self {
            root,
            log_path,
            log_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Splits and writes a freshly fetched document, then records it in the
    /// log. The caller is expected to have checked [`locate`] first.
    pub async fn write_book(&self, book_id: u32, raw: &str) -> Result<LocalWrite, DatalakeError> {
        let now = Local::now();
        let relative_path = format!(
            "{}/{}/{}",
            now.format("%Y%m%d"),
            now.format("%H"),
            book_id
        );
        let book_dir = self.root.join(&relative_path);
        tokio::fs::create_dir_all(&book_dir).await?;

        let parts = splitter::split_header_body(raw);
        tokio::fs::write(book_dir.join(RAW_FILE), raw.as_bytes()).await?;
        tokio::fs::write(book_dir.join(HEADER_FILE), parts.header.as_bytes()).await?;
        tokio::fs::write(book_dir.join(BODY_FILE), parts.body.as_bytes()).await?;

        let bytes = raw.len() as u64;
        self.append_log(book_id, &relative_path, bytes).await?;

        Ok(LocalWrite {
            relative_path,
            bytes,
            content_hash: fingerprint::sha256_hex(raw.as_bytes()),
            header: parts.header,
            body: parts.body,
        })
    }

    /// Stores a replica pushed by a peer. The announced hash is verified
    /// against the decoded raw bytes before anything touches disk, and the
    /// write never triggers onward replication.
    pub async fn receive_replica(&self, request: &ReplicationRequest) -> Result<(), DatalakeError> {
        let (raw, header, body) = request.decode_contents()?;

        let computed = fingerprint::sha256_hex(&raw);
        if !request.content_hash.is_empty() && request.content_hash != computed {
            return Err(DatalakeError::HashMismatch {
                expected: request.content_hash.clone(),
                computed,
            });
        }

        let book_dir = self.root.join(&request.relative_path);
        tokio::fs::create_dir_all(&book_dir).await?;
        tokio::fs::write(book_dir.join(RAW_FILE), &raw).await?;
        tokio::fs::write(book_dir.join(HEADER_FILE), &header).await?;
        tokio::fs::write(book_dir.join(BODY_FILE), &body).await?;

        self.append_log(request.book_id, &request.relative_path, raw.len() as u64)
            .await?;
        Ok(())
    }

    async fn append_log(&self, book_id: u32, relative_path: &str, bytes: u64) -> Result<(), DatalakeError> {
        let line = format!(
            "{};book={};path={};bytes={}\n",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            book_id,
            relative_path,
            bytes
        );

        let _guard = self.log_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Scans the log for the first entry of `book_id` and returns its
    /// relative path.
    pub async fn locate(&self, book_id: u32) -> Option<String> {
        self.scan_log(|entry| {
            if entry.book_id == book_id {
                Some(entry.relative_path.clone())
            } else {
                None
            }
        })
        .await
    }

    /// "available" if the book is recorded locally, "missing" otherwise.
    pub async fn status(&self, book_id: u32) -> &'static str {
        if self.locate(book_id).await.is_some() {
            "available"
        } else {
            "missing"
        }
    }

    /// Deduplicated, sorted list of locally stored book ids.
    pub async fn list(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.collect_log().await.iter().map(|e| e.book_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub async fn stats(&self) -> DatalakeStats {
        let entries = self.collect_log().await;
        let mut ids: Vec<u32> = entries.iter().map(|e| e.book_id).collect();
        ids.sort_unstable();
        ids.dedup();
        DatalakeStats {
            book_count: ids.len(),
            total_bytes: entries.iter().map(|e| e.bytes).sum(),
        }
    }

    /// Reads the indexing input of a stored book.
    pub async fn read_body(&self, relative_path: &str) -> Result<String, DatalakeError> {
        let path = self.root.join(relative_path).join(BODY_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DatalakeError::NotFound(parse_book_id(relative_path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Administrative wipe of the local partition, log included.
    pub async fn clear(&self) -> Result<(), DatalakeError> {
        let _guard = self.log_lock.lock().await;
        if self.root.exists() {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn scan_log<T>(&self, mut pick: impl FnMut(&LogEntry) -> Option<T>) -> Option<T> {
        use tokio::io::AsyncBufReadExt;

        let file = tokio::fs::File::open(&self.log_path).await.ok()?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(entry) = parse_log_line(&line) {
                if let Some(value) = pick(&entry) {
                    return Some(value);
                }
            }
        }
        None
    }

    async fn collect_log(&self) -> Vec<LogEntry> {
        use tokio::io::AsyncBufReadExt;

        let Ok(file) = tokio::fs::File::open(&self.log_path).await else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        let mut lines = tokio::io::BufReader::new(file).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(entry) = parse_log_line(&line) {
                entries.push(entry);
            }
        }
        entries
    }
}

/// Parses `<timestamp>;book=<id>;path=<rel>;bytes=<n>`. Lines that do not
/// match the grammar (including a torn final line after a crash) are skipped
/// by returning `None`.
pub fn parse_log_line(line: &str) -> Option<LogEntry> {
    let mut parts = line.trim_end().split(';');
    let timestamp = parts.next()?.to_string();
    let book_id = parts.next()?.strip_prefix("book=")?.parse().ok()?;
    let relative_path = parts.next()?.strip_prefix("path=")?.to_string();
    let bytes = parts.next()?.strip_prefix("bytes=")?.parse().ok()?;
    if timestamp.is_empty() || relative_path.is_empty() {
        return None;
    }
    Some(LogEntry {
        timestamp,
        book_id,
        relative_path,
        bytes,
    })
}

fn parse_book_id(relative_path: &str) -> u32 {
    relative_path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .unwrap_or(0)
}
