use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::tokenizer::{term_positions, StopList};
use crate::bus::types::IndexRequest;
use crate::datalake::store::DatalakePartition;
use crate::datalake::DatalakeError;
use crate::fingerprint;
use crate::index::InvertedIndex;

/// What happened to one index request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { terms_indexed: usize },
    /// Already installed under the same idempotency key.
    Duplicate,
    /// `body.txt` is gone; a redelivery would not help, so the message is
    /// acknowledged and the error counted.
    MissingBody,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexerCounters {
    pub messages_processed: u64,
    pub duplicates_skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub documents_indexed: usize,
    pub terms_indexed: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
}

pub struct IndexingEngine {
    index: Arc<InvertedIndex>,
    datalake: Arc<DatalakePartition>,
    stop_list: StopList,
    messages_processed: AtomicU64,
    duplicates_skipped: AtomicU64,
    errors: AtomicU64,
}

impl IndexingEngine {
    pub fn new(index: Arc<InvertedIndex>, datalake: Arc<DatalakePartition>) -> Arc<Self> {
        Arc::new(Self {
            index,
            datalake,
            stop_list: StopList::default(),
            messages_processed: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    pub fn index(&self) -> &Arc<InvertedIndex> {
        &self.index
    }

    /// Handles one index request end to end.
    ///
    /// A transient failure while touching the index propagates as `Err`,
    /// which leaves the message unacked and redelivered. Everything the
    /// indexer can decide terminally (duplicate, missing body) returns `Ok`
    /// so the message is acknowledged.
    pub async fn process(&self, request: &IndexRequest) -> Result<IndexOutcome> {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        let idempotency_key = request.idempotency_key();
        if self.index.is_processed(&idempotency_key).await {
            self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Duplicate index request skipped: {}", idempotency_key);
            return Ok(IndexOutcome::Duplicate);
        }

        let body = match self.datalake.read_body(&request.datalake_path).await {
            Ok(body) => body,
            Err(DatalakeError::NotFound(_)) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Body missing for book {} at {}; dropping request",
                    request.book_id,
                    request.datalake_path
                );
                return Ok(IndexOutcome::MissingBody);
            }
            Err(e) => return Err(e.into()),
        };

        let terms = term_positions(&body, &self.stop_list);
        let terms_indexed = self.index.index_document(request.book_id, terms).await?;

        // Mark-after-install: a crash before this line redelivers the
        // message and the reinstall replaces the same postings.
        self.index.mark_processed(&idempotency_key).await?;

        tracing::info!(
            "Indexed book {} ({} terms) from {}",
            request.book_id,
            terms_indexed,
            request.datalake_path
        );
        Ok(IndexOutcome::Indexed { terms_indexed })
    }

    pub fn note_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> IndexerCounters {
        IndexerCounters {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Clears the index and re-installs every book found in the local
    /// datalake. Offline admin operation.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let started = Instant::now();
        self.index.clear().await;

        let mut documents_indexed = 0;
        let mut terms_indexed = 0;
        let mut errors = 0;

        for (book_id, relative_path) in collect_book_dirs(self.datalake.root().to_path_buf()) {
            let raw_path = self.datalake.root().join(&relative_path).join("raw.txt");
            let content_hash = match tokio::fs::read(&raw_path).await {
                Ok(raw) => fingerprint::sha256_hex(&raw),
                Err(e) => {
                    tracing::warn!("Rebuild skipping {}: {}", relative_path, e);
                    errors += 1;
                    continue;
                }
            };

            let request = IndexRequest::new(book_id, "rebuild", &relative_path, &content_hash);
            match self.process(&request).await {
                Ok(IndexOutcome::Indexed { terms_indexed: terms }) => {
                    documents_indexed += 1;
                    terms_indexed += terms;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Rebuild failed for book {}: {}", book_id, e);
                    errors += 1;
                }
            }
        }

        Ok(RebuildReport {
            documents_indexed,
            terms_indexed,
            errors,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Walks the `YYYYMMDD/HH/<bookId>` layout and yields every book directory
/// holding a body file.
fn collect_book_dirs(root: PathBuf) -> Vec<(u32, String)> {
    let mut books = Vec::new();
    let Ok(days) = std::fs::read_dir(&root) else { return books };

    for day in days.flatten().filter(|e| e.path().is_dir()) {
        let Ok(hours) = std::fs::read_dir(day.path()) else { continue };
        for hour in hours.flatten().filter(|e| e.path().is_dir()) {
            let Ok(entries) = std::fs::read_dir(hour.path()) else { continue };
            for book_dir in entries.flatten().filter(|e| e.path().is_dir()) {
                let Some(book_id) = book_dir
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<u32>().ok())
                else {
                    continue;
                };
                if !book_dir.path().join("body.txt").exists() {
                    continue;
                }
                let relative_path = format!(
                    "{}/{}/{}",
                    day.file_name().to_string_lossy(),
                    hour.file_name().to_string_lossy(),
                    book_id
                );
                books.push((book_id, relative_path));
            }
        }
    }
    books
}
