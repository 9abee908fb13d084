use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::source::DocumentSource;
use crate::bus::client::BusClient;
use crate::bus::types::IndexRequest;
use crate::cluster::map::DistributedMap;
use crate::datalake::protocol::ReplicationRequest;
use crate::datalake::replication::ReplicationClient;
use crate::datalake::splitter::extract_metadata;
use crate::datalake::store::DatalakePartition;
use crate::indexer::tokenizer::tokenize_with_positions;
use crate::search::types::BookMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Downloaded,
    Available,
    Error,
}

/// Outcome of one ingest call. `path` carries the relative datalake path on
/// success and the error message on failure, in-band.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub book_id: u32,
    pub status: IngestStatus,
    pub path: String,
    pub replicas_written: usize,
}

/// Orchestrates the full ingest of one book on the local node.
///
/// The receipt is returned once the local write succeeds; replication is
/// best-effort and only reported, and a failed event publish is logged
/// rather than failing the ingest (surviving replicas make the book
/// recoverable).
pub struct IngestionPipeline {
    datalake: Arc<DatalakePartition>,
    replicator: Arc<ReplicationClient>,
    bus: Arc<BusClient>,
    books: Arc<DistributedMap<u32, BookMetadata>>,
    indexing_queue: String,
    node_id: String,
}

impl IngestionPipeline {
    pub fn new(
        datalake: Arc<DatalakePartition>,
        replicator: Arc<ReplicationClient>,
        bus: Arc<BusClient>,
        books: Arc<DistributedMap<u32, BookMetadata>>,
        indexing_queue: String,
        node_id: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            datalake,
            replicator,
            bus,
            books,
            indexing_queue,
            node_id,
        })
    }

    pub fn datalake(&self) -> &Arc<DatalakePartition> {
        &self.datalake
    }

    /// Fetches the book from the upstream source and ingests it. The local
    /// log is checked first so a re-ingest of a known book costs neither
    /// network nor writes.
    pub async fn ingest_from_source(
        &self,
        book_id: u32,
        source: &dyn DocumentSource,
    ) -> IngestReceipt {
        if let Some(path) = self.datalake.locate(book_id).await {
            return IngestReceipt {
                book_id,
                status: IngestStatus::Available,
                path,
                replicas_written: 0,
            };
        }

        match source.fetch(book_id).await {
            Ok(raw) => self.ingest(book_id, &raw).await,
            Err(e) => {
                tracing::error!("Failed to fetch book {}: {}", book_id, e);
                IngestReceipt {
                    book_id,
                    status: IngestStatus::Error,
                    path: e.to_string(),
                    replicas_written: 0,
                }
            }
        }
    }

    /// Ingests already-fetched raw bytes: local write, metadata, replication,
    /// index request.
    pub async fn ingest(&self, book_id: u32, raw: &str) -> IngestReceipt {
        if let Some(path) = self.datalake.locate(book_id).await {
            return IngestReceipt {
                book_id,
                status: IngestStatus::Available,
                path,
                replicas_written: 0,
            };
        }

        let write = match self.datalake.write_book(book_id, raw).await {
            Ok(write) => write,
            Err(e) => {
                tracing::error!("Local write failed for book {}: {}", book_id, e);
                return IngestReceipt {
                    book_id,
                    status: IngestStatus::Error,
                    path: e.to_string(),
                    replicas_written: 0,
                };
            }
        };

        let metadata = build_metadata(book_id, &write.header, &write.body);
        if let Err(e) = self.books.put(book_id, metadata).await {
            tracing::warn!("Failed to store metadata for book {}: {}", book_id, e);
        }

        let mut replicas_written = 0;
        if self.replicator.is_enabled() {
            let request = ReplicationRequest::encode(
                book_id,
                &self.node_id,
                &write.relative_path,
                raw,
                &write.header,
                &write.body,
                &write.content_hash,
            );
            replicas_written = self
                .replicator
                .replicate(&request)
                .await
                .iter()
                .filter(|r| r.success)
                .count();
        }

        let index_request = IndexRequest::new(
            book_id,
            &self.node_id,
            &write.relative_path,
            &write.content_hash,
        );
        if let Err(e) = self
            .bus
            .publish(&self.indexing_queue, index_request.headers(), &index_request)
            .await
        {
            tracing::error!("Failed to publish index request for book {}: {}", book_id, e);
        }

        tracing::info!(
            "Ingested book {} at {} ({} replica(s))",
            book_id,
            write.relative_path,
            replicas_written
        );
        IngestReceipt {
            book_id,
            status: IngestStatus::Downloaded,
            path: write.relative_path,
            replicas_written,
        }
    }
}

fn build_metadata(book_id: u32, header: &str, body: &str) -> BookMetadata {
    let fields = extract_metadata(header);

    let tokens = tokenize_with_positions(body);
    let word_count = tokens.len();
    let unique_words = tokens
        .iter()
        .map(|(word, _)| word.as_str())
        .collect::<HashSet<_>>()
        .len();

    BookMetadata {
        book_id,
        title: fields.title.unwrap_or_else(|| format!("Book {}", book_id)),
        author: fields.author.unwrap_or_else(|| "Unknown".to_string()),
        language: fields.language.unwrap_or_else(|| "unknown".to_string()),
        year: fields.year,
        word_count,
        unique_words,
    }
}
