use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::types::{IndexStatsReport, Posting};
use crate::cluster::locks::KeyLocks;
use crate::cluster::map::{now_ms, DistributedMap};
use crate::cluster::partitioner::PartitionManager;
use crate::cluster::transport::{post_json_with_retry, RetryPolicy};
use crate::membership::service::MembershipService;

pub const STAT_TOTAL_DOCUMENTS: &str = "total_documents";
pub const STAT_TOTAL_TERMS_INDEXED: &str = "total_terms_indexed";

pub const TERMS_BASE_PATH: &str = "/index/terms";
pub const STATS_BASE_PATH: &str = "/index/counters";
pub const PROCESSED_BASE_PATH: &str = "/index/processed";
pub const DOCUMENTS_BASE_PATH: &str = "/index/docs";

/// Internal endpoint for the cluster-wide document removal sweep.
pub const ENDPOINT_REMOVE_DOCUMENT: &str = "/internal/remove_doc";

const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client handle over the distributed inverted index and its companions.
pub struct InvertedIndex {
    terms: Arc<DistributedMap<String, Vec<Posting>>>,
    stats: Arc<DistributedMap<String, i64>>,
    processed: Arc<DistributedMap<String, u64>>,
    documents: Arc<DistributedMap<u32, u64>>,
    locks: KeyLocks,
    membership: Arc<MembershipService>,
    http_client: reqwest::Client,
}

impl InvertedIndex {
    pub fn new(membership: Arc<MembershipService>, partitioner: Arc<PartitionManager>) -> Arc<Self> {
        Arc::new(Self {
            terms: Arc::new(DistributedMap::new(
                membership.clone(),
                partitioner.clone(),
                TERMS_BASE_PATH,
            )),
            stats: Arc::new(DistributedMap::new(
                membership.clone(),
                partitioner.clone(),
                STATS_BASE_PATH,
            )),
            processed: Arc::new(DistributedMap::new(
                membership.clone(),
                partitioner.clone(),
                PROCESSED_BASE_PATH,
            )),
            documents: Arc::new(DistributedMap::new(
                membership.clone(),
                partitioner,
                DOCUMENTS_BASE_PATH,
            )),
            locks: KeyLocks::new(),
            membership,
            http_client: reqwest::Client::new(),
        })
    }

    // Map accessors, used by the node binary to mount HTTP routes and
    // anti-entropy loops.

    pub fn terms_map(&self) -> Arc<DistributedMap<String, Vec<Posting>>> {
        self.terms.clone()
    }

    pub fn stats_map(&self) -> Arc<DistributedMap<String, i64>> {
        self.stats.clone()
    }

    pub fn processed_map(&self) -> Arc<DistributedMap<String, u64>> {
        self.processed.clone()
    }

    pub fn documents_map(&self) -> Arc<DistributedMap<u32, u64>> {
        self.documents.clone()
    }

    /// Postings of one term; empty if the term is unknown.
    pub async fn get(&self, term: &str) -> Vec<Posting> {
        self.terms.get(&term.to_string()).await.unwrap_or_default()
    }

    /// Batched lookup: one request per owning node. Terms without postings
    /// are absent from the result.
    pub async fn get_all(&self, terms: &[String]) -> HashMap<String, Vec<Posting>> {
        self.terms.get_batch(terms).await
    }

    /// Batched write, coalesced per owning node.
    pub async fn put_all(&self, updates: HashMap<String, Vec<Posting>>) -> Result<()> {
        self.terms.put_batch(updates).await
    }

    /// Acquires the advisory lock of a term. The term stays locked until the
    /// returned guard is dropped.
    pub async fn lock_term(&self, term: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.acquire(term).await
    }

    /// Installs a document's term/position map.
    ///
    /// Batch-fetches the current postings, replaces the document's posting
    /// per term locally, batch-writes the merged lists, and updates the
    /// counters. After return, every term of the document carries exactly one
    /// posting for this book id.
    pub async fn index_document(
        &self,
        book_id: u32,
        term_positions: HashMap<String, Vec<u32>>,
    ) -> Result<usize> {
        if term_positions.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = term_positions.keys().cloned().collect();
        let mut existing = self.terms.get_batch(&keys).await;

        let mut updates: HashMap<String, Vec<Posting>> = HashMap::with_capacity(keys.len());
        for (term, positions) in term_positions {
            let mut postings = existing.remove(&term).unwrap_or_default();
            postings.retain(|p| p.book_id != book_id);
            postings.push(Posting::new(book_id, positions));
            updates.insert(term, postings);
        }

        let terms_indexed = updates.len();
        self.terms.put_batch(updates).await?;

        self.register_document(book_id).await?;
        self.increment_stat(STAT_TOTAL_TERMS_INDEXED, terms_indexed as i64)
            .await?;

        Ok(terms_indexed)
    }

    /// Records `book_id` in the document registry, bumping
    /// `total_documents` only the first time the book is installed so the
    /// counter tracks distinct current documents.
    async fn register_document(&self, book_id: u32) -> Result<()> {
        let _guard = self.locks.acquire(&format!("doc:{}", book_id)).await;
        if self.documents.get(&book_id).await.is_none() {
            self.documents.put(book_id, now_ms()).await?;
            self.increment_stat(STAT_TOTAL_DOCUMENTS, 1).await?;
        }
        Ok(())
    }

    /// Removes every posting of `book_id` across the cluster and drops the
    /// book from the registry. Returns the number of term entries touched.
    pub async fn remove_document(&self, book_id: u32) -> Result<usize> {
        let was_registered = self.documents.get(&book_id).await.is_some();

        let mut terms_removed = self.remove_document_local(book_id).await;

        let local_id = self.membership.local_node.id.clone();
        for member in self.membership.get_alive_members() {
            if member.id == local_id {
                continue;
            }
            let url = format!(
                "http://{}/index{}/{}",
                member.http_addr, ENDPOINT_REMOVE_DOCUMENT, book_id
            );
            match post_json_with_retry(
                &self.http_client,
                &url,
                &serde_json::json!({}),
                REMOVE_TIMEOUT,
                &RetryPolicy::interconnect(),
            )
            .await
            {
                Ok(response) if response.status().is_success() => {
                    if let Ok(body) = response.json::<serde_json::Value>().await {
                        terms_removed += body
                            .get("terms_removed")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0) as usize;
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        "Removal sweep on {:?} answered {}",
                        member.id,
                        response.status()
                    );
                }
                Err(e) => {
                    tracing::warn!("Removal sweep on {:?} failed: {}", member.id, e);
                }
            }
        }

        if was_registered {
            let _guard = self.locks.acquire(&format!("doc:{}", book_id)).await;
            self.increment_stat(STAT_TOTAL_DOCUMENTS, -1).await?;
        }

        Ok(terms_removed)
    }

    /// Local part of the removal sweep: every locally held term entry drops
    /// the book's posting under that term's lock; emptied entries disappear.
    pub async fn remove_document_local(&self, book_id: u32) -> usize {
        let mut terms_removed = 0;

        for term in self.terms.local_keys() {
            let _guard = self.locks.acquire(&term).await;
            let Some(mut postings) = self.terms.get_local(&term) else { continue };

            let before = postings.len();
            postings.retain(|p| p.book_id != book_id);
            if postings.len() == before {
                continue;
            }
            terms_removed += 1;

            if postings.is_empty() {
                self.terms.remove_local(&term);
            } else {
                let partition = self.terms.partitioner().get_partition(&term);
                self.terms.store_local(partition, term.clone(), postings);
            }
        }

        self.documents.remove_local(&book_id);
        terms_removed
    }

    /// Presence means "already indexed; skip". The mark is written after the
    /// postings are installed, so a crash in between redelivers and reindexes.
    pub async fn is_processed(&self, idempotency_key: &str) -> bool {
        self.processed.get(&idempotency_key.to_string()).await.is_some()
    }

    pub async fn mark_processed(&self, idempotency_key: &str) -> Result<()> {
        self.processed
            .put(idempotency_key.to_string(), now_ms())
            .await
    }

    pub async fn total_documents(&self) -> i64 {
        self.stats
            .get(&STAT_TOTAL_DOCUMENTS.to_string())
            .await
            .unwrap_or(0)
    }

    /// Adds `delta` to a stats counter under the counter's advisory lock.
    pub async fn increment_stat(&self, key: &str, delta: i64) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        let current = self.stats.get(&key.to_string()).await.unwrap_or(0);
        self.stats.put(key.to_string(), (current + delta).max(0)).await
    }

    pub async fn stats(&self) -> IndexStatsReport {
        IndexStatsReport {
            total_documents: self.total_documents().await,
            total_terms_indexed: self
                .stats
                .get(&STAT_TOTAL_TERMS_INDEXED.to_string())
                .await
                .unwrap_or(0),
            local_term_entries: self.terms.local_entry_count(),
            local_term_partitions: self.terms.local_partition_count(),
            local_processed_entries: self.processed.local_entry_count(),
            cluster_size: self.membership.alive_count(),
        }
    }

    /// Administrative wipe of index, counters, registry, and processed marks.
    pub async fn clear(&self) {
        self.terms.clear().await;
        self.stats.clear().await;
        self.processed.clear().await;
        self.documents.clear().await;
        self.locks.clear();
        tracing::info!("Distributed index cleared");
    }
}
