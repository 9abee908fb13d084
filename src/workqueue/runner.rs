use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::valid_ids::valid_book_ids;
use crate::bus::client::BusClient;
use crate::bus::types::{MessageHeaders, QueueMessage};
use crate::cluster::locks::KeyLocks;
use crate::cluster::map::{now_ms, DistributedMap};
use crate::ingestion::pipeline::{IngestStatus, IngestionPipeline};
use crate::ingestion::source::DocumentSource;

pub const BULK_QUEUE: &str = "bulk.ingest";
pub const STATS_BASE_PATH: &str = "/bulk/stats";
pub const PROGRESS_BASE_PATH: &str = "/bulk/progress";

const STATUS_IDLE: i64 = 0;
const STATUS_RUNNING: i64 = 1;
const STATUS_COMPLETED: i64 = 2;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_STEP: Duration = Duration::from_millis(100);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct BulkRunInfo {
    pub benchmark_id: String,
    pub total_books: usize,
    pub start_time: i64,
    pub status: String,
    pub node_id: String,
    pub validated_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRunStatus {
    pub benchmark_id: Option<String>,
    pub status: String,
    pub total_books: i64,
    pub total_processed: i64,
    pub total_errors: i64,
    pub remaining: i64,
    pub elapsed_ms: i64,
    pub throughput_per_sec: f64,
    pub per_node: HashMap<String, i64>,
}

/// Coordinates bulk ingest runs across the cluster.
///
/// One node calls [`start`]; every node runs a worker pool via
/// [`start_workers`]. Workers poll the shared queue with a bounded timeout,
/// ingest, and settle the counters; the first worker that sees the run
/// drained while the status is still "running" marks it completed.
pub struct BulkIngestRunner {
    bus: Arc<BusClient>,
    stats: Arc<DistributedMap<String, i64>>,
    progress: Arc<DistributedMap<String, i64>>,
    locks: KeyLocks,
    pipeline: Arc<IngestionPipeline>,
    source: Arc<dyn DocumentSource>,
    node_id: String,
    running: AtomicBool,
    workers: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    local_processed: AtomicU64,
    local_errors: AtomicU64,
}

impl BulkIngestRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<BusClient>,
        stats: Arc<DistributedMap<String, i64>>,
        progress: Arc<DistributedMap<String, i64>>,
        pipeline: Arc<IngestionPipeline>,
        source: Arc<dyn DocumentSource>,
        node_id: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            stats,
            progress,
            locks: KeyLocks::new(),
            pipeline,
            source,
            node_id,
            running: AtomicBool::new(false),
            workers: tokio::sync::Mutex::new(Vec::new()),
            local_processed: AtomicU64::new(0),
            local_errors: AtomicU64::new(0),
        })
    }

    /// Starts a new run: clears the queue and both maps, then enqueues
    /// `count` book ids (sequential from 1, or drawn from the curated
    /// known-valid list). Call on one node only; the queue is shared.
    pub async fn start(&self, count: usize, validated_only: bool) -> Result<BulkRunInfo> {
        self.bus.queue().purge(BULK_QUEUE).await;
        self.stats.clear().await;
        self.progress.clear().await;

        let start_time = now_ms() as i64;
        self.stats.put("benchmark_id".to_string(), start_time).await?;
        self.stats.put("start_time".to_string(), start_time).await?;
        self.stats.put("status".to_string(), STATUS_RUNNING).await?;

        let book_ids: Vec<u32> = if validated_only {
            valid_book_ids(count)
        } else {
            (1..=count as u32).collect()
        };

        for book_id in &book_ids {
            let headers = MessageHeaders {
                idempotency_key: format!("bulk:{}", book_id),
                book_id: *book_id,
                node_id: self.node_id.clone(),
            };
            self.bus
                .publish(BULK_QUEUE, headers, &serde_json::json!({ "bookId": book_id }))
                .await?;
        }

        self.stats
            .put("total_books".to_string(), book_ids.len() as i64)
            .await?;

        let info = BulkRunInfo {
            benchmark_id: format!("bench-{}", start_time),
            total_books: book_ids.len(),
            start_time,
            status: "started".to_string(),
            node_id: self.node_id.clone(),
            validated_only,
        };
        tracing::info!(
            "Bulk run {} started: {} book(s), validated={}",
            info.benchmark_id,
            info.total_books,
            validated_only
        );
        Ok(info)
    }

    /// Spawns `pool_size` worker tasks on this node.
    pub async fn start_workers(self: Arc<Self>, pool_size: usize) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Bulk workers already running");
            return;
        }
        self.local_processed.store(0, Ordering::SeqCst);
        self.local_errors.store(0, Ordering::SeqCst);

        let mut workers = self.workers.lock().await;
        for worker_id in 0..pool_size {
            let runner = self.clone();
            workers.push(tokio::spawn(async move {
                runner.worker_loop(worker_id).await;
            }));
        }
        tracing::info!("Started {} bulk worker(s)", pool_size);
    }

    /// Cooperative shutdown: clears the run flag and waits up to 30s for
    /// the workers to drain; stragglers are aborted.
    pub async fn stop_workers(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock().await;
        for mut handle in workers.drain(..) {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Bulk worker did not drain in {:?}; aborting", DRAIN_TIMEOUT);
                handle.abort();
            }
        }
        tracing::info!(
            "Bulk workers stopped. Local: processed={} errors={}",
            self.local_processed.load(Ordering::SeqCst),
            self.local_errors.load(Ordering::SeqCst)
        );
    }

    async fn worker_loop(&self, worker_id: usize) {
        let worker_name = format!("{}-worker-{}", self.node_id, worker_id);
        tracing::info!("{} started", worker_name);

        while self.running.load(Ordering::Relaxed) {
            match self.poll().await {
                Some(message) => {
                    let book_id = message
                        .payload
                        .get("bookId")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32);

                    match book_id {
                        Some(book_id) => {
                            let started = std::time::Instant::now();
                            let receipt = self
                                .pipeline
                                .ingest_from_source(book_id, self.source.as_ref())
                                .await;
                            let ok = receipt.status != IngestStatus::Error;
                            if ok {
                                tracing::info!(
                                    "{}: book {} {:?} in {}ms",
                                    worker_name,
                                    book_id,
                                    receipt.status,
                                    started.elapsed().as_millis()
                                );
                            } else {
                                tracing::warn!(
                                    "{}: book {} failed: {}",
                                    worker_name,
                                    book_id,
                                    receipt.path
                                );
                            }
                            self.record_outcome(ok).await;
                        }
                        None => {
                            tracing::error!("{}: message without bookId; dropping", worker_name);
                            self.record_outcome(false).await;
                        }
                    }
                    // Failed books are counted, not retried: an invalid id
                    // would fail forever.
                    self.bus.queue().ack(&message.id).await;
                }
                None => self.maybe_complete().await,
            }
        }

        tracing::info!("{} stopped", worker_name);
    }

    /// Claims the next pending book, polling for at most one second so the
    /// stop flag stays responsive.
    async fn poll(&self) -> Option<QueueMessage> {
        let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
        loop {
            if let Some(message) = self.bus.queue().claim_next(BULK_QUEUE) {
                return Some(message);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn record_outcome(&self, ok: bool) {
        let suffix = if ok {
            self.local_processed.fetch_add(1, Ordering::SeqCst);
            "processed"
        } else {
            self.local_errors.fetch_add(1, Ordering::SeqCst);
            "errors"
        };
        self.bump(&format!("{}_{}", self.node_id, suffix)).await;
        self.bump(&format!("total_{}", suffix)).await;
    }

    async fn bump(&self, key: &str) {
        let _guard = self.locks.acquire(key).await;
        let current = self.progress.get(&key.to_string()).await.unwrap_or(0);
        if let Err(e) = self.progress.put(key.to_string(), current + 1).await {
            tracing::warn!("Progress update for {} failed: {}", key, e);
        }
    }

    /// Marks the run completed once every enqueued book is settled. Runs
    /// under a shared lock so exactly one worker stamps the end time.
    async fn maybe_complete(&self) {
        let status = self.stats.get(&"status".to_string()).await.unwrap_or(STATUS_IDLE);
        if status != STATUS_RUNNING {
            return;
        }
        let total = self.stats.get(&"total_books".to_string()).await.unwrap_or(0);
        let processed = self.progress.get(&"total_processed".to_string()).await.unwrap_or(0);
        let errors = self.progress.get(&"total_errors".to_string()).await.unwrap_or(0);
        if total == 0 || processed + errors < total {
            return;
        }

        let _guard = self.locks.acquire("bulk:status").await;
        let status = self.stats.get(&"status".to_string()).await.unwrap_or(STATUS_IDLE);
        if status != STATUS_RUNNING {
            return;
        }
        if self.stats.get(&"end_time".to_string()).await.is_none() {
            let _ = self.stats.put("end_time".to_string(), now_ms() as i64).await;
        }
        let _ = self.stats.put("status".to_string(), STATUS_COMPLETED).await;
        tracing::info!("Bulk run completed: {} processed, {} errors", processed, errors);
    }

    /// Aggregated run status across all nodes.
    pub async fn status(&self, alive_node_ids: Vec<String>) -> BulkRunStatus {
        let benchmark_id = self.stats.get(&"benchmark_id".to_string()).await;
        let start_time = self.stats.get(&"start_time".to_string()).await;
        let end_time = self.stats.get(&"end_time".to_string()).await;
        let total_books = self.stats.get(&"total_books".to_string()).await.unwrap_or(0);
        let status = self.stats.get(&"status".to_string()).await.unwrap_or(STATUS_IDLE);

        let total_processed = self
            .progress
            .get(&"total_processed".to_string())
            .await
            .unwrap_or(0);
        let total_errors = self
            .progress
            .get(&"total_errors".to_string())
            .await
            .unwrap_or(0);

        let keys: Vec<String> = alive_node_ids
            .iter()
            .flat_map(|id| [format!("{}_processed", id), format!("{}_errors", id)])
            .collect();
        let per_node = self.progress.get_batch(&keys).await.into_iter().collect();

        let elapsed_ms = start_time
            .map(|start| end_time.unwrap_or(now_ms() as i64) - start)
            .unwrap_or(0);
        let throughput_per_sec = if elapsed_ms > 0 && total_processed > 0 {
            (total_processed * 1000) as f64 / elapsed_ms as f64
        } else {
            0.0
        };

        BulkRunStatus {
            benchmark_id: benchmark_id.map(|id| format!("bench-{}", id)),
            status: match status {
                STATUS_RUNNING => "running",
                STATUS_COMPLETED => "completed",
                _ => "idle",
            }
            .to_string(),
            total_books,
            total_processed,
            total_errors,
            remaining: (total_books - total_processed - total_errors).max(0),
            elapsed_ms,
            throughput_per_sec,
            per_node,
        }
    }

    pub fn stats_map(&self) -> Arc<DistributedMap<String, i64>> {
        self.stats.clone()
    }

    pub fn progress_map(&self) -> Arc<DistributedMap<String, i64>> {
        self.progress.clone()
    }
}
