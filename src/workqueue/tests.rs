use super::runner::{BulkIngestRunner, BULK_QUEUE, PROGRESS_BASE_PATH, STATS_BASE_PATH};
use crate::bus::client::BusClient;
use crate::bus::queue::DurableQueue;
use crate::cluster::map::DistributedMap;
use crate::cluster::partitioner::PartitionManager;
use crate::datalake::replication::ReplicationClient;
use crate::datalake::store::DatalakePartition;
use crate::ingestion::pipeline::IngestionPipeline;
use crate::ingestion::source::DocumentSource;
use crate::membership::service::MembershipService;
use crate::search::types::BookMetadata;
use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct ScriptedSource {
    // Books whose fetch fails.
    failing: Vec<u32>,
}

#[async_trait]
impl DocumentSource for ScriptedSource {
    async fn fetch(&self, book_id: u32) -> Result<String> {
        if self.failing.contains(&book_id) {
            anyhow::bail!("no such book");
        }
        Ok(format!(
            "Title: Book {id}\n*** START OF THE EBOOK ***\ncontent of book {id}\n*** END OF THE EBOOK ***\n",
            id = book_id
        ))
    }
}

struct Fixture {
    runner: Arc<BulkIngestRunner>,
    queue: Arc<DurableQueue>,
    _dir: TempDir,
}

async fn fixture(failing: Vec<u32>) -> Fixture {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let http: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let membership = MembershipService::new("bulk-test".to_string(), bind, http, vec![])
        .await
        .unwrap();
    let partitioner = PartitionManager::new(membership.clone());

    let dir = TempDir::new().unwrap();
    let datalake = Arc::new(DatalakePartition::new(dir.path().to_path_buf()));
    let replicator = Arc::new(ReplicationClient::new(vec![], 1));
    let queue = DurableQueue::new(membership.clone(), partitioner.clone());
    let bus = BusClient::new(queue.clone());
    let books: Arc<DistributedMap<u32, BookMetadata>> = Arc::new(DistributedMap::new(
        membership.clone(),
        partitioner.clone(),
        "/books",
    ));

    let pipeline = IngestionPipeline::new(
        datalake,
        replicator,
        bus.clone(),
        books,
        "index.request".to_string(),
        "bulk-test".to_string(),
    );

    let stats = Arc::new(DistributedMap::new(
        membership.clone(),
        partitioner.clone(),
        STATS_BASE_PATH,
    ));
    let progress = Arc::new(DistributedMap::new(membership, partitioner, PROGRESS_BASE_PATH));

    let runner = BulkIngestRunner::new(
        bus,
        stats,
        progress,
        pipeline,
        Arc::new(ScriptedSource { failing }),
        "bulk-test".to_string(),
    );
    Fixture { runner, queue, _dir: dir }
}

async fn wait_for_completion(fixture: &Fixture) -> super::runner::BulkRunStatus {
    for _ in 0..100 {
        let status = fixture.runner.status(vec!["bulk-test".to_string()]).await;
        if status.status == "completed" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    fixture.runner.status(vec!["bulk-test".to_string()]).await
}

#[tokio::test]
async fn start_enqueues_and_sets_running() {
    let fixture = fixture(vec![]).await;
    let info = fixture.runner.start(3, false).await.unwrap();

    assert_eq!(info.total_books, 3);
    assert!(info.benchmark_id.starts_with("bench-"));
    assert_eq!(fixture.queue.local_depth(BULK_QUEUE), 3);

    let status = fixture.runner.status(vec![]).await;
    assert_eq!(status.status, "running");
    assert_eq!(status.total_books, 3);
    assert_eq!(status.remaining, 3);
}

#[tokio::test]
async fn validated_run_uses_the_curated_list() {
    let fixture = fixture(vec![]).await;
    let info = fixture.runner.start(4, true).await.unwrap();
    assert_eq!(info.total_books, 4);
    assert!(info.validated_only);
}

#[tokio::test]
async fn workers_drain_the_queue_and_complete_the_run() {
    let fixture = fixture(vec![]).await;
    fixture.runner.start(4, false).await.unwrap();
    fixture.runner.clone().start_workers(2).await;

    let status = wait_for_completion(&fixture).await;
    assert_eq!(status.status, "completed", "status: {:?}", status);
    assert_eq!(status.total_processed, 4);
    assert_eq!(status.total_errors, 0);
    assert_eq!(status.remaining, 0);
    assert!(status.throughput_per_sec > 0.0);
    assert_eq!(status.per_node.get("bulk-test_processed"), Some(&4));

    fixture.runner.stop_workers().await;
    assert_eq!(fixture.queue.local_depth(BULK_QUEUE), 0);
}

#[tokio::test]
async fn failed_fetches_are_counted_not_retried() {
    let fixture = fixture(vec![2]).await;
    fixture.runner.start(3, false).await.unwrap();
    fixture.runner.clone().start_workers(1).await;

    let status = wait_for_completion(&fixture).await;
    assert_eq!(status.status, "completed");
    assert_eq!(status.total_processed, 2);
    assert_eq!(status.total_errors, 1);

    fixture.runner.stop_workers().await;
    // The failing book was acked, not requeued.
    assert_eq!(fixture.queue.local_depth(BULK_QUEUE), 0);
}

#[tokio::test]
async fn idle_status_before_any_run() {
    let fixture = fixture(vec![]).await;
    let status = fixture.runner.status(vec![]).await;
    assert_eq!(status.status, "idle");
    assert_eq!(status.total_books, 0);
    assert_eq!(status.elapsed_ms, 0);
    assert_eq!(status.throughput_per_sec, 0.0);
}

#[tokio::test]
async fn restart_clears_previous_run_state() {
    let fixture = fixture(vec![]).await;
    fixture.runner.start(2, false).await.unwrap();
    fixture.runner.clone().start_workers(1).await;
    wait_for_completion(&fixture).await;
    fixture.runner.stop_workers().await;

    // A fresh run resets counters and queue.
    fixture.runner.start(1, false).await.unwrap();
    let status = fixture.runner.status(vec!["bulk-test".to_string()]).await;
    assert_eq!(status.status, "running");
    assert_eq!(status.total_processed, 0);
    assert_eq!(status.remaining, 1);
    assert_eq!(fixture.queue.local_depth(BULK_QUEUE), 1);
}
