use super::pipeline::{IngestStatus, IngestionPipeline};
use super::source::DocumentSource;
use crate::bus::client::BusClient;
use crate::bus::queue::DurableQueue;
use crate::cluster::map::DistributedMap;
use crate::cluster::partitioner::PartitionManager;
use crate::datalake::replication::ReplicationClient;
use crate::datalake::store::DatalakePartition;
use crate::membership::service::MembershipService;
use crate::search::types::BookMetadata;
use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const SAMPLE: &str = "Title: Test Book\n\
Author: Nobody In Particular\n\
Language: en\n\
*** START OF THE PROJECT GUTENBERG EBOOK TEST ***\n\
once upon a midnight dreary\n\
*** END OF THE PROJECT GUTENBERG EBOOK TEST ***\n";

struct FakeSource {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn fetch(&self, _book_id: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("upstream unavailable");
        }
        Ok(SAMPLE.to_string())
    }
}

struct Fixture {
    pipeline: Arc<IngestionPipeline>,
    queue: Arc<DurableQueue>,
    books: Arc<DistributedMap<u32, BookMetadata>>,
    datalake: Arc<DatalakePartition>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let http: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let membership = MembershipService::new("ingest-test".to_string(), bind, http, vec![])
        .await
        .unwrap();
    let partitioner = PartitionManager::new(membership.clone());

    let dir = TempDir::new().unwrap();
    let datalake = Arc::new(DatalakePartition::new(dir.path().to_path_buf()));
    let replicator = Arc::new(ReplicationClient::new(vec![], 1));
    let queue = DurableQueue::new(membership.clone(), partitioner.clone());
    let bus = BusClient::new(queue.clone());
    let books = Arc::new(DistributedMap::new(membership, partitioner, "/books"));

    let pipeline = IngestionPipeline::new(
        datalake.clone(),
        replicator,
        bus,
        books.clone(),
        "index.request".to_string(),
        "ingest-test".to_string(),
    );
    Fixture { pipeline, queue, books, datalake, _dir: dir }
}

#[tokio::test]
async fn first_ingest_downloads_and_publishes() {
    let fixture = fixture().await;
    let receipt = fixture.pipeline.ingest(7, SAMPLE).await;

    assert_eq!(receipt.status, IngestStatus::Downloaded);
    assert!(receipt.path.ends_with("/7"));
    // No peers configured: replication is skipped without error.
    assert_eq!(receipt.replicas_written, 0);

    // The local write is observable and the index request is on the bus.
    assert_eq!(fixture.datalake.status(7).await, "available");
    assert_eq!(fixture.queue.local_depth("index.request"), 1);

    // Metadata landed in the book store with counts.
    let meta = fixture.books.get(&7).await.expect("metadata stored");
    assert_eq!(meta.title, "Test Book");
    assert_eq!(meta.author, "Nobody In Particular");
    assert_eq!(meta.language, "en");
    assert!(meta.word_count > 0);
    assert!(meta.unique_words <= meta.word_count);
}

#[tokio::test]
async fn second_ingest_is_available_without_rewrite() {
    let fixture = fixture().await;
    let first = fixture.pipeline.ingest(7, SAMPLE).await;
    let second = fixture.pipeline.ingest(7, SAMPLE).await;

    assert_eq!(second.status, IngestStatus::Available);
    assert_eq!(second.path, first.path);

    // No duplicate log line, no second bus message.
    assert_eq!(fixture.datalake.list().await, vec![7]);
    assert_eq!(fixture.datalake.stats().await.book_count, 1);
    assert_eq!(fixture.queue.local_depth("index.request"), 1);
}

#[tokio::test]
async fn known_book_skips_the_upstream_fetch() {
    let fixture = fixture().await;
    fixture.pipeline.ingest(7, SAMPLE).await;

    let source = FakeSource { calls: AtomicUsize::new(0), fail: false };
    let receipt = fixture.pipeline.ingest_from_source(7, &source).await;

    assert_eq!(receipt.status, IngestStatus::Available);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0, "no network for known books");
}

#[tokio::test]
async fn fetch_failure_is_an_error_receipt() {
    let fixture = fixture().await;
    let source = FakeSource { calls: AtomicUsize::new(0), fail: true };

    let receipt = fixture.pipeline.ingest_from_source(99, &source).await;
    assert_eq!(receipt.status, IngestStatus::Error);
    assert!(receipt.path.contains("upstream unavailable"));
    assert_eq!(fixture.datalake.status(99).await, "missing");
}

#[tokio::test]
async fn ingest_from_source_fetches_unknown_books() {
    let fixture = fixture().await;
    let source = FakeSource { calls: AtomicUsize::new(0), fail: false };

    let receipt = fixture.pipeline.ingest_from_source(11, &source).await;
    assert_eq!(receipt.status, IngestStatus::Downloaded);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}
