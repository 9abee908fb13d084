use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;

use gutensearch::bus::client::BusClient;
use gutensearch::bus::handlers::bus_router;
use gutensearch::bus::queue::DurableQueue;
use gutensearch::cluster::handlers::map_router;
use gutensearch::cluster::map::DistributedMap;
use gutensearch::cluster::partitioner::PartitionManager;
use gutensearch::config::ClusterConfig;
use gutensearch::datalake::replication::ReplicationClient;
use gutensearch::datalake::store::DatalakePartition;
use gutensearch::index::handlers::index_router;
use gutensearch::index::InvertedIndex;
use gutensearch::indexer::engine::{IndexerCounters, IndexingEngine, RebuildReport};
use gutensearch::ingestion::{DocumentSource, GutenbergSource, IngestionPipeline};
use gutensearch::membership::service::MembershipService;
use gutensearch::search::engine::SearchEngine;
use gutensearch::search::types::BookMetadata;
use gutensearch::workqueue::runner::{PROGRESS_BASE_PATH, STATS_BASE_PATH};
use gutensearch::workqueue::BulkIngestRunner;
use gutensearch::{datalake, indexer, ingestion, search, workqueue};

const RESYNC_INTERVAL: Duration = Duration::from_secs(15);
const CLUSTER_REPORT_INTERVAL: Duration = Duration::from_secs(30);
const CONSUMER_DRAIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} --bind <addr:port> [--seed <addr:port>]...", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:5000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:5001 --seed 127.0.0.1:5000",
            args[0]
        );
        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut seed_nodes: Vec<SocketAddr> = vec![];
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--seed" => {
                seed_nodes.push(args[i + 1].parse()?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    let bind_addr = bind_addr.expect("--bind is required");

    let config = Arc::new(ClusterConfig::load(bind_addr, seed_nodes)?);
    let http_addr = config.http_bind();

    tracing::info!("Starting node {} on {}", config.node_id, bind_addr);
    if config.seed_nodes.is_empty() {
        tracing::info!("Starting as seed node (founder)");
    } else {
        tracing::info!("Seed nodes: {:?}", config.seed_nodes);
    }

    // 1. Membership (UDP gossip). Cluster connectivity is established before
    // the HTTP surface accepts anything.
    let membership = MembershipService::new(
        config.node_id.clone(),
        config.gossip_bind,
        http_addr,
        config.seed_nodes.clone(),
    )
    .await?;
    membership.clone().start();

    // 2. Distributed substrate: partitioner, index, metadata store, bus.
    let partitioner =
        PartitionManager::new_with_backups(membership.clone(), config.backup_count);

    let index = InvertedIndex::new(membership.clone(), partitioner.clone());
    let books: Arc<DistributedMap<u32, BookMetadata>> = Arc::new(DistributedMap::new(
        membership.clone(),
        partitioner.clone(),
        "/books",
    ));

    let queue = DurableQueue::new(membership.clone(), partitioner.clone());
    let bus = BusClient::new(queue.clone());

    // 3. Datalake and ingestion pipeline.
    let datalake_store = Arc::new(DatalakePartition::new(config.datalake_dir.clone()));
    let replicator = Arc::new(ReplicationClient::new(
        config.datalake_peers.clone(),
        config.replication_factor,
    ));
    let pipeline = IngestionPipeline::new(
        datalake_store.clone(),
        replicator.clone(),
        bus.clone(),
        books.clone(),
        config.indexing_queue.clone(),
        config.node_id.clone(),
    );
    let source: Arc<dyn DocumentSource> = Arc::new(GutenbergSource::new());

    // 4. Indexing engine consuming the bus.
    let engine = IndexingEngine::new(index.clone(), datalake_store.clone());
    let indexing_subscription = indexer::consumer::subscribe(
        engine.clone(),
        bus.clone(),
        &config.indexing_queue,
        config.ingested_queue.clone(),
        config.node_id.clone(),
        config.consumer_count,
    );
    // Drain the informational queue so events do not pile up unread.
    let ingested_subscription = bus.subscribe(&config.ingested_queue, 1, |message| async move {
        tracing::info!(
            "Document ingested: book {} ({} attempt(s))",
            message.headers.book_id,
            message.attempts
        );
        Ok(())
    });

    // 5. Search engine and bulk runner.
    let search_engine = SearchEngine::new(index.clone(), books.clone());
    let bulk_stats = Arc::new(DistributedMap::new(
        membership.clone(),
        partitioner.clone(),
        STATS_BASE_PATH,
    ));
    let bulk_progress = Arc::new(DistributedMap::new(
        membership.clone(),
        partitioner.clone(),
        PROGRESS_BASE_PATH,
    ));
    let runner = BulkIngestRunner::new(
        bus.clone(),
        bulk_stats.clone(),
        bulk_progress.clone(),
        pipeline.clone(),
        source.clone(),
        config.node_id.clone(),
    );

    // 6. HTTP router.
    let bulk_routes = Router::new()
        .route("/start", post(workqueue::handlers::handle_start_run))
        .route("/status", get(workqueue::handlers::handle_run_status))
        .route("/workers/start", post(workqueue::handlers::handle_start_workers))
        .route("/workers/stop", post(workqueue::handlers::handle_stop_workers))
        .nest("/stats", map_router(bulk_stats.clone()))
        .nest("/progress", map_router(bulk_progress.clone()));

    let app = Router::new()
        .route("/health/routes", get(handle_routes))
        .route("/health/stats", get(handle_node_stats))
        // Datalake surface
        .route("/status", get(datalake::handlers::handle_status))
        .route("/replicate", post(datalake::handlers::handle_replicate))
        .route("/datalake/list", get(datalake::handlers::handle_list))
        .route("/datalake/stats", get(datalake::handlers::handle_stats))
        .route("/datalake/locate/:book_id", get(datalake::handlers::handle_locate))
        .route("/datalake/peers", get(datalake::handlers::handle_peers))
        .route("/datalake/clear", post(datalake::handlers::handle_clear))
        // Ingestion
        .route("/ingest/:book_id", post(ingestion::handlers::handle_ingest))
        .route(
            "/ingest/status/:book_id",
            get(ingestion::handlers::handle_ingest_status),
        )
        // Search
        .route("/search", get(search::handlers::handle_search))
        .route("/search/terms", get(search::handlers::handle_term_stats))
        // Indexer admin
        .route("/indexer/counters", get(handle_indexer_counters))
        .route("/indexer/rebuild", post(handle_rebuild))
        // Distributed structures
        .nest("/index", index_router(index.clone()))
        .nest("/books", map_router(books.clone()))
        .nest("/bus", bus_router(queue.clone()))
        .nest("/bulk", bulk_routes)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(queue.clone()))
        .layer(Extension(config.clone()))
        .layer(Extension(membership.clone()))
        .layer(Extension(datalake_store.clone()))
        .layer(Extension(replicator.clone()))
        .layer(Extension(pipeline.clone()))
        .layer(Extension(source.clone()))
        .layer(Extension(search_engine.clone()))
        .layer(Extension(engine.clone()))
        .layer(Extension(runner.clone()));

    // 7. Anti-entropy loops for every replicated structure.
    spawn_resync_loop("terms", index.terms_map());
    spawn_resync_loop("counters", index.stats_map());
    spawn_resync_loop("processed", index.processed_map());
    spawn_resync_loop("docs", index.documents_map());
    spawn_resync_loop("books", books.clone());
    spawn_resync_loop("bulk-stats", bulk_stats);
    spawn_resync_loop("bulk-progress", bulk_progress);
    {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESYNC_INTERVAL);
            loop {
                interval.tick().await;
                queue.resync_round().await;
            }
        });
    }

    // 8. Periodic cluster report.
    {
        let membership = membership.clone();
        let queue = queue.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLUSTER_REPORT_INTERVAL);
            loop {
                interval.tick().await;
                let alive = membership.get_alive_members();
                tracing::info!(
                    "Cluster: {} alive node(s); local queue depth {}",
                    alive.len(),
                    queue.local_depth(&config.indexing_queue)
                );
                for node in alive {
                    tracing::debug!(
                        "  - {:?} gossip={} http={} (inc={})",
                        node.id,
                        node.gossip_addr,
                        node.http_addr,
                        node.incarnation
                    );
                }
            }
        });
    }

    // 9. Serve until ctrl-c, then shut down in order: stop intake, stop
    // workers, drain consumers.
    tracing::info!("HTTP server listening on {}", http_addr);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    runner.stop_workers().await;
    indexing_subscription.shutdown(CONSUMER_DRAIN).await;
    ingested_subscription.shutdown(CONSUMER_DRAIN).await;
    tracing::info!("Node {} stopped", config.node_id);

    Ok(())
}

fn spawn_resync_loop<K, V>(name: &'static str, map: Arc<DistributedMap<K, V>>)
where
    K: ToString + std::str::FromStr + Clone + std::hash::Hash + Eq + Send + Sync + 'static,
    <K as std::str::FromStr>::Err: std::fmt::Display,
    V: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RESYNC_INTERVAL);
        loop {
            interval.tick().await;
            map.resync_round(name).await;
        }
    });
}

#[derive(Serialize)]
struct RoutesResponse {
    routes: Vec<&'static str>,
}

async fn handle_routes() -> Json<RoutesResponse> {
    Json(RoutesResponse {
        routes: vec![
            "/health/routes",
            "/health/stats",
            "/status",
            "/replicate",
            "/datalake/list",
            "/datalake/stats",
            "/datalake/locate/:book_id",
            "/datalake/peers",
            "/datalake/clear",
            "/ingest/:book_id",
            "/ingest/status/:book_id",
            "/search",
            "/search/terms",
            "/indexer/counters",
            "/indexer/rebuild",
            "/index/stats",
            "/index/postings/:term",
            "/index/remove/:book_id",
            "/index/clear",
            "/bulk/start",
            "/bulk/status",
            "/bulk/workers/start",
            "/bulk/workers/stop",
        ],
    })
}

#[derive(Serialize)]
struct NodeInfo {
    node_id: String,
    gossip_addr: String,
    http_addr: String,
}

#[derive(Serialize)]
struct NodeStatsResponse {
    node_id: String,
    alive_nodes: usize,
    nodes: Vec<NodeInfo>,
    datalake_books: usize,
    datalake_bytes: u64,
    index_local_entries: usize,
    index_total_documents: i64,
    indexing_queue_depth: usize,
    indexer: IndexerCounters,
    cpu_usage: f32,
    mem_used_mb: u64,
    mem_total_mb: u64,
}

async fn handle_node_stats(
    Extension(config): Extension<Arc<ClusterConfig>>,
    Extension(membership): Extension<Arc<MembershipService>>,
    Extension(datalake_store): Extension<Arc<DatalakePartition>>,
    Extension(engine): Extension<Arc<IndexingEngine>>,
    Extension(queue): Extension<Arc<DurableQueue>>,
) -> Json<NodeStatsResponse> {
    let alive = membership.get_alive_members();
    let nodes = alive
        .iter()
        .map(|node| NodeInfo {
            node_id: node.id.0.clone(),
            gossip_addr: node.gossip_addr.to_string(),
            http_addr: node.http_addr.to_string(),
        })
        .collect();

    let lake_stats = datalake_store.stats().await;
    let index_stats = engine.index().stats().await;

    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();

    Json(NodeStatsResponse {
        node_id: config.node_id.clone(),
        alive_nodes: alive.len(),
        nodes,
        datalake_books: lake_stats.book_count,
        datalake_bytes: lake_stats.total_bytes,
        index_local_entries: index_stats.local_term_entries,
        index_total_documents: index_stats.total_documents,
        indexing_queue_depth: queue.local_depth(&config.indexing_queue),
        indexer: engine.counters(),
        cpu_usage: sys.global_cpu_info().cpu_usage(),
        mem_used_mb: sys.used_memory() / (1024 * 1024),
        mem_total_mb: sys.total_memory() / (1024 * 1024),
    })
}

async fn handle_indexer_counters(
    Extension(engine): Extension<Arc<IndexingEngine>>,
) -> Json<IndexerCounters> {
    Json(engine.counters())
}

async fn handle_rebuild(
    Extension(engine): Extension<Arc<IndexingEngine>>,
) -> (axum::http::StatusCode, Json<Option<RebuildReport>>) {
    match engine.rebuild().await {
        Ok(report) => (axum::http::StatusCode::OK, Json(Some(report))),
        Err(e) => {
            tracing::error!("Index rebuild failed: {}", e);
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, Json(None))
        }
    }
}
