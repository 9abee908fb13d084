//! Index HTTP endpoints: stats, postings inspection, and the internal
//! removal sweep. The term/stats/processed/registry maps mount their own
//! generic storage routes separately.

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::inverted::{InvertedIndex, ENDPOINT_REMOVE_DOCUMENT};
use super::types::{IndexStatsReport, Posting};

#[derive(Serialize)]
struct PostingsResponse {
    term: String,
    document_frequency: usize,
    postings: Vec<Posting>,
}

#[derive(Serialize)]
struct RemovalResponse {
    book_id: u32,
    terms_removed: usize,
}

/// Routes nested under `/index`: the stats/admin surface plus the storage
/// endpoints of the four backing maps, each under its own sub-path matching
/// the map's base path.
pub fn index_router(index: Arc<InvertedIndex>) -> Router {
    use crate::cluster::handlers::map_router;

    Router::new()
        .route("/stats", get(handle_stats))
        .route("/postings/:term", get(handle_postings))
        .route("/remove/:book_id", post(handle_remove_document))
        .route("/clear", post(handle_clear))
        .route(
            &format!("{}/:book_id", ENDPOINT_REMOVE_DOCUMENT),
            post(handle_remove_local),
        )
        .nest("/terms", map_router(index.terms_map()))
        .nest("/counters", map_router(index.stats_map()))
        .nest("/processed", map_router(index.processed_map()))
        .nest("/docs", map_router(index.documents_map()))
        .layer(Extension(index))
}

async fn handle_stats(
    Extension(index): Extension<Arc<InvertedIndex>>,
) -> Json<IndexStatsReport> {
    Json(index.stats().await)
}

async fn handle_postings(
    Extension(index): Extension<Arc<InvertedIndex>>,
    Path(term): Path<String>,
) -> Json<PostingsResponse> {
    let postings = index.get(&term).await;
    Json(PostingsResponse {
        document_frequency: postings.len(),
        postings,
        term,
    })
}

/// Public admin op: removes a document cluster-wide.
async fn handle_remove_document(
    Extension(index): Extension<Arc<InvertedIndex>>,
    Path(book_id): Path<u32>,
) -> Json<RemovalResponse> {
    let terms_removed = match index.remove_document(book_id).await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Document removal failed for {}: {}", book_id, e);
            0
        }
    };
    Json(RemovalResponse { book_id, terms_removed })
}

/// Internal: local part of the cluster-wide removal sweep.
async fn handle_remove_local(
    Extension(index): Extension<Arc<InvertedIndex>>,
    Path(book_id): Path<u32>,
) -> Json<RemovalResponse> {
    let terms_removed = index.remove_document_local(book_id).await;
    Json(RemovalResponse { book_id, terms_removed })
}

async fn handle_clear(Extension(index): Extension<Arc<InvertedIndex>>) -> Json<IndexStatsReport> {
    index.clear().await;
    Json(index.stats().await)
}
