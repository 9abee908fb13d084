//! Datalake HTTP endpoints.
//!
//! `/replicate` receives copies from peers; the remaining routes expose the
//! local catalog for inspection and for the liveness probe replication uses.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::DatalakeError;
use super::protocol::{ReplicationRequest, ReplicationResponse};
use super::replication::ReplicationClient;
use super::store::{DatalakePartition, DatalakeStats};
use crate::config::ClusterConfig;

#[derive(Serialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub books: Vec<u32>,
}

#[derive(Serialize)]
pub struct LocateResponse {
    pub book_id: u32,
    pub path: Option<String>,
}

/// Liveness probe used by peers before replication.
pub async fn handle_status(
    Extension(config): Extension<Arc<ClusterConfig>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        node_id: config.node_id.clone(),
        status: "ok",
    })
}

/// Stores a replica pushed by a peer. A hash mismatch refuses the write and
/// reports failure in-band; the sender does not retry.
pub async fn handle_replicate(
    Extension(datalake): Extension<Arc<DatalakePartition>>,
    Extension(config): Extension<Arc<ClusterConfig>>,
    Json(request): Json<ReplicationRequest>,
) -> (StatusCode, Json<ReplicationResponse>) {
    let node_id = &config.node_id;
    match datalake.receive_replica(&request).await {
        Ok(()) => {
            tracing::info!(
                "Replicated book {} from {}",
                request.book_id,
                request.source_node_id
            );
            (
                StatusCode::OK,
                Json(ReplicationResponse::success(node_id, request.book_id)),
            )
        }
        Err(e @ DatalakeError::HashMismatch { .. }) => (
            StatusCode::OK,
            Json(ReplicationResponse::failure(
                node_id,
                request.book_id,
                e.to_string(),
            )),
        ),
        Err(e) => {
            tracing::error!("Replica store failed for book {}: {}", request.book_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReplicationResponse::failure(
                    node_id,
                    request.book_id,
                    e.to_string(),
                )),
            )
        }
    }
}

pub async fn handle_list(
    Extension(datalake): Extension<Arc<DatalakePartition>>,
) -> Json<ListResponse> {
    Json(ListResponse {
        books: datalake.list().await,
    })
}

pub async fn handle_stats(
    Extension(datalake): Extension<Arc<DatalakePartition>>,
) -> Json<DatalakeStats> {
    Json(datalake.stats().await)
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
    pub healthy: Vec<String>,
    pub replication_factor: usize,
}

/// Configured peer ring plus which peers currently answer the probe.
pub async fn handle_peers(
    Extension(replicator): Extension<Arc<ReplicationClient>>,
) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: replicator.peers().to_vec(),
        healthy: replicator.healthy_peers().await,
        replication_factor: replicator.replication_factor(),
    })
}

/// Administrative wipe of the local partition.
pub async fn handle_clear(
    Extension(datalake): Extension<Arc<DatalakePartition>>,
) -> StatusCode {
    match datalake.clear().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("Datalake clear failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn handle_locate(
    Extension(datalake): Extension<Arc<DatalakePartition>>,
    Path(book_id): Path<u32>,
) -> (StatusCode, Json<LocateResponse>) {
    match datalake.locate(book_id).await {
        Some(path) => (
            StatusCode::OK,
            Json(LocateResponse { book_id, path: Some(path) }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(LocateResponse { book_id, path: None }),
        ),
    }
}
