use axum::{
    extract::Extension,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::runner::{BulkIngestRunner, BulkRunInfo, BulkRunStatus};
use crate::config::ClusterConfig;
use crate::membership::service::MembershipService;

#[derive(Deserialize)]
pub struct StartRunRequest {
    pub count: usize,
    #[serde(default)]
    pub validated_only: bool,
}

#[derive(Deserialize, Default)]
pub struct StartWorkersRequest {
    pub pool_size: Option<usize>,
}

#[derive(Serialize)]
pub struct WorkersResponse {
    pub status: &'static str,
    pub pool_size: usize,
}

pub async fn handle_start_run(
    Extension(runner): Extension<Arc<BulkIngestRunner>>,
    Json(req): Json<StartRunRequest>,
) -> (StatusCode, Json<Option<BulkRunInfo>>) {
    match runner.start(req.count, req.validated_only).await {
        Ok(info) => (StatusCode::ACCEPTED, Json(Some(info))),
        Err(e) => {
            tracing::error!("Failed to start bulk run: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(None))
        }
    }
}

pub async fn handle_start_workers(
    Extension(runner): Extension<Arc<BulkIngestRunner>>,
    Extension(config): Extension<Arc<ClusterConfig>>,
    Json(req): Json<StartWorkersRequest>,
) -> Json<WorkersResponse> {
    let pool_size = req.pool_size.unwrap_or(config.worker_count);
    runner.start_workers(pool_size).await;
    Json(WorkersResponse { status: "started", pool_size })
}

pub async fn handle_stop_workers(
    Extension(runner): Extension<Arc<BulkIngestRunner>>,
) -> Json<WorkersResponse> {
    runner.stop_workers().await;
    Json(WorkersResponse { status: "stopped", pool_size: 0 })
}

pub async fn handle_run_status(
    Extension(runner): Extension<Arc<BulkIngestRunner>>,
    Extension(membership): Extension<Arc<MembershipService>>,
) -> Json<BulkRunStatus> {
    let alive_ids = membership
        .get_alive_members()
        .into_iter()
        .map(|node| node.id.0)
        .collect();
    Json(runner.status(alive_ids).await)
}
