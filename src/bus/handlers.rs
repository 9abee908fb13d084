//! Bus HTTP endpoints for inter-node queue coordination.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::queue::{
    AckRequest, DurableQueue, ForwardPublishRequest, MessageDumpResponse, ReplicateMessageRequest,
    ENDPOINT_ACK, ENDPOINT_FORWARD_PUBLISH, ENDPOINT_PARTITION_DUMP, ENDPOINT_PURGE,
    ENDPOINT_REPLICATE,
};

#[derive(Serialize)]
struct DepthResponse {
    queue: String,
    depth: usize,
}

/// Routes nested under `/bus`.
pub fn bus_router(queue: Arc<DurableQueue>) -> Router {
    Router::new()
        .route(ENDPOINT_FORWARD_PUBLISH, post(handle_forward_publish))
        .route(ENDPOINT_REPLICATE, post(handle_replicate))
        .route(ENDPOINT_ACK, post(handle_ack))
        .route(&format!("{}/:queue", ENDPOINT_PURGE), post(handle_purge))
        .route(
            &format!("{}/:id", ENDPOINT_PARTITION_DUMP),
            get(handle_partition_dump),
        )
        .route("/depth/:queue", get(handle_depth))
        .layer(Extension(queue))
}

/// Publish forwarded from a non-owner: this node stores as primary.
async fn handle_forward_publish(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Json(req): Json<ForwardPublishRequest>,
) -> StatusCode {
    match queue.store_as_primary(req.partition, req.message).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("Forwarded publish failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Primary-to-backup copy of a message.
async fn handle_replicate(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Json(req): Json<ReplicateMessageRequest>,
) -> StatusCode {
    queue.store_replica(req.partition, req.message);
    StatusCode::OK
}

/// Ack propagated from the primary; drops the local copy.
async fn handle_ack(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Json(req): Json<AckRequest>,
) -> StatusCode {
    queue.ack_local(&req.message_id);
    StatusCode::OK
}

async fn handle_purge(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Path(queue_name): Path<String>,
) -> StatusCode {
    queue.purge_local(&queue_name);
    StatusCode::OK
}

async fn handle_partition_dump(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Path(partition): Path<u32>,
) -> Json<MessageDumpResponse> {
    Json(MessageDumpResponse {
        partition,
        messages: queue.dump_partition(partition),
    })
}

async fn handle_depth(
    Extension(queue): Extension<Arc<DurableQueue>>,
    Path(queue_name): Path<String>,
) -> Json<DepthResponse> {
    Json(DepthResponse {
        depth: queue.local_depth(&queue_name),
        queue: queue_name,
    })
}
