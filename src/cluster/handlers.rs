//! Storage API handlers.
//!
//! Axum endpoints that expose one `DistributedMap` over HTTP. The handlers
//! are generic over the stored types; [`map_router`] assembles them into a
//! router that the node nests under the map's base path.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use super::map::DistributedMap;
use super::protocol::*;

/// Builds the HTTP surface for one map and attaches the map as an extension.
pub fn map_router<K, V>(map: Arc<DistributedMap<K, V>>) -> Router
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Router::new()
        .route(ENDPOINT_PUT, post(handle_put::<K, V>))
        .route(&format!("{}/:key", ENDPOINT_GET), get(handle_get::<K, V>))
        .route(
            &format!("{}/:key", ENDPOINT_GET_INTERNAL),
            get(handle_get_internal::<K, V>),
        )
        .route(ENDPOINT_FORWARD_PUT, post(handle_forward_put::<K, V>))
        .route(ENDPOINT_REPLICATE, post(handle_replicate::<K, V>))
        .route(ENDPOINT_GET_BATCH, post(handle_get_batch::<K, V>))
        .route(ENDPOINT_PUT_BATCH, post(handle_put_batch::<K, V>))
        .route(ENDPOINT_REPLICATE_BATCH, post(handle_replicate_batch::<K, V>))
        .route(
            &format!("{}/:id", ENDPOINT_PARTITION_DUMP),
            get(handle_partition_dump::<K, V>),
        )
        .route(ENDPOINT_CLEAR, post(handle_clear::<K, V>))
        .layer(Extension(map))
}

fn parse_key<K>(raw: &str) -> Result<K, StatusCode>
where
    K: FromStr,
    <K as FromStr>::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: <K as FromStr>::Err| {
        tracing::error!("Failed to parse key {:?}: {}", raw, e);
        StatusCode::BAD_REQUEST
    })
}

/// Public write. Routing (local vs forward) happens inside the map.
async fn handle_put<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let Ok(key) = parse_key::<K>(&req.key) else {
        return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
    };
    let value: V = match serde_json::from_str(&req.value_json) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to decode value: {}", e);
            return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
        }
    };

    match map.put_with_op(key, value, req.op_id).await {
        Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(e) => {
            tracing::error!("Put failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PutResponse { success: false }),
            )
        }
    }
}

/// Public read. Transparently fetches from the owning node when needed.
async fn handle_get<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Path(key_str): Path<String>,
) -> (StatusCode, Json<GetResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let Ok(key) = parse_key::<K>(&key_str) else {
        return (StatusCode::BAD_REQUEST, Json(GetResponse { value_json: None }));
    };

    match map.get(&key).await {
        Some(value) => match serde_json::to_string(&value) {
            Ok(value_json) => (
                StatusCode::OK,
                Json(GetResponse { value_json: Some(value_json) }),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetResponse { value_json: None }),
            ),
        },
        None => (StatusCode::NOT_FOUND, Json(GetResponse { value_json: None })),
    }
}

/// Local-only read, used by peers during routing and resync.
async fn handle_get_internal<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Path(key_str): Path<String>,
) -> (StatusCode, Json<GetResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let Ok(key) = parse_key::<K>(&key_str) else {
        return (StatusCode::BAD_REQUEST, Json(GetResponse { value_json: None }));
    };

    match map.get_local(&key) {
        Some(value) => match serde_json::to_string(&value) {
            Ok(value_json) => (
                StatusCode::OK,
                Json(GetResponse { value_json: Some(value_json) }),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetResponse { value_json: None }),
            ),
        },
        None => (StatusCode::NOT_FOUND, Json(GetResponse { value_json: None })),
    }
}

/// Write forwarded by a non-owner. This node stores as primary without
/// recomputing ownership, preventing forwarding loops.
async fn handle_forward_put<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<ForwardPutRequest>,
) -> (StatusCode, Json<PutResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let Ok(key) = parse_key::<K>(&req.key) else {
        return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
    };
    let value: V = match serde_json::from_str(&req.value_json) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to decode forwarded value: {}", e);
            return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
        }
    };

    match map.store_as_primary(req.partition, req.op_id, key, value).await {
        Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(e) => {
            tracing::error!("Forwarded put failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PutResponse { success: false }),
            )
        }
    }
}

/// Primary-to-backup synchronization. Idempotent on `op_id`.
async fn handle_replicate<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<ReplicateRequest>,
) -> (StatusCode, Json<PutResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let Ok(key) = parse_key::<K>(&req.key) else {
        return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
    };
    let value: V = match serde_json::from_str(&req.value_json) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to decode replica value: {}", e);
            return (StatusCode::BAD_REQUEST, Json(PutResponse { success: false }));
        }
    };

    match map.store_replica(req.partition, req.op_id, key, value) {
        Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(e) => {
            tracing::error!("Replica store failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PutResponse { success: false }),
            )
        }
    }
}

/// Batched local-only read: returns whichever of the requested keys exist here.
async fn handle_get_batch<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<BatchGetRequest>,
) -> (StatusCode, Json<BatchGetResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut entries = Vec::new();
    for key_str in req.keys {
        let Ok(key) = key_str.parse::<K>() else { continue };
        if let Some(value) = map.get_local(&key) {
            if let Ok(value_json) = serde_json::to_string(&value) {
                entries.push(KeyValueJson { key: key_str, value_json });
            }
        }
    }
    (StatusCode::OK, Json(BatchGetResponse { entries }))
}

/// Batched write forwarded to this node as primary.
async fn handle_put_batch<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<BatchPutRequest>,
) -> (StatusCode, Json<BatchPutResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut entries: Vec<(K, V)> = Vec::with_capacity(req.entries.len());
    for item in req.entries {
        let Ok(key) = parse_key::<K>(&item.key) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(BatchPutResponse { success: false, stored: 0 }),
            );
        };
        let value: V = match serde_json::from_str(&item.value_json) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed to decode batched value: {}", e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(BatchPutResponse { success: false, stored: 0 }),
                );
            }
        };
        entries.push((key, value));
    }

    match map.store_batch_forwarded(req.op_id, entries).await {
        Ok(stored) => (StatusCode::OK, Json(BatchPutResponse { success: true, stored })),
        Err(e) => {
            tracing::error!("Batched put failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BatchPutResponse { success: false, stored: 0 }),
            )
        }
    }
}

/// Batched primary-to-backup synchronization.
async fn handle_replicate_batch<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Json(req): Json<ReplicateBatchRequest>,
) -> (StatusCode, Json<BatchPutResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut entries: Vec<(u32, K, V)> = Vec::with_capacity(req.entries.len());
    for item in req.entries {
        let Ok(key) = parse_key::<K>(&item.key) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(BatchPutResponse { success: false, stored: 0 }),
            );
        };
        let value: V = match serde_json::from_str(&item.value_json) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed to decode batched replica: {}", e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(BatchPutResponse { success: false, stored: 0 }),
                );
            }
        };
        entries.push((item.partition, key, value));
    }
    let stored = entries.len();

    match map.store_replica_batch(req.op_id, entries) {
        Ok(_) => (StatusCode::OK, Json(BatchPutResponse { success: true, stored })),
        Err(e) => {
            tracing::error!("Batched replica store failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BatchPutResponse { success: false, stored: 0 }),
            )
        }
    }
}

/// Bulk export of one partition for anti-entropy.
async fn handle_partition_dump<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
    Path(partition): Path<u32>,
) -> (StatusCode, Json<PartitionDumpResponse>)
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let entries = map
        .dump_partition(partition)
        .into_iter()
        .filter_map(|(key, value)| match serde_json::to_string(&value) {
            Ok(value_json) => Some(KeyValueJson { key: key.to_string(), value_json }),
            Err(e) => {
                tracing::warn!("Failed to serialize partition entry: {}", e);
                None
            }
        })
        .collect();

    (StatusCode::OK, Json(PartitionDumpResponse { partition, entries }))
}

/// Administrative local clear, invoked as part of a cluster-wide `clear()`.
async fn handle_clear<K, V>(
    Extension(map): Extension<Arc<DistributedMap<K, V>>>,
) -> StatusCode
where
    K: ToString + FromStr + Clone + Hash + Eq + Send + Sync + 'static,
    <K as FromStr>::Err: std::fmt::Display,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    map.clear_local();
    StatusCode::OK
}
