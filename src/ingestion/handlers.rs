use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::pipeline::{IngestReceipt, IngestStatus, IngestionPipeline};
use super::source::DocumentSource;
use crate::datalake::store::DatalakePartition;

#[derive(Serialize)]
pub struct IngestStatusResponse {
    pub book_id: u32,
    pub status: &'static str,
}

/// Fetches a book from the upstream archive and runs the ingest pipeline.
pub async fn handle_ingest(
    Path(book_id): Path<u32>,
    Extension(pipeline): Extension<Arc<IngestionPipeline>>,
    Extension(source): Extension<Arc<dyn DocumentSource>>,
) -> (StatusCode, Json<IngestReceipt>) {
    let receipt = pipeline.ingest_from_source(book_id, source.as_ref()).await;
    let status = match receipt.status {
        IngestStatus::Downloaded => StatusCode::ACCEPTED,
        IngestStatus::Available => StatusCode::OK,
        IngestStatus::Error => StatusCode::BAD_GATEWAY,
    };
    (status, Json(receipt))
}

pub async fn handle_ingest_status(
    Path(book_id): Path<u32>,
    Extension(datalake): Extension<Arc<DatalakePartition>>,
) -> Json<IngestStatusResponse> {
    Json(IngestStatusResponse {
        book_id,
        status: datalake.status(book_id).await,
    })
}
