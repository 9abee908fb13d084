//! Bus subscription of the indexing engine.
//!
//! The handler's result drives the ack contract: terminal outcomes
//! (indexed, duplicate, missing body, unparseable payload) acknowledge;
//! transient index failures propagate so the message redelivers.

use std::sync::Arc;

use super::engine::{IndexOutcome, IndexingEngine};
use crate::bus::client::{BusClient, Subscription};
use crate::bus::types::{DocIngested, IndexRequest, MessageHeaders};
use crate::cluster::map::now_ms;

pub fn subscribe(
    engine: Arc<IndexingEngine>,
    bus: Arc<BusClient>,
    indexing_queue: &str,
    ingested_queue: String,
    node_id: String,
    consumers: usize,
) -> Subscription {
    let bus_for_events = bus.clone();

    bus.subscribe(indexing_queue, consumers, move |message| {
        let engine = engine.clone();
        let bus = bus_for_events.clone();
        let ingested_queue = ingested_queue.clone();
        let node_id = node_id.clone();

        async move {
            let request: IndexRequest = match serde_json::from_value(message.payload) {
                Ok(request) => request,
                Err(e) => {
                    // A malformed payload never parses better on redelivery;
                    // log, count, ack.
                    tracing::error!("Malformed index request {}: {}; dropping", message.id, e);
                    engine.note_error();
                    return Ok(());
                }
            };

            match engine.process(&request).await? {
                IndexOutcome::Indexed { terms_indexed } => {
                    let event = DocIngested {
                        book_id: request.book_id,
                        node_id: node_id.clone(),
                        terms_indexed,
                        timestamp: now_ms(),
                    };
                    let headers = MessageHeaders {
                        idempotency_key: request.idempotency_key(),
                        book_id: request.book_id,
                        node_id,
                    };
                    // Informational event; a publish failure must not fail
                    // the already-installed document.
                    if let Err(e) = bus.publish(&ingested_queue, headers, &event).await {
                        tracing::warn!("Failed to publish ingestion event: {}", e);
                    }
                }
                IndexOutcome::Duplicate => {}
                IndexOutcome::MissingBody => {}
            }
            Ok(())
        }
    })
}
