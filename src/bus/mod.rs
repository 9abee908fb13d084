//! Durable at-least-once message bus.
//!
//! The queues are hosted by the cluster itself rather than an external
//! broker: each message is routed by a stable hash of its id to a partition
//! whose primary stores it and synchronously copies it to backups, so
//! messages survive the loss of a node. Delivery is pull-based with leases:
//! a consumer claims a message (Pending -> InFlight with a bounded lease),
//! processes it strictly one-in-flight per consumer task, and acknowledges
//! on success. A handler failure releases the message; a consumer crash
//! lets the lease expire. Either way the message is redelivered, which is
//! why every consumer must be idempotent on the message's idempotency key.
//!
//! Two logical queues exist: `index.request` (ingestion -> indexer) and the
//! informational `doc.ingested` (indexer -> anyone listening).

pub mod client;
pub mod handlers;
pub mod queue;
pub mod types;
