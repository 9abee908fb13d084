//! Cluster-shared bulk ingest queue.
//!
//! Bulk runs enqueue pending book ids onto a dedicated durable queue
//! (`bulk.ingest`) that every node's worker pool drains cooperatively.
//! Two shared maps track the run: `stats` (benchmark id, start/end time,
//! total books, status) and `progress` (per-node processed/error counters
//! plus cluster totals). The first worker to observe the run drained flips
//! the status to completed and stamps the end time.

pub mod handlers;
pub mod runner;
pub mod valid_ids;

#[cfg(test)]
mod tests;

pub use runner::BulkIngestRunner;
