//! Replicated content datalake.
//!
//! Each node owns a local partition of the corpus: one directory per book
//! under `YYYYMMDD/HH/<bookId>/` holding the raw download plus the split
//! header and body, and an append-only `ingestions.log` that doubles as the
//! local catalog. Ingested books are pushed to a deterministic slice of the
//! peer ring so `R` copies exist in the union of partitions; receivers verify
//! the content hash before writing and never re-replicate.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod replication;
pub mod splitter;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::DatalakeError;
