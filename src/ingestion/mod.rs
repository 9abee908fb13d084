//! Document acquisition and the local ingest pipeline.
//!
//! The upstream archive is abstracted behind [`source::DocumentSource`]; the
//! pipeline takes the fetched bytes through the full ingest path: local
//! write (split, files, log), metadata extraction into the book store,
//! best-effort replication to the peer ring, and the `index.request`
//! publish that drives the indexer.

pub mod handlers;
pub mod pipeline;
pub mod source;

#[cfg(test)]
mod tests;

pub use pipeline::{IngestReceipt, IngestStatus, IngestionPipeline};
pub use source::{DocumentSource, GutenbergSource};
