//! Indexing engine.
//!
//! Consumes `index.request` messages, reads the document body from the local
//! datalake, tokenizes it, and installs the term/position map into the
//! distributed index. Duplicate deliveries are skipped via the idempotency
//! key, which is marked only after the postings are installed; a crash in
//! between redelivers the message and the reinstall is harmless.

pub mod consumer;
pub mod engine;
pub mod tokenizer;

#[cfg(test)]
mod tests;

pub use engine::{IndexOutcome, IndexingEngine};
