//! Distributed inverted index.
//!
//! The mapping `term -> postings` lives in a partitioned `DistributedMap`
//! with one primary owner and synchronous backups per partition, alongside
//! three companions: the stats map (`total_documents`,
//! `total_terms_indexed`), the processed-documents map keyed by idempotency
//! key, and the document registry that tracks which book ids are currently
//! installed so `total_documents` counts distinct documents.
//!
//! Reads and writes of a whole document batch are coalesced per owning node;
//! advisory per-term locks serialize the read-modify-write paths that need
//! it (removal sweeps, stats increments).

pub mod handlers;
pub mod inverted;
pub mod types;

#[cfg(test)]
mod tests;

pub use inverted::InvertedIndex;
pub use types::Posting;
