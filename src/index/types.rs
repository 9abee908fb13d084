use serde::{Deserialize, Serialize};

/// One term's occurrences within one document.
///
/// Positions are 0-based offsets in the tokenized body, strictly increasing.
/// The term frequency is the number of positions. At most one posting exists
/// per `(term, bookId)` pair; reindexing replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    pub book_id: u32,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(book_id: u32, positions: Vec<u32>) -> Self {
        Self { book_id, positions }
    }

    pub fn term_frequency(&self) -> usize {
        self.positions.len()
    }
}

/// Snapshot of index-wide counters and local footprint.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatsReport {
    pub total_documents: i64,
    pub total_terms_indexed: i64,
    pub local_term_entries: usize,
    pub local_term_partitions: usize,
    pub local_processed_entries: usize,
    pub cluster_size: usize,
}
