//! Ranking and retrieval.
//!
//! The score of a candidate document is `sum((1 + ln tf) * idf)` over the
//! query terms it contains, with `idf = ln((N + 1) / (df + 1)) + 1` and `N`
//! the number of distinct indexed documents. Ties break on ascending book
//! id so results are stable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::types::{
    BookMetadata, QueryMode, SearchFilters, SearchHit, SearchResultItem, TermStats,
};
use crate::cluster::map::DistributedMap;
use crate::index::types::Posting;
use crate::index::InvertedIndex;
use crate::indexer::tokenizer::{query_terms, StopList};

pub struct SearchEngine {
    index: Arc<InvertedIndex>,
    books: Arc<DistributedMap<u32, BookMetadata>>,
    stop_list: StopList,
}

impl SearchEngine {
    pub fn new(
        index: Arc<InvertedIndex>,
        books: Arc<DistributedMap<u32, BookMetadata>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            books,
            stop_list: StopList::default(),
        })
    }

    /// Runs a ranked boolean query. Returns at most `limit` hits ordered by
    /// descending score, ties broken by ascending book id.
    pub async fn search(&self, raw_query: &str, mode: QueryMode, limit: usize) -> Vec<SearchHit> {
        let started = Instant::now();

        let terms = query_terms(raw_query, &self.stop_list);
        if terms.is_empty() {
            return Vec::new();
        }

        // One batched fetch per owning node for all query terms.
        let postings_by_term = self.index.get_all(&terms).await;
        let total_documents = self.index.total_documents().await as f64;

        let mut idf_by_term: HashMap<&String, f64> = HashMap::with_capacity(terms.len());
        for term in &terms {
            let df = postings_by_term.get(term).map(|p| p.len()).unwrap_or(0);
            idf_by_term.insert(term, idf(total_documents, df));
        }

        let Some(candidates) = candidate_set(&terms, &postings_by_term, mode) else {
            return Vec::new();
        };

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|book_id| {
                let mut score = 0.0;
                for term in &terms {
                    let Some(postings) = postings_by_term.get(term) else { continue };
                    if let Some(posting) = postings.iter().find(|p| p.book_id == book_id) {
                        let tf = posting.term_frequency() as f64;
                        score += (1.0 + tf.ln()) * idf_by_term[term];
                    }
                }
                SearchHit { book_id, score }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.book_id.cmp(&b.book_id))
        });
        hits.truncate(limit);

        tracing::info!(
            "Search '{}' ({}): {} hit(s) in {}ms",
            raw_query,
            mode.as_str(),
            hits.len(),
            started.elapsed().as_millis()
        );
        hits
    }

    /// Ranked query plus metadata decoration and post-ranking filters.
    /// Filtering can shrink the result below `limit`; there is no top-up.
    pub async fn search_decorated(
        &self,
        raw_query: &str,
        mode: QueryMode,
        limit: usize,
        filters: &SearchFilters,
    ) -> (usize, Vec<SearchResultItem>) {
        let hits = self.search(raw_query, mode, limit).await;
        let total_count = hits.len();

        let ids: Vec<u32> = hits.iter().map(|h| h.book_id).collect();
        let mut metadata = self.books.get_batch(&ids).await;

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                let meta = metadata
                    .remove(&hit.book_id)
                    .unwrap_or_else(|| placeholder_metadata(hit.book_id));
                if !filters.matches(&meta) {
                    return None;
                }
                Some(SearchResultItem {
                    book_id: hit.book_id,
                    title: meta.title,
                    author: meta.author,
                    language: meta.language,
                    year: meta.year,
                    score: hit.score,
                })
            })
            .collect();

        (total_count, results)
    }

    /// Per-term document frequency and idf for a query, for debugging.
    pub async fn term_stats(&self, raw_query: &str) -> Vec<TermStats> {
        let terms = query_terms(raw_query, &self.stop_list);
        if terms.is_empty() {
            return Vec::new();
        }
        let postings_by_term = self.index.get_all(&terms).await;
        let total_documents = self.index.total_documents().await as f64;

        terms
            .into_iter()
            .map(|term| {
                let df = postings_by_term.get(&term).map(|p| p.len()).unwrap_or(0);
                TermStats {
                    idf: idf(total_documents, df),
                    document_frequency: df,
                    term,
                }
            })
            .collect()
    }
}

fn idf(total_documents: f64, document_frequency: usize) -> f64 {
    ((total_documents + 1.0) / (document_frequency as f64 + 1.0)).ln() + 1.0
}

/// Builds the candidate book id set. Returns `None` for an empty AND
/// intersection, short-circuiting before scoring.
fn candidate_set(
    terms: &[String],
    postings_by_term: &HashMap<String, Vec<Posting>>,
    mode: QueryMode,
) -> Option<HashSet<u32>> {
    match mode {
        QueryMode::Or => {
            let mut union = HashSet::new();
            for term in terms {
                if let Some(postings) = postings_by_term.get(term) {
                    union.extend(postings.iter().map(|p| p.book_id));
                }
            }
            if union.is_empty() {
                None
            } else {
                Some(union)
            }
        }
        QueryMode::And => {
            let mut intersection: Option<HashSet<u32>> = None;
            for term in terms {
                let ids: HashSet<u32> = postings_by_term
                    .get(term)
                    .map(|postings| postings.iter().map(|p| p.book_id).collect())
                    .unwrap_or_default();

                intersection = Some(match intersection {
                    None => ids,
                    Some(current) => current.intersection(&ids).copied().collect(),
                });

                // Early exit: one term with no candidates empties the query.
                if intersection.as_ref().map(|s| s.is_empty()).unwrap_or(true) {
                    return None;
                }
            }
            intersection.filter(|s| !s.is_empty())
        }
    }
}

fn placeholder_metadata(book_id: u32) -> BookMetadata {
    BookMetadata {
        book_id,
        title: format!("Book {}", book_id),
        author: "Unknown".to_string(),
        language: "unknown".to_string(),
        year: None,
        word_count: 0,
        unique_words: 0,
    }
}
