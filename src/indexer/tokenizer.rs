//! Tokenization.
//!
//! One rule serves both the indexer and the query parser: lowercase the
//! text, take maximal runs of `[a-záéíóúüñ]+` (the corpus carries Spanish
//! diacritics), and assign each emitted token its 0-based position in the
//! stream. Terms shorter than two characters and stop-words are dropped
//! *after* position assignment, so positions always refer to the pre-filter
//! stream and phrase distances stay meaningful.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-záéíóúüñ]+").unwrap());

/// Minimum character count for an indexable term.
pub const MIN_TERM_LEN: usize = 2;

const DEFAULT_STOP_WORDS: &[&str] = &[
    "the", "of", "and", "to", "in", "is", "it", "you", "that", "he", "was",
    "for", "on", "are", "as", "with", "his", "they", "at", "be", "this",
    "have", "from", "or", "had", "by", "not", "but", "what", "all", "were",
    "when", "an", "which", "their", "there", "been", "has", "will", "would",
    "de", "la", "que", "el", "en", "los", "del", "se", "las", "por", "un",
    "con", "una", "su", "para", "es", "al", "lo", "como",
];

/// Configurable stop-word filter.
#[derive(Debug, Clone)]
pub struct StopList {
    words: HashSet<String>,
}

impl StopList {
    pub fn from_words<I: IntoIterator<Item = S>, S: Into<String>>(words: I) -> Self {
        Self {
            words: words.into_iter().map(|w| w.into()).collect(),
        }
    }

    /// No filtering at all.
    pub fn empty() -> Self {
        Self { words: HashSet::new() }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.words.contains(token)
    }
}

impl Default for StopList {
    fn default() -> Self {
        Self::from_words(DEFAULT_STOP_WORDS.iter().copied())
    }
}

/// Emits every token of `text` with its position: lowercased maximal runs of
/// the word class, positions counting all emitted tokens.
pub fn tokenize_with_positions(text: &str) -> Vec<(String, u32)> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .enumerate()
        .map(|(position, m)| (m.as_str().to_string(), position as u32))
        .collect()
}

/// Builds the indexable `term -> sorted positions` map of a document body.
/// Short tokens and stop-words are filtered after position assignment.
pub fn term_positions(text: &str, stop_list: &StopList) -> HashMap<String, Vec<u32>> {
    let mut terms: HashMap<String, Vec<u32>> = HashMap::new();
    for (token, position) in tokenize_with_positions(text) {
        if token.chars().count() < MIN_TERM_LEN || stop_list.contains(&token) {
            continue;
        }
        terms.entry(token).or_default().push(position);
    }
    terms
}

/// Query tokenization, unified with the indexer rule: same word class, same
/// filters, duplicates collapsed, first-occurrence order preserved.
pub fn query_terms(query: &str, stop_list: &StopList) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for (token, _) in tokenize_with_positions(query) {
        if token.chars().count() < MIN_TERM_LEN || stop_list.contains(&token) {
            continue;
        }
        if seen.insert(token.clone()) {
            terms.push(token);
        }
    }
    terms
}
