use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Boolean combination of query terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Intersection: a hit must contain every term.
    And,
    /// Union: a hit contains at least one term.
    Or,
}

impl QueryMode {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("or") {
            QueryMode::Or
        } else {
            QueryMode::And
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::And => "and",
            QueryMode::Or => "or",
        }
    }
}

/// Decoration record for search hits, kept in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookMetadata {
    pub book_id: u32,
    pub title: String,
    pub author: String,
    pub language: String,
    pub year: Option<u32>,
    pub word_count: usize,
    pub unique_words: usize,
}

/// A ranked hit before decoration.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub book_id: u32,
    pub score: f64,
}

/// A ranked, decorated hit as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub book_id: u32,
    pub title: String,
    pub author: String,
    pub language: String,
    pub year: Option<u32>,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: String,
    pub filters: HashMap<String, String>,
    /// Ranked hits before decoration filters.
    pub total_count: usize,
    /// Hits actually returned.
    pub count: usize,
    pub results: Vec<SearchResultItem>,
}

/// Optional post-ranking decoration filters. Filtering may shrink the
/// result below the requested limit; there is no top-up.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Case-insensitive substring match on the author.
    pub author: Option<String>,
    /// Exact match or ISO-639 prefix on the language.
    pub language: Option<String>,
    /// Exact year.
    pub year: Option<u32>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.language.is_none() && self.year.is_none()
    }

    pub fn matches(&self, meta: &BookMetadata) -> bool {
        if let Some(author) = &self.author {
            if !meta.author.to_lowercase().contains(&author.to_lowercase()) {
                return false;
            }
        }
        if let Some(language) = &self.language {
            let have = meta.language.to_lowercase();
            let want = language.to_lowercase();
            if have != want && !have.starts_with(&want) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if meta.year != Some(year) {
                return false;
            }
        }
        true
    }

    pub fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(author) = &self.author {
            map.insert("author".to_string(), author.clone());
        }
        if let Some(language) = &self.language {
            map.insert("language".to_string(), language.clone());
        }
        if let Some(year) = self.year {
            map.insert("year".to_string(), year.to_string());
        }
        map
    }
}

/// Per-term statistics for query debugging.
#[derive(Debug, Clone, Serialize)]
pub struct TermStats {
    pub term: String,
    pub document_frequency: usize,
    pub idf: f64,
}
