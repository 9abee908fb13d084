use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::engine::SearchEngine;
use super::types::{QueryMode, SearchFilters, SearchResponse, TermStats};

const DEFAULT_LIMIT: usize = 10;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub mode: Option<String>,
    pub limit: Option<usize>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub year: Option<u32>,
}

pub async fn handle_search(
    Query(params): Query<SearchParams>,
    Extension(engine): Extension<Arc<SearchEngine>>,
) -> Json<SearchResponse> {
    let mode = params
        .mode
        .as_deref()
        .map(QueryMode::parse)
        .unwrap_or(QueryMode::And);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let filters = SearchFilters {
        author: params.author,
        language: params.language,
        year: params.year,
    };

    let (total_count, results) = engine
        .search_decorated(&params.q, mode, limit, &filters)
        .await;

    Json(SearchResponse {
        query: params.q,
        mode: mode.as_str().to_string(),
        filters: filters.as_map(),
        total_count,
        count: results.len(),
        results,
    })
}

#[derive(Deserialize)]
pub struct TermStatsParams {
    pub q: String,
}

pub async fn handle_term_stats(
    Query(params): Query<TermStatsParams>,
    Extension(engine): Extension<Arc<SearchEngine>>,
) -> Json<Vec<TermStats>> {
    Json(engine.term_stats(&params.q).await)
}
