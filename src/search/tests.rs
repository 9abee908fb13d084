use super::engine::SearchEngine;
use super::types::{BookMetadata, QueryMode, SearchFilters};
use crate::cluster::map::DistributedMap;
use crate::cluster::partitioner::PartitionManager;
use crate::index::InvertedIndex;
use crate::indexer::tokenizer::{term_positions, StopList};
use crate::membership::service::MembershipService;
use std::net::SocketAddr;
use std::sync::Arc;

struct Fixture {
    engine: Arc<SearchEngine>,
    index: Arc<InvertedIndex>,
    books: Arc<DistributedMap<u32, BookMetadata>>,
}

async fn fixture() -> Fixture {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let http: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let membership = MembershipService::new("search-test".to_string(), bind, http, vec![])
        .await
        .unwrap();
    let partitioner = PartitionManager::new(membership.clone());
    let index = InvertedIndex::new(membership.clone(), partitioner.clone());
    let books = Arc::new(DistributedMap::new(membership, partitioner, "/books"));
    let engine = SearchEngine::new(index.clone(), books.clone());
    Fixture { engine, index, books }
}

async fn install(fixture: &Fixture, book_id: u32, body: &str) {
    let terms = term_positions(body, &StopList::empty());
    fixture.index.index_document(book_id, terms).await.unwrap();
}

async fn install_metadata(fixture: &Fixture, book_id: u32, author: &str, language: &str, year: Option<u32>) {
    fixture
        .books
        .put(
            book_id,
            BookMetadata {
                book_id,
                title: format!("Title {}", book_id),
                author: author.to_string(),
                language: language.to_string(),
                year,
                word_count: 0,
                unique_words: 0,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn single_book_scores_one_plus_ln_tf() {
    let fixture = fixture().await;
    install(&fixture, 1, "Hello world hello").await;

    let hits = fixture.engine.search("hello", QueryMode::And, 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].book_id, 1);

    // N = 1, df = 1 -> idf = ln(2/2) + 1 = 1; tf = 2 -> score = 1 + ln 2.
    let expected = 1.0 + 2f64.ln();
    assert!((hits[0].score - expected).abs() < 1e-9, "score = {}", hits[0].score);
}

#[tokio::test]
async fn and_requires_every_term() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat dog").await;
    install(&fixture, 2, "cat").await;

    let hits = fixture.engine.search("cat dog", QueryMode::And, 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].book_id, 1);
}

#[tokio::test]
async fn or_unions_and_ranks_matches_first() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat dog").await;
    install(&fixture, 2, "cat").await;

    let hits = fixture.engine.search("cat dog", QueryMode::Or, 10).await;
    assert_eq!(hits.len(), 2);
    // Book 1 matches both terms and must outrank book 2.
    assert_eq!(hits[0].book_id, 1);
    assert_eq!(hits[1].book_id, 2);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn scores_are_monotone_nonincreasing() {
    let fixture = fixture().await;
    install(&fixture, 1, "whale whale whale ocean").await;
    install(&fixture, 2, "whale ocean ocean").await;
    install(&fixture, 3, "whale").await;

    let hits = fixture.engine.search("whale ocean", QueryMode::Or, 10).await;
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn ties_break_on_ascending_book_id() {
    let fixture = fixture().await;
    install(&fixture, 9, "same text").await;
    install(&fixture, 4, "same text").await;

    let hits = fixture.engine.search("same text", QueryMode::And, 10).await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].book_id, 4);
    assert_eq!(hits[1].book_id, 9);
}

#[tokio::test]
async fn empty_query_returns_nothing() {
    let fixture = fixture().await;
    install(&fixture, 1, "anything at all").await;

    assert!(fixture.engine.search("", QueryMode::And, 10).await.is_empty());
    assert!(fixture.engine.search("!!! 42 %", QueryMode::And, 10).await.is_empty());
}

#[tokio::test]
async fn and_with_unknown_term_is_empty_immediately() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat dog").await;

    let hits = fixture.engine.search("cat zebra", QueryMode::And, 10).await;
    assert!(hits.is_empty());
}

#[tokio::test]
async fn limit_caps_the_result() {
    let fixture = fixture().await;
    for book_id in 1..=5 {
        install(&fixture, book_id, "common term").await;
    }
    let hits = fixture.engine.search("common", QueryMode::And, 3).await;
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn decoration_attaches_metadata() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat dog").await;
    install_metadata(&fixture, 1, "Herman Melville", "en", Some(1851)).await;

    let (total, results) = fixture
        .engine
        .search_decorated("cat", QueryMode::And, 10, &SearchFilters::default())
        .await;
    assert_eq!(total, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].author, "Herman Melville");
    assert_eq!(results[0].year, Some(1851));
}

#[tokio::test]
async fn filters_drop_non_matching_hits_without_topup() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat").await;
    install(&fixture, 2, "cat").await;
    install_metadata(&fixture, 1, "Herman Melville", "en", Some(1851)).await;
    install_metadata(&fixture, 2, "Jane Austen", "en", Some(1813)).await;

    let filters = SearchFilters {
        author: Some("melville".to_string()),
        ..Default::default()
    };
    let (total, results) = fixture
        .engine
        .search_decorated("cat", QueryMode::And, 10, &filters)
        .await;

    assert_eq!(total, 2, "ranking saw both");
    assert_eq!(results.len(), 1, "filter dropped one, no top-up");
    assert_eq!(results[0].book_id, 1);
}

#[tokio::test]
async fn language_filter_accepts_exact_and_prefix() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat").await;
    install(&fixture, 2, "cat").await;
    install_metadata(&fixture, 1, "A", "en", None).await;
    install_metadata(&fixture, 2, "B", "english", None).await;

    let filters = SearchFilters {
        language: Some("en".to_string()),
        ..Default::default()
    };
    let (_, results) = fixture
        .engine
        .search_decorated("cat", QueryMode::And, 10, &filters)
        .await;
    // "en" matches exactly and as ISO prefix of "english".
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn year_filter_is_exact() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat").await;
    install(&fixture, 2, "cat").await;
    install_metadata(&fixture, 1, "A", "en", Some(1851)).await;
    install_metadata(&fixture, 2, "B", "en", Some(1900)).await;

    let filters = SearchFilters { year: Some(1851), ..Default::default() };
    let (_, results) = fixture
        .engine
        .search_decorated("cat", QueryMode::And, 10, &filters)
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].book_id, 1);
}

#[tokio::test]
async fn term_stats_report_df_and_idf() {
    let fixture = fixture().await;
    install(&fixture, 1, "cat dog").await;
    install(&fixture, 2, "cat").await;

    let stats = fixture.engine.term_stats("cat dog zebra").await;
    assert_eq!(stats.len(), 3);

    let cat = stats.iter().find(|s| s.term == "cat").unwrap();
    assert_eq!(cat.document_frequency, 2);
    // N = 2, df = 2 -> idf = ln(3/3) + 1 = 1.
    assert!((cat.idf - 1.0).abs() < 1e-9);

    let zebra = stats.iter().find(|s| s.term == "zebra").unwrap();
    assert_eq!(zebra.document_frequency, 0);
    assert!(zebra.idf > 1.0);
}

#[test]
fn query_mode_parsing() {
    assert_eq!(QueryMode::parse("or"), QueryMode::Or);
    assert_eq!(QueryMode::parse("OR"), QueryMode::Or);
    assert_eq!(QueryMode::parse("and"), QueryMode::And);
    assert_eq!(QueryMode::parse("anything-else"), QueryMode::And);
}
