use super::inverted::{InvertedIndex, STAT_TOTAL_TERMS_INDEXED};
use super::types::Posting;
use crate::cluster::partitioner::PartitionManager;
use crate::membership::service::MembershipService;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

async fn index_fixture() -> Arc<InvertedIndex> {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let http: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let membership = MembershipService::new("index-test".to_string(), bind, http, vec![])
        .await
        .unwrap();
    let partitioner = PartitionManager::new(membership.clone());
    InvertedIndex::new(membership, partitioner)
}

fn positions(values: &[u32]) -> Vec<u32> {
    values.to_vec()
}

#[test]
fn posting_term_frequency_is_position_count() {
    let posting = Posting::new(1, vec![0, 4, 9]);
    assert_eq!(posting.term_frequency(), 3);
}

#[tokio::test]
async fn empty_document_indexes_nothing() {
    let index = index_fixture().await;
    let indexed = index.index_document(1, HashMap::new()).await.unwrap();
    assert_eq!(indexed, 0);
    assert_eq!(index.total_documents().await, 0);
}

#[tokio::test]
async fn index_document_installs_postings_and_stats() {
    let index = index_fixture().await;

    let mut terms = HashMap::new();
    terms.insert("hello".to_string(), positions(&[0, 2]));
    terms.insert("world".to_string(), positions(&[1]));

    let indexed = index.index_document(1, terms).await.unwrap();
    assert_eq!(indexed, 2);

    let hello = index.get("hello").await;
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0].book_id, 1);
    assert_eq!(hello[0].positions, vec![0, 2]);
    assert_eq!(hello[0].term_frequency(), 2);

    assert_eq!(index.total_documents().await, 1);
    let report = index.stats().await;
    assert_eq!(report.total_terms_indexed, 2);
}

#[tokio::test]
async fn reindex_replaces_the_posting_not_duplicates_it() {
    let index = index_fixture().await;

    let mut first = HashMap::new();
    first.insert("cat".to_string(), positions(&[0, 1]));
    index.index_document(7, first).await.unwrap();

    let mut second = HashMap::new();
    second.insert("cat".to_string(), positions(&[5]));
    index.index_document(7, second).await.unwrap();

    let postings = index.get("cat").await;
    let for_book: Vec<&Posting> = postings.iter().filter(|p| p.book_id == 7).collect();
    assert_eq!(for_book.len(), 1, "exactly one posting per (term, bookId)");
    assert_eq!(for_book[0].positions, vec![5]);

    // Same book reindexed: still one distinct document.
    assert_eq!(index.total_documents().await, 1);
}

#[tokio::test]
async fn reindex_with_different_terms_leaves_no_residue_after_removal_sweep() {
    let index = index_fixture().await;

    let mut v1 = HashMap::new();
    v1.insert("old".to_string(), positions(&[0]));
    v1.insert("shared".to_string(), positions(&[1]));
    index.index_document(3, v1).await.unwrap();

    // New content drops the "old" term; the removal sweep then clears it.
    index.remove_document_local(3).await;
    let mut v2 = HashMap::new();
    v2.insert("shared".to_string(), positions(&[0]));
    v2.insert("fresh".to_string(), positions(&[1]));
    index.index_document(3, v2).await.unwrap();

    assert!(index.get("old").await.is_empty());
    assert_eq!(index.get("shared").await.len(), 1);
    assert_eq!(index.get("fresh").await.len(), 1);
}

#[tokio::test]
async fn two_documents_share_a_term() {
    let index = index_fixture().await;

    let mut doc1 = HashMap::new();
    doc1.insert("cat".to_string(), positions(&[0]));
    doc1.insert("dog".to_string(), positions(&[1]));
    index.index_document(1, doc1).await.unwrap();

    let mut doc2 = HashMap::new();
    doc2.insert("cat".to_string(), positions(&[0]));
    index.index_document(2, doc2).await.unwrap();

    let cat = index.get("cat").await;
    assert_eq!(cat.len(), 2);
    assert_eq!(index.total_documents().await, 2);
}

#[tokio::test]
async fn get_all_returns_only_known_terms() {
    let index = index_fixture().await;

    let mut doc = HashMap::new();
    doc.insert("whale".to_string(), positions(&[0]));
    index.index_document(1, doc).await.unwrap();

    let fetched = index
        .get_all(&["whale".to_string(), "unknown".to_string()])
        .await;
    assert_eq!(fetched.len(), 1);
    assert!(fetched.contains_key("whale"));
}

#[tokio::test]
async fn remove_document_drops_postings_and_empty_entries() {
    let index = index_fixture().await;

    let mut doc1 = HashMap::new();
    doc1.insert("cat".to_string(), positions(&[0]));
    doc1.insert("dog".to_string(), positions(&[1]));
    index.index_document(1, doc1).await.unwrap();

    let mut doc2 = HashMap::new();
    doc2.insert("cat".to_string(), positions(&[0]));
    index.index_document(2, doc2).await.unwrap();

    let removed = index.remove_document(1).await.unwrap();
    assert_eq!(removed, 2);

    // "dog" was only in book 1: the entry disappears entirely.
    assert!(index.get("dog").await.is_empty());
    // "cat" keeps book 2's posting.
    let cat = index.get("cat").await;
    assert_eq!(cat.len(), 1);
    assert_eq!(cat[0].book_id, 2);
    // Distinct current documents shrank.
    assert_eq!(index.total_documents().await, 1);
}

#[tokio::test]
async fn processed_marks_are_sticky() {
    let index = index_fixture().await;
    assert!(!index.is_processed("42:cafe").await);
    index.mark_processed("42:cafe").await.unwrap();
    assert!(index.is_processed("42:cafe").await);
    assert!(!index.is_processed("42:beef").await);
}

#[tokio::test]
async fn concurrent_stat_increments_do_not_lose_updates() {
    let index = index_fixture().await;
    let mut handles = Vec::new();
    for _ in 0..10 {
        let index = index.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..20 {
                index.increment_stat(STAT_TOTAL_TERMS_INDEXED, 1).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(index.stats().await.total_terms_indexed, 200);
}

#[tokio::test]
async fn clear_resets_everything() {
    let index = index_fixture().await;
    let mut doc = HashMap::new();
    doc.insert("term".to_string(), positions(&[0]));
    index.index_document(1, doc).await.unwrap();
    index.mark_processed("1:h").await.unwrap();

    index.clear().await;

    assert!(index.get("term").await.is_empty());
    assert_eq!(index.total_documents().await, 0);
    assert!(!index.is_processed("1:h").await);
}
