use super::protocol::ReplicationRequest;
use super::replication::ReplicationClient;
use super::splitter::{extract_metadata, split_header_body};
use super::store::{parse_log_line, DatalakePartition};
use super::DatalakeError;
use crate::fingerprint;
use tempfile::TempDir;

const SAMPLE: &str = "Title: Moby Dick\n\
Author: Herman Melville\n\
Release Date: June 1, 2001 [eBook #2701]\n\
Language: English\n\
\n\
*** START OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***\n\
Call me Ishmael. Some years ago, never mind how long precisely.\n\
*** END OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***\n\
End matter that must not be indexed.\n";

// ---------------- splitter ----------------

#[test]
fn split_separates_header_and_body() {
    let parts = split_header_body(SAMPLE);

    assert!(parts.header.contains("Herman Melville"));
    assert!(!parts.header.contains("START OF"));
    assert!(parts.body.starts_with("*** START OF"));
    assert!(parts.body.contains("Ishmael"));
    assert!(!parts.body.contains("END OF THE PROJECT"));
    assert!(!parts.body.contains("End matter"));
}

#[test]
fn split_is_case_insensitive() {
    let text = "header\n*** start of the ebook ***\nbody text\n*** End Of the ebook ***\ntail";
    let parts = split_header_body(text);
    assert_eq!(parts.header, "header");
    assert!(parts.body.contains("body text"));
    assert!(!parts.body.contains("tail"));
}

#[test]
fn split_without_markers_is_all_body() {
    let text = "Just a plain document\nwith two lines";
    let parts = split_header_body(text);
    assert!(parts.header.is_empty());
    assert_eq!(parts.body, text);
}

#[test]
fn split_without_end_marker_runs_to_eof() {
    let text = "intro\n*** START OF THE EBOOK ***\neverything after";
    let parts = split_header_body(text);
    assert_eq!(parts.header, "intro");
    assert!(parts.body.ends_with("everything after"));
}

#[test]
fn header_plus_body_reassemble_the_document() {
    let parts = split_header_body(SAMPLE);
    // Up to whitespace, the document before the end marker is header ++ body.
    let end_idx = SAMPLE.find("*** END OF").unwrap();
    let expected: String = SAMPLE[..end_idx]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let reassembled: String = format!("{} {}", parts.header, parts.body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(reassembled, expected);
}

// ---------------- metadata ----------------

#[test]
fn metadata_fields_are_extracted() {
    let parts = split_header_body(SAMPLE);
    let meta = extract_metadata(&parts.header);

    assert_eq!(meta.title.as_deref(), Some("Moby Dick"));
    assert_eq!(meta.author.as_deref(), Some("Herman Melville"));
    assert_eq!(meta.language.as_deref(), Some("English"));
    // The [eBook #NNN] suffix is stripped from the release date.
    assert_eq!(meta.release_date.as_deref(), Some("June 1, 2001"));
    assert_eq!(meta.year, Some(2001));
}

#[test]
fn missing_fields_stay_none() {
    let meta = extract_metadata("Title: Lonely Title\n");
    assert_eq!(meta.title.as_deref(), Some("Lonely Title"));
    assert!(meta.author.is_none());
    assert!(meta.language.is_none());
    assert!(meta.release_date.is_none());
    assert!(meta.year.is_none());
}

#[test]
fn empty_field_value_is_none() {
    let meta = extract_metadata("Author:   \nLanguage: es\n");
    assert!(meta.author.is_none());
    assert_eq!(meta.language.as_deref(), Some("es"));
}

// ---------------- ingestion log ----------------

#[test]
fn log_line_roundtrip() {
    let entry = parse_log_line("2026-08-02T14:33:12.123;book=42;path=20260802/14/42;bytes=1234")
        .expect("line should parse");
    assert_eq!(entry.book_id, 42);
    assert_eq!(entry.relative_path, "20260802/14/42");
    assert_eq!(entry.bytes, 1234);
}

#[test]
fn malformed_log_lines_are_skipped() {
    assert!(parse_log_line("").is_none());
    assert!(parse_log_line("garbage").is_none());
    assert!(parse_log_line("2026-08-02T14:33:12;book=x;path=a;bytes=1").is_none());
    // Torn final line after a crash.
    assert!(parse_log_line("2026-08-02T14:33:12;book=42;pat").is_none());
}

#[tokio::test]
async fn write_then_locate_and_list() {
    let dir = TempDir::new().unwrap();
    let lake = DatalakePartition::new(dir.path().to_path_buf());

    let write = lake.write_book(7, SAMPLE).await.unwrap();
    assert!(write.relative_path.ends_with("/7"));

    let located = lake.locate(7).await.expect("book should be in the log");
    assert_eq!(located, write.relative_path);
    assert_eq!(lake.list().await, vec![7]);
    assert_eq!(lake.status(7).await, "available");
    assert_eq!(lake.status(8).await, "missing");

    let body = lake.read_body(&write.relative_path).await.unwrap();
    assert!(body.contains("Ishmael"));

    let stats = lake.stats().await;
    assert_eq!(stats.book_count, 1);
    assert_eq!(stats.total_bytes, SAMPLE.len() as u64);
}

#[tokio::test]
async fn read_body_of_unknown_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    let lake = DatalakePartition::new(dir.path().to_path_buf());
    let err = lake.read_body("20990101/00/99").await.unwrap_err();
    assert!(matches!(err, DatalakeError::NotFound(99)));
}

// ---------------- replica receipt ----------------

#[tokio::test]
async fn replica_roundtrip_preserves_bytes() {
    let dir = TempDir::new().unwrap();
    let lake = DatalakePartition::new(dir.path().to_path_buf());

    let parts = split_header_body(SAMPLE);
    let hash = fingerprint::sha256_hex(SAMPLE.as_bytes());
    let request = ReplicationRequest::encode(
        7,
        "node-a",
        "20260802/14/7",
        SAMPLE,
        &parts.header,
        &parts.body,
        &hash,
    );

    lake.receive_replica(&request).await.unwrap();

    // The replica's raw bytes hash to the originator's content hash.
    let raw = tokio::fs::read(dir.path().join("20260802/14/7/raw.txt"))
        .await
        .unwrap();
    assert_eq!(fingerprint::sha256_hex(&raw), hash);

    let body = lake.read_body("20260802/14/7").await.unwrap();
    assert_eq!(body, parts.body);
    assert_eq!(lake.list().await, vec![7]);
}

#[tokio::test]
async fn replica_with_wrong_hash_is_refused() {
    let dir = TempDir::new().unwrap();
    let lake = DatalakePartition::new(dir.path().to_path_buf());

    let wrong_hash = fingerprint::sha256_hex(b"something else entirely");
    let request =
        ReplicationRequest::encode(7, "node-a", "20260802/14/7", SAMPLE, "h", "b", &wrong_hash);

    let err = lake.receive_replica(&request).await.unwrap_err();
    assert!(err.to_string().contains("Hash mismatch"));

    // Nothing was written and the log is untouched.
    assert!(!dir.path().join("20260802/14/7").exists());
    assert!(lake.locate(7).await.is_none());
    assert!(lake.list().await.is_empty());
}

// ---------------- replica placement ----------------

#[test]
fn placement_is_a_contiguous_ring_slice() {
    let peers: Vec<String> = ["http://a", "http://b", "http://c", "http://d"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let client = ReplicationClient::new(peers, 3);

    // bookId 5 on a ring of 4 starts at position 1 and takes R-1 = 2 peers.
    assert_eq!(client.select_peers(5), vec!["http://b", "http://c"]);
    // Wrap-around at the end of the ring.
    assert_eq!(client.select_peers(3), vec!["http://d", "http://a"]);
}

#[test]
fn placement_size_is_min_of_peers_and_factor() {
    let peers: Vec<String> = ["http://a", "http://b"].iter().map(|s| s.to_string()).collect();
    let client = ReplicationClient::new(peers, 5);
    assert_eq!(client.select_peers(0).len(), 2);
}

#[test]
fn factor_one_sends_to_nobody() {
    let peers: Vec<String> = ["http://a"].iter().map(|s| s.to_string()).collect();
    let client = ReplicationClient::new(peers, 1);
    assert!(!client.is_enabled());
    assert!(client.select_peers(9).is_empty());
}

#[test]
fn empty_peer_ring_disables_replication() {
    let client = ReplicationClient::new(vec![], 3);
    assert!(!client.is_enabled());
    assert!(client.select_peers(1).is_empty());
}

#[tokio::test]
async fn replicate_with_no_peers_succeeds_with_zero_responses() {
    let client = ReplicationClient::new(vec![], 3);
    let request = ReplicationRequest::encode(1, "n", "p", "raw", "h", "b", "hash");
    assert!(client.replicate(&request).await.is_empty());
}
