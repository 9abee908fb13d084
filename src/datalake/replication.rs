//! Peer replication of ingested books.
//!
//! The sender picks a contiguous slice of the configured peer ring starting
//! at `bookId mod P`, so replicas spread evenly instead of always landing on
//! the first peers. A peer failure is logged and counted; there is no retry
//! and no rollback here, because the surviving replicas and the ingestion
//! event stream make the document recoverable downstream.

use std::time::Duration;

use super::protocol::{ReplicationRequest, ReplicationResponse, ENDPOINT_REPLICATE, ENDPOINT_STATUS};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ReplicationClient {
    peers: Vec<String>,
    replication_factor: usize,
    http_client: reqwest::Client,
}

impl ReplicationClient {
    pub fn new(peers: Vec<String>, replication_factor: usize) -> Self {
        let peers = peers
            .into_iter()
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>();

        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        if peers.is_empty() || replication_factor <= 1 {
            tracing::info!("Datalake replication disabled: no peers or factor <= 1");
        } else {
            tracing::info!(
                "Datalake replication enabled: {} peer(s), factor {}",
                peers.len(),
                replication_factor
            );
        }

        Self {
            peers,
            replication_factor,
            http_client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.peers.is_empty() && self.replication_factor > 1
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Selects the peers that receive copies of `book_id`: a contiguous ring
    /// slice of size `min(P, R-1)` starting at `book_id mod P`.
    pub fn select_peers(&self, book_id: u32) -> Vec<&str> {
        let peer_count = self.peers.len();
        if peer_count == 0 || self.replication_factor <= 1 {
            return Vec::new();
        }

        let copies = (self.replication_factor - 1).min(peer_count);
        let start = book_id as usize % peer_count;
        (0..copies)
            .map(|i| self.peers[(start + i) % peer_count].as_str())
            .collect()
    }

    /// Sends the book to every selected peer and returns the per-peer
    /// responses. The number of successes is the caller's `replicasWritten`.
    pub async fn replicate(&self, request: &ReplicationRequest) -> Vec<ReplicationResponse> {
        let selected = self.select_peers(request.book_id);
        let mut responses = Vec::with_capacity(selected.len());

        for peer in selected {
            let response = self.send_to_peer(peer, request).await;
            if !response.success {
                tracing::warn!(
                    "Replication failed: book={} peer={} reason={}",
                    request.book_id,
                    peer,
                    response.message
                );
            }
            responses.push(response);
        }
        responses
    }

    async fn send_to_peer(&self, peer: &str, request: &ReplicationRequest) -> ReplicationResponse {
        let url = format!("{}{}", peer, ENDPOINT_REPLICATE);

        let sent = self
            .http_client
            .post(&url)
            .json(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => {
                match response.json::<ReplicationResponse>().await {
                    Ok(parsed) => parsed,
                    Err(_) => ReplicationResponse::success(peer, request.book_id),
                }
            }
            Ok(response) => ReplicationResponse::failure(
                peer,
                request.book_id,
                format!("HTTP {}", response.status()),
            ),
            Err(e) => {
                ReplicationResponse::failure(peer, request.book_id, format!("request failed: {}", e))
            }
        }
    }

    /// Peers answering `GET /status` with 200 within the probe window.
    pub async fn healthy_peers(&self) -> Vec<String> {
        let mut healthy = Vec::new();
        for peer in &self.peers {
            let url = format!("{}{}", peer, ENDPOINT_STATUS);
            let probe = self
                .http_client
                .get(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await;
            if matches!(probe, Ok(ref r) if r.status().is_success()) {
                healthy.push(peer.clone());
            }
        }
        healthy
    }
}
