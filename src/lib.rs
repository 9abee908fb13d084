//! Distributed Full-Text Search Cluster Library
//!
//! This library crate defines the core modules of a horizontally scalable,
//! fault-tolerant search cluster over a corpus of public-domain books.
//! It serves as the foundation for the node executable (`main.rs`).
//!
//! ## Architecture Modules
//! The data plane is composed of loosely coupled subsystems:
//!
//! - **`membership`**: The cluster coordination layer. Uses a UDP-based Gossip
//!   protocol (SWIM-like) to manage node discovery, failure detection, and
//!   cluster topology.
//! - **`cluster`**: The distributed state substrate. Implements a sharded,
//!   replicated in-memory key-value store (`DistributedMap`) with batched
//!   reads/writes and advisory per-key locks.
//! - **`datalake`**: The replicated content store. Per-book directories of
//!   raw/header/body files, an append-only ingestion log, and hash-verified
//!   peer replication.
//! - **`bus`**: A durable at-least-once message queue hosted by the cluster
//!   itself, with lease-based redelivery and idempotent consumers.
//! - **`index`**: The distributed inverted index (term -> postings) with
//!   partitioned ownership, synchronous backups, and index statistics.
//! - **`indexer`**: The indexing engine. Consumes index requests from the bus,
//!   tokenizes document bodies, and updates the inverted index.
//! - **`search`**: Query tokenization, boolean combination, TF-IDF ranking,
//!   and metadata decoration.
//! - **`workqueue`**: A cluster-shared queue of pending book ids with per-node
//!   worker pools for bulk ingestion runs.
//! - **`ingestion`**: Document acquisition from the upstream archive and the
//!   local ingest pipeline (write, replicate, publish).

pub mod bus;
pub mod cluster;
pub mod config;
pub mod datalake;
pub mod fingerprint;
pub mod index;
pub mod indexer;
pub mod ingestion;
pub mod membership;
pub mod search;
pub mod workqueue;
