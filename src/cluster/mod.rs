//! Distributed state substrate.
//!
//! Implements the sharded, replicated in-memory key-value store that the
//! inverted index, the metadata store, and the cluster-shared counters are
//! built on.
//!
//! ## Core concepts
//! - **Partitioning**: the key space is divided into a fixed number of
//!   partitions by a stable hash, independent of process or restart.
//! - **Placement**: `PartitionManager` deterministically assigns each
//!   partition a primary owner and a configurable number of synchronous
//!   backups from the sorted list of alive members.
//! - **Replication**: writes are coordinated by the primary and pushed to
//!   backups before the call returns.
//! - **Batching**: `get_batch`/`put_batch` coalesce keys per owning node so a
//!   multi-term operation costs one request per node, not one per key.
//! - **Locks**: `KeyLocks` provides the advisory per-key mutexes used around
//!   read-modify-write sequences that must serialize against concurrent
//!   writers of the same key.

pub mod handlers;
pub mod locks;
pub mod map;
pub mod partitioner;
pub mod protocol;
pub mod transport;
