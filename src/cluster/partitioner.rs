//! Partition placement.
//!
//! Maps keys to partitions and partitions to nodes. All nodes compute the
//! same ownership map independently from the sorted list of alive members,
//! so no coordinator is needed (shared-nothing).

use crate::membership::{service::MembershipService, types::NodeId};
use std::sync::Arc;

/// Number of logical partitions in the key space. Much larger than any
/// realistic node count so ownership rebalances in small increments.
pub const PARTITION_COUNT: u32 = 271;

/// Manages the topology of distributed state.
pub struct PartitionManager {
    /// Total number of logical partitions.
    pub num_partitions: u32,
    /// Synchronous backup replicas per partition (owners = 1 + backups).
    backup_count: usize,
    membership: Arc<MembershipService>,
}

impl PartitionManager {
    pub fn new(membership: Arc<MembershipService>) -> Arc<Self> {
        Self::new_with_backups(membership, 1)
    }

    pub fn new_with_backups(membership: Arc<MembershipService>, backup_count: usize) -> Arc<Self> {
        Arc::new(Self {
            num_partitions: PARTITION_COUNT,
            backup_count,
            membership,
        })
    }

    /// Maps a key to its partition.
    ///
    /// Uses FNV-1a rather than `DefaultHasher`: the placement must be
    /// identical across processes and restarts, and `DefaultHasher` is
    /// randomly seeded per process.
    pub fn get_partition(&self, key: &str) -> u32 {
        (stable_hash(key) % self.num_partitions as u64) as u32
    }

    /// Calculates the nodes responsible for a partition.
    ///
    /// Index 0 is the primary owner (coordinates writes); indices 1+ are the
    /// synchronous backups. If a node fails, the next node in the sorted ring
    /// takes over its slots.
    pub fn get_owners(&self, partition: u32) -> Vec<NodeId> {
        let alive = self.membership.get_alive_members();
        if alive.is_empty() {
            return vec![];
        }

        // Sort by id so every node derives the identical ring.
        let mut node_ids: Vec<NodeId> = alive.into_iter().map(|node| node.id).collect();
        node_ids.sort();

        let primary_idx = (partition as usize) % node_ids.len();
        let owner_count = (1 + self.backup_count).min(node_ids.len());

        (0..owner_count)
            .map(|offset| node_ids[(primary_idx + offset) % node_ids.len()].clone())
            .collect()
    }

    /// Partitions for which the local node is the primary owner.
    pub fn my_primary_partitions(&self) -> Vec<u32> {
        let my_id = &self.membership.local_node.id;
        (0..self.num_partitions)
            .filter(|&partition| {
                let owners = self.get_owners(partition);
                !owners.is_empty() && &owners[0] == my_id
            })
            .collect()
    }

    /// Partitions for which the local node is a backup.
    pub fn my_backup_partitions(&self) -> Vec<u32> {
        let my_id = &self.membership.local_node.id;
        (0..self.num_partitions)
            .filter(|&partition| {
                self.get_owners(partition)
                    .iter()
                    .skip(1)
                    .any(|owner| owner == my_id)
            })
            .collect()
    }
}

/// 64-bit FNV-1a. Stable across platforms and processes.
fn stable_hash(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod stable_hash_tests {
    use super::stable_hash;

    #[test]
    fn known_fnv_vectors() {
        // Offset basis for the empty input.
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(stable_hash("a"), stable_hash("b"));
    }
}
