use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

/// Unique identifier for a node in the cluster.
/// Wrapper around a UUID string so identity survives address changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a node as seen by the local failure detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    /// Healthy and responsive.
    Alive,
    /// Missed the heartbeat window; may refute back to `Alive` or time out
    /// to `Dead`.
    Suspect,
    /// Confirmed failed; excluded from partition ownership.
    Dead,
}

/// One member of the cluster: identity, addressing, and health.
///
/// The `incarnation` field is a logical clock used to order updates and
/// resolve conflicting claims (e.g. refuting a false suspicion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// UDP address of the gossip endpoint.
    pub gossip_addr: SocketAddr,
    /// TCP address of the HTTP API used for storage and replication calls.
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    /// Local timestamp of last contact. Never serialized; only the local
    /// failure detector reads it.
    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// Wire protocol for inter-node gossip over UDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    /// Direct health probe carrying the sender's identity and incarnation.
    Ping { from: Node },

    /// Reply to a ping. Piggybacks the responder's member list so topology
    /// converges without a separate sync protocol.
    Ack { from: NodeId, incarnation: u64, members: Vec<Node> },

    /// Sent by a new node to a seed to enter the cluster.
    Join { node: Node },

    /// Broadcast claiming a node missed its heartbeat window.
    Suspect { node_id: NodeId, incarnation: u64 },

    /// Broadcast that a node is alive; used to refute a suspicion.
    Alive { node_id: NodeId, incarnation: u64 },
}
