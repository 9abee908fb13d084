//! Cluster membership and discovery.
//!
//! Implements a Gossip-based membership protocol (inspired by SWIM) over UDP.
//! Nodes use this service to discover each other, detect failures, and
//! disseminate topology updates.
//!
//! ## Core mechanisms
//! - **Gossip**: nodes periodically ping a random alive peer; acks piggyback
//!   the full member list so topology spreads epidemically.
//! - **Failure detection**: Alive -> Suspect -> Dead transitions driven by
//!   last-contact timeouts, so transient hiccups do not evict a node.
//! - **Incarnation numbers**: a logical clock per node that orders state
//!   updates and lets a falsely suspected node refute the claim.
//!
//! Each member advertises two addresses: the UDP gossip address and the TCP
//! address of its HTTP API, which the storage and replication layers use for
//! inter-node calls.

pub mod service;
pub mod types;
