use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

use super::types::{GossipMessage, Node, NodeId, NodeState};

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Gossip-based membership service.
///
/// Owns the UDP socket and the member table. Cloned freely behind an `Arc`;
/// the background loops are started once via [`MembershipService::start`].
pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
}

impl MembershipService {
    /// Binds the gossip socket and, if seeds are given, announces this node
    /// to each of them.
    pub async fn new(
        node_id: String,
        gossip_bind: SocketAddr,
        http_addr: SocketAddr,
        seed_nodes: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(gossip_bind).await?;
        let gossip_addr = socket.local_addr()?;
        let incarnation = Arc::new(RwLock::new(1));

        let local_node = Node {
            id: NodeId(node_id),
            gossip_addr,
            http_addr,
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        };

        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        if !seed_nodes.is_empty() {
            tracing::info!("Joining cluster via {} seed node(s)", seed_nodes.len());
            let join = GossipMessage::Join { node: local_node.clone() };
            let encoded = bincode::serialize(&join)?;
            for seed in &seed_nodes {
                socket.send_to(&encoded, seed).await?;
                tracing::info!("Sent join request to {}", seed);
            }
        }

        Ok(Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation,
        }))
    }

    /// Spawns the gossip, receive, and failure-detection loops.
    pub fn start(self: Arc<Self>) {
        let service = self.clone();
        tokio::spawn(async move { service.gossip_loop().await });

        let service = self.clone();
        tokio::spawn(async move { service.receive_loop().await });

        let service = self.clone();
        tokio::spawn(async move { service.failure_detection_loop().await });

        tracing::info!("Membership service started on {}", self.local_node.gossip_addr);
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .count()
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);
        loop {
            interval.tick().await;

            let peers: Vec<Node> = self
                .members
                .iter()
                .filter(|entry| {
                    entry.value().id != self.local_node.id
                        && entry.value().state == NodeState::Alive
                })
                .map(|entry| entry.value().clone())
                .collect();

            if peers.is_empty() {
                continue;
            }

            use rand::Rng;
            let target = &peers[rand::thread_rng().gen_range(0..peers.len())];

            let mut me = self.local_node.clone();
            me.incarnation = *self.incarnation.read().await;
            let ping = GossipMessage::Ping { from: me };

            match bincode::serialize(&ping) {
                Ok(encoded) => {
                    if let Err(e) = self.socket.send_to(&encoded, target.gossip_addr).await {
                        tracing::warn!("Failed to ping {:?}: {}", target.id, e);
                    }
                }
                Err(e) => tracing::error!("Failed to encode ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg).await {
                            tracing::error!("Error handling gossip from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Undecodable gossip frame from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("UDP receive failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage) -> Result<()> {
        match msg {
            GossipMessage::Ping { from } => self.handle_ping(from).await,
            GossipMessage::Ack { from, incarnation, members } => {
                self.handle_ack(from, incarnation, members).await
            }
            GossipMessage::Join { node } => self.handle_join(node),
            GossipMessage::Suspect { node_id, incarnation } => {
                self.handle_suspect(node_id, incarnation).await
            }
            GossipMessage::Alive { node_id, incarnation } => {
                self.handle_alive(node_id, incarnation)
            }
        }
    }

    async fn handle_ping(&self, from: Node) -> Result<()> {
        let reply_to = from.gossip_addr;

        // A direct ping is proof of life regardless of incarnation.
        if let Some(mut member) = self.members.get_mut(&from.id) {
            member.last_seen = Some(Instant::now());
            if from.incarnation > member.incarnation {
                member.incarnation = from.incarnation;
                member.state = NodeState::Alive;
            }
        } else {
            self.merge_member(from);
        }

        let members: Vec<Node> = self.members.iter().map(|e| e.value().clone()).collect();
        let ack = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: *self.incarnation.read().await,
            members,
        };

        let encoded = bincode::serialize(&ack)?;
        self.socket.send_to(&encoded, reply_to).await?;
        Ok(())
    }

    async fn handle_ack(
        &self,
        from: NodeId,
        from_incarnation: u64,
        members: Vec<Node>,
    ) -> Result<()> {
        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
        }
        for member in members {
            self.merge_member(member);
        }
        Ok(())
    }

    /// Merges remote knowledge about a node into the local table.
    /// Higher incarnation wins; at equal incarnation an Alive claim refutes
    /// a local Suspect mark.
    fn merge_member(&self, incoming: Node) {
        if incoming.id == self.local_node.id {
            return;
        }
        match self.members.get_mut(&incoming.id) {
            Some(mut existing) => {
                if incoming.incarnation > existing.incarnation {
                    existing.state = incoming.state;
                    existing.incarnation = incoming.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incoming.incarnation == existing.incarnation
                    && incoming.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{:?} refuted suspicion", incoming.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::info!(
                    "Discovered member {:?} gossip={} http={}",
                    incoming.id,
                    incoming.gossip_addr,
                    incoming.http_addr
                );
                let mut fresh = incoming;
                fresh.last_seen = Some(Instant::now());
                self.members.insert(fresh.id.clone(), fresh);
            }
        }
    }

    fn handle_join(&self, mut node: Node) -> Result<()> {
        tracing::info!("Node {:?} joining from {}", node.id, node.gossip_addr);
        node.last_seen = Some(Instant::now());
        self.members.insert(node.id.clone(), node);
        tracing::info!("Cluster size now: {}", self.members.len());
        Ok(())
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        if node_id == self.local_node.id {
            // Refute: bump our incarnation and broadcast that we are alive.
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                *inc += 1;
                *inc
            };
            if let Some(mut me) = self.members.get_mut(&node_id) {
                me.incarnation = my_incarnation;
                me.state = NodeState::Alive;
                me.last_seen = Some(Instant::now());
            }
            let alive = GossipMessage::Alive { node_id, incarnation: my_incarnation };
            self.broadcast(alive).await;
            return Ok(());
        }

        if let Some(mut member) = self.members.get_mut(&node_id) {
            if incarnation >= member.incarnation && member.state == NodeState::Alive {
                tracing::info!("Node {:?} suspected", member.id);
                member.state = NodeState::Suspect;
                member.incarnation = incarnation;
            }
        }
        Ok(())
    }

    fn handle_alive(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        if let Some(mut member) = self.members.get_mut(&node_id) {
            if incarnation > member.incarnation
                || (incarnation == member.incarnation && member.state == NodeState::Suspect)
            {
                tracing::info!("Node {:?} alive (inc={})", member.id, incarnation);
                member.state = NodeState::Alive;
                member.incarnation = incarnation;
                member.last_seen = Some(Instant::now());
            }
        }
        Ok(())
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);
        loop {
            interval.tick().await;
            let now = Instant::now();
            let mut suspicions = Vec::new();

            for mut entry in self.members.iter_mut() {
                let member = entry.value_mut();
                if member.id == self.local_node.id {
                    continue;
                }

                let Some(last_seen) = member.last_seen else {
                    member.last_seen = Some(now);
                    continue;
                };
                let elapsed = now.duration_since(last_seen);

                match member.state {
                    NodeState::Alive if elapsed > SUSPECT_TIMEOUT => {
                        tracing::warn!(
                            "Node {:?} suspected (no contact for {:?})",
                            member.id,
                            elapsed
                        );
                        member.state = NodeState::Suspect;
                        suspicions.push(GossipMessage::Suspect {
                            node_id: member.id.clone(),
                            incarnation: member.incarnation,
                        });
                    }
                    NodeState::Suspect if elapsed > DEAD_TIMEOUT => {
                        tracing::warn!(
                            "Node {:?} declared dead (no contact for {:?})",
                            member.id,
                            elapsed
                        );
                        member.state = NodeState::Dead;
                    }
                    _ => {}
                }
            }

            for msg in suspicions {
                self.broadcast(msg).await;
            }
        }
    }

    async fn broadcast(&self, msg: GossipMessage) {
        let Ok(encoded) = bincode::serialize(&msg) else {
            tracing::error!("Failed to encode gossip broadcast");
            return;
        };
        for entry in self.members.iter() {
            let member = entry.value();
            if member.id == self.local_node.id || member.state != NodeState::Alive {
                continue;
            }
            if let Err(e) = self.socket.send_to(&encoded, member.gossip_addr).await {
                tracing::warn!("Failed to broadcast to {:?}: {}", member.id, e);
            }
        }
    }
}
