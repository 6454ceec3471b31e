use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};

use ushadow_definitions::node::{JoinToken, NodeCapabilities};
use ushadow_definitions::{ErrorKind, Node, NodeRole, NodeStatus, NodeType, Result};

use crate::mesh::MeshRouter;

/// How long a join token stays usable before it must be reissued.
const JOIN_TOKEN_TTL_MINUTES: i64 = 30;
/// How long without a heartbeat before a node is considered stale
/// (spec.md 4.5 heartbeat/offline detection).
const HEARTBEAT_GRACE_SECONDS: i64 = 90;

/// The node fleet: the leader plus every worker that has joined, and the
/// join tokens issued but not yet consumed. Held behind a `RwLock` since
/// heartbeats and registrations race against reads from the HTTP surface
/// (spec.md 4.5).
pub struct FleetManager {
    nodes: RwLock<BTreeMap<String, Node>>,
    tokens: RwLock<BTreeMap<String, JoinToken>>,
    mesh: Arc<dyn MeshRouter>,
}

impl FleetManager {
    pub fn new(mesh: Arc<dyn MeshRouter>, leader_id: impl Into<String>, leader_display_name: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        let leader = Node::new(leader_id.into(), leader_display_name.into(), NodeRole::Leader, NodeType::Docker);
        nodes.insert(leader.id.clone(), leader);
        FleetManager { nodes: RwLock::new(nodes), tokens: RwLock::new(BTreeMap::new()) , mesh}
    }

    /// Issues a fresh single-use join token (spec.md 4.5 step 1).
    pub fn create_token(&self) -> JoinToken {
        let now = Utc::now();
        let token = JoinToken {
            token: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(JOIN_TOKEN_TTL_MINUTES),
            used: false,
        };
        self.tokens.write().unwrap().insert(token.token.clone(), token.clone());
        token
    }

    /// Renders the one-line install command a prospective worker runs,
    /// embedding the leader's own mesh address and the fresh token so the
    /// agent can reach back and register itself (spec.md 4.5 bootstrap
    /// script). `shell` selects between the POSIX and PowerShell variant.
    pub fn render_bootstrap_script(&self, leader_address: &str, token: &JoinToken, shell: BootstrapShell) -> String {
        match shell {
            BootstrapShell::Bash => format!(
                "curl -fsSL https://get.ushadow.dev/unode.sh | bash -s -- --leader {} --token {}",
                leader_address, token.token
            ),
            BootstrapShell::PowerShell => format!(
                "iwr https://get.ushadow.dev/unode.ps1 -UseBasicParsing | iex; Install-Unode -Leader {} -Token {}",
                leader_address, token.token
            ),
        }
    }

    /// Consumes a join token and records the registering worker (spec.md
    /// 4.5 step 2). Returns an error if the token is unknown, already
    /// used, or expired, so a replayed registration call never succeeds
    /// twice.
    pub fn register_unode(
        &self,
        token_value: &str,
        node_id: String,
        display_name: String,
        node_type: NodeType,
        mesh_address: String,
        capabilities: NodeCapabilities,
        agent_version: String,
    ) -> Result<Node> {
        {
            let mut tokens = self.tokens.write().unwrap();
            let token = tokens
                .get_mut(token_value)
                .ok_or_else(|| ErrorKind::BackendError("unknown join token".into()))?;
            if !token.is_usable() {
                return Err(ErrorKind::BackendError("join token expired or already used".into()).into());
            }
            token.used = true;
        }

        let mut node = Node::new(node_id.clone(), display_name, NodeRole::Worker, node_type);
        node.mesh_address = Some(mesh_address);
        node.capabilities = capabilities;
        node.agent_version = Some(agent_version);
        node.status = NodeStatus::Online;
        node.last_heartbeat = Some(Utc::now());

        self.nodes.write().unwrap().insert(node_id, node.clone());
        Ok(node)
    }

    /// Records a heartbeat from a previously registered worker (spec.md
    /// 4.5 step 3).
    pub fn heartbeat(&self, node_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get_mut(node_id).ok_or_else(|| ErrorKind::UnknownInstance(node_id.to_string()))?;
        node.last_heartbeat = Some(Utc::now());
        node.status = NodeStatus::Online;
        Ok(())
    }

    /// Marks every node whose heartbeat is older than the grace period as
    /// offline. Called on a timer by the leader process, not per-request.
    pub fn sweep_stale_nodes(&self) {
        let mut nodes = self.nodes.write().unwrap();
        for node in nodes.values_mut() {
            if node.role != NodeRole::Leader && node.is_stale(Duration::seconds(HEARTBEAT_GRACE_SECONDS)) {
                node.status = NodeStatus::Offline;
            }
        }
    }

    pub fn list(&self) -> Vec<Node> {
        self.nodes.read().unwrap().values().cloned().collect()
    }

    pub fn get(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().unwrap().get(node_id).cloned()
    }

    pub fn claim(&self, node_id: &str, instance_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get_mut(node_id).ok_or_else(|| ErrorKind::UnknownInstance(node_id.to_string()))?;
        node.claim(instance_id);
        Ok(())
    }

    pub fn release(&self, node_id: &str, instance_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get_mut(node_id).ok_or_else(|| ErrorKind::UnknownInstance(node_id.to_string()))?;
        node.release(instance_id);
        Ok(())
    }

    pub fn remove(&self, node_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.get(node_id).ok_or_else(|| ErrorKind::UnknownInstance(node_id.to_string()))?;
        if node.role == NodeRole::Leader {
            return Err(ErrorKind::BackendError("cannot remove the leader from the fleet".into()).into());
        }
        nodes.remove(node_id);
        Ok(())
    }

    /// Cross-checks the fleet roster against what the mesh agent itself
    /// reports reachable, refreshing `mesh_address`/`status` for any node
    /// whose recorded address has drifted (spec.md 4.6 peer discovery).
    pub async fn refresh_from_mesh(&self) -> Result<()> {
        let peers = self.mesh.peers().await?;
        let mut nodes = self.nodes.write().unwrap();
        for peer in peers {
            if let Some(node) = nodes.get_mut(&peer.node_id) {
                node.mesh_address = Some(peer.mesh_address);
                if !peer.reachable && node.role != NodeRole::Leader {
                    node.status = NodeStatus::Offline;
                }
            }
        }
        Ok(())
    }

    /// What a worker's leader-info endpoint response needs: enough for a
    /// unode agent to know who it answers to and how to reach it over the
    /// mesh (spec.md 4.5 leader-info).
    pub fn leader_info(&self, leader_address: &str) -> LeaderInfo {
        let nodes = self.nodes.read().unwrap();
        let leader = nodes.values().find(|n| n.role == NodeRole::Leader);
        LeaderInfo {
            leader_id: leader.map(|n| n.id.clone()).unwrap_or_default(),
            leader_address: leader_address.to_string(),
            worker_count: nodes.values().filter(|n| n.role == NodeRole::Worker).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapShell {
    Bash,
    PowerShell,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
    pub leader_id: String,
    pub leader_address: String,
    pub worker_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopMesh;
    #[async_trait]
    impl MeshRouter for NoopMesh {
        async fn peers(&self) -> Result<Vec<crate::mesh::MeshPeer>> {
            Ok(vec![])
        }
        async fn address_of(&self, _node_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn add_route(&self, _node_id: &str, _subnet: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_route(&self, _node_id: &str, _subnet: &str) -> Result<()> {
            Ok(())
        }
        async fn add_path_route(&self, _path: &str, _container_name: &str, _port: u16) -> Result<()> {
            Ok(())
        }
        async fn remove_path_route(&self, _path: &str) -> Result<()> {
            Ok(())
        }
    }

    fn manager() -> FleetManager {
        FleetManager::new(Arc::new(NoopMesh), "leader-1", "Leader")
    }

    #[test]
    fn registering_consumes_the_token_exactly_once() {
        let fleet = manager();
        let token = fleet.create_token();
        fleet
            .register_unode(
                &token.token,
                "node-2".into(),
                "Worker 2".into(),
                NodeType::Docker,
                "100.64.0.2".into(),
                NodeCapabilities::default(),
                "0.1.0".into(),
            )
            .unwrap();

        let replay = fleet.register_unode(
            &token.token,
            "node-3".into(),
            "Worker 3".into(),
            NodeType::Docker,
            "100.64.0.3".into(),
            NodeCapabilities::default(),
            "0.1.0".into(),
        );
        assert!(replay.is_err());
    }

    #[test]
    fn cannot_remove_the_leader() {
        let fleet = manager();
        assert!(fleet.remove("leader-1").is_err());
    }

    #[test]
    fn heartbeat_brings_a_node_back_online() {
        let fleet = manager();
        let token = fleet.create_token();
        fleet
            .register_unode(
                &token.token,
                "node-2".into(),
                "Worker 2".into(),
                NodeType::Docker,
                "100.64.0.2".into(),
                NodeCapabilities::default(),
                "0.1.0".into(),
            )
            .unwrap();
        fleet.heartbeat("node-2").unwrap();
        assert_eq!(fleet.get("node-2").unwrap().status, NodeStatus::Online);
    }
}
