use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodePlatform {
    Linux,
    MacOS,
    Windows,
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Docker,
    Kubernetes,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Leader,
    Worker,
    Standby,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Connecting,
    Offline,
    Error,
}

/// What a joined worker reported about itself at registration time
/// (spec.md 4.5 join/registration flow).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeCapabilities {
    pub platform: Option<NodePlatform>,
    pub docker_available: bool,
    pub kubernetes_available: bool,
    pub total_memory_mb: Option<u64>,
    pub cpu_count: Option<u32>,
}

/// A single-use (or time-boxed) credential handed out by the leader so a
/// prospective worker can authenticate its first registration call.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JoinToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl JoinToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_usable(&self) -> bool {
        !self.used && !self.is_expired()
    }
}

/// A member of the fleet: the leader itself, or a joined worker.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Node {
    pub id: String,
    pub display_name: String,
    pub role: NodeRole,
    pub node_type: NodeType,
    pub status: NodeStatus,

    pub mesh_address: Option<String>,
    pub capabilities: NodeCapabilities,

    /// Ids of instances currently claimed as deployed on this node, used to
    /// prevent concurrent conflicting deploys to the same target (spec.md
    /// 4.4.1 deployment-manager serialization).
    #[serde(default)]
    pub claimed_instance_ids: Vec<String>,

    pub agent_version: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,

    pub joined_at: DateTime<Utc>,
}

impl Node {
    pub fn new(id: String, display_name: String, role: NodeRole, node_type: NodeType) -> Self {
        Node {
            id,
            display_name,
            role,
            node_type,
            status: NodeStatus::Connecting,
            mesh_address: None,
            capabilities: NodeCapabilities::default(),
            claimed_instance_ids: Vec::new(),
            agent_version: None,
            last_heartbeat: None,
            joined_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, grace_period: chrono::Duration) -> bool {
        match self.last_heartbeat {
            Some(hb) => Utc::now() - hb > grace_period,
            None => true,
        }
    }

    pub fn claim(&mut self, instance_id: &str) {
        if !self.claimed_instance_ids.iter().any(|i| i == instance_id) {
            self.claimed_instance_ids.push(instance_id.to_string());
        }
    }

    pub fn release(&mut self, instance_id: &str) {
        self.claimed_instance_ids.retain(|i| i != instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_token_expiry() {
        let now = Utc::now();
        let tok = JoinToken {
            token: "abc".into(),
            created_at: now,
            expires_at: now - chrono::Duration::seconds(1),
            used: false,
        };
        assert!(tok.is_expired());
        assert!(!tok.is_usable());
    }

    #[test]
    fn claim_then_release_is_idempotent() {
        let mut n = Node::new("node-1".into(), "Node 1".into(), NodeRole::Worker, NodeType::Docker);
        n.claim("my-db");
        n.claim("my-db");
        assert_eq!(n.claimed_instance_ids.len(), 1);
        n.release("my-db");
        assert!(n.claimed_instance_ids.is_empty());
    }

    #[test]
    fn node_with_no_heartbeat_is_stale() {
        let n = Node::new("node-1".into(), "Node 1".into(), NodeRole::Worker, NodeType::Docker);
        assert!(n.is_stale(chrono::Duration::seconds(30)));
    }
}
