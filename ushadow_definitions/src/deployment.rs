use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::resolved::ResolvedServiceDefinition;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Docker,
    Kubernetes,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Running,
    Stopped,
    Failed,
    /// The target node/cluster no longer exists or is unreachable, but the
    /// record is kept (audit trail) rather than silently deleted.
    NotApplicable,
}

/// The runtime shadow of one deploy action against an instance: where it
/// was sent, what came back, and the config snapshot it was deployed with.
///
/// `deployed_config` is a frozen [`ResolvedServiceDefinition`] (spec.md 4.4.1
/// "portable currency") captured at deploy time, independent of whatever the
/// instance's live config later becomes — re-deploying produces a new
/// snapshot rather than mutating this one.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Deployment {
    pub id: String,
    pub instance_id: String,
    pub template_id: String,

    pub backend_type: BackendType,
    /// Node id (Docker) or cluster id (Kubernetes) this was sent to.
    pub target_id: String,

    pub status: DeploymentStatus,

    pub deployed_config: Option<ResolvedServiceDefinition>,

    /// Backend-assigned identifiers: container id/name, pod name, etc.
    /// Kept as a bag rather than named fields since the two backends shape
    /// this differently (spec.md 4.4.2 `Backend` trait boundary).
    #[serde(default)]
    pub backend_metadata: BTreeMap<String, String>,

    pub port: Option<u16>,
    pub access_url: Option<String>,

    pub healthy: Option<bool>,
    pub last_health_check: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(
        id: String,
        instance_id: String,
        template_id: String,
        backend_type: BackendType,
        target_id: String,
    ) -> Self {
        let now = Utc::now();
        Deployment {
            id,
            instance_id,
            template_id,
            backend_type,
            target_id,
            status: DeploymentStatus::Pending,
            deployed_config: None,
            backend_metadata: BTreeMap::new(),
            port: None,
            access_url: None,
            healthy: None,
            last_health_check: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Pending | DeploymentStatus::Deploying | DeploymentStatus::Running
        )
    }

    pub fn mark_failed(&mut self, detail: impl Into<String>) {
        self.status = DeploymentStatus::Failed;
        self.last_error = Some(detail.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_running(&mut self) {
        self.status = DeploymentStatus::Running;
        self.healthy = Some(true);
        self.last_error = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deployment_is_pending_and_active() {
        let d = Deployment::new(
            "d1".into(),
            "my-db".into(),
            "postgres".into(),
            BackendType::Docker,
            "node-1".into(),
        );
        assert_eq!(d.status, DeploymentStatus::Pending);
        assert!(d.is_active());
    }

    #[test]
    fn stopped_deployment_is_not_active() {
        let mut d = Deployment::new(
            "d1".into(),
            "my-db".into(),
            "postgres".into(),
            BackendType::Docker,
            "node-1".into(),
        );
        d.status = DeploymentStatus::Stopped;
        assert!(!d.is_active());
    }
}
