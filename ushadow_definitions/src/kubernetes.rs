use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KubernetesClusterStatus {
    Connected,
    Connecting,
    Unreachable,
    Error,
}

/// A snapshot of `kubectl get nodes`-equivalent and namespaced infra
/// inventory, cached so resolution/compilation don't hit the API server on
/// every call (spec.md 4.4.4 infra scan).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct InfraScan {
    pub scanned_at: Option<DateTime<Utc>>,
    pub config_maps: Vec<String>,
    pub secrets: Vec<String>,
    pub persistent_volume_claims: Vec<String>,
    pub ingress_classes: Vec<String>,
}

/// A registered Kubernetes target. The kubeconfig payload itself is never
/// held in this struct nor serialized alongside it — the leader keeps the
/// registry of these in memory and the live `kube::Client` built from the
/// kubeconfig separately, the same way deployment records are a runtime
/// cache rather than a persisted store (backends are stateless; the
/// cluster itself is the source of truth for everything but this slip of
/// bookkeeping).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KubernetesCluster {
    pub id: String,
    pub display_name: String,
    pub kubeconfig_context: String,
    pub server_url: Option<String>,
    pub status: KubernetesClusterStatus,
    pub server_version: Option<String>,
    pub node_count: Option<u32>,
    pub default_namespace: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Cached scan results, keyed by namespace.
    #[serde(default)]
    pub infra: BTreeMap<String, InfraScan>,

    pub added_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl KubernetesCluster {
    pub fn new(id: String, display_name: String, kubeconfig_context: String) -> Self {
        KubernetesCluster {
            id,
            display_name,
            kubeconfig_context,
            server_url: None,
            status: KubernetesClusterStatus::Connecting,
            server_version: None,
            node_count: None,
            default_namespace: "default".to_string(),
            labels: BTreeMap::new(),
            infra: BTreeMap::new(),
            added_at: Utc::now(),
            last_checked: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == KubernetesClusterStatus::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cluster_defaults_to_default_namespace() {
        let c = KubernetesCluster::new("prod".into(), "Prod cluster".into(), "prod-ctx".into());
        assert_eq!(c.default_namespace, "default");
        assert!(!c.is_connected());
    }
}
