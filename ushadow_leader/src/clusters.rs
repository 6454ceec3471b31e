use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;

use ushadow_definitions::kubernetes::{InfraScan, KubernetesClusterStatus};
use ushadow_definitions::{ErrorKind, KubernetesCluster, Result};
use ushadow_core::SecretBox;

/// Registered Kubernetes clusters, keyed by id. Cluster metadata and the
/// live `kube::Client` built from each kubeconfig are kept in memory only
/// (the cluster itself is the source of truth for everything but this
/// bookkeeping, the same reasoning that keeps deployment records an
/// in-memory cache). The kubeconfig payload is sealed with the leader's
/// own [`SecretBox`] and written to `<data_dir>/clusters/<id>.kubeconfig.enc`
/// so a restarted leader can rebuild its clients without re-prompting an
/// operator for credentials.
pub struct ClusterManager {
    clusters: Mutex<BTreeMap<String, KubernetesCluster>>,
    clients: Mutex<BTreeMap<String, Client>>,
    secretbox: SecretBox,
    clusters_dir: PathBuf,
}

impl ClusterManager {
    pub fn new(data_dir: &std::path::Path, secretbox: SecretBox) -> Result<Self> {
        let clusters_dir = data_dir.join("clusters");
        fs::create_dir_all(&clusters_dir)?;
        Ok(ClusterManager {
            clusters: Mutex::new(BTreeMap::new()),
            clients: Mutex::new(BTreeMap::new()),
            secretbox,
            clusters_dir,
        })
    }

    fn sealed_path(&self, id: &str) -> PathBuf {
        self.clusters_dir.join(format!("{}.kubeconfig.enc", id))
    }

    fn write_sealed(&self, id: &str, sealed: &str) -> Result<()> {
        let path = self.sealed_path(id);
        let tmp = path.with_extension("kubeconfig.enc.tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Rebuilds a client for every `<id>.kubeconfig.enc` found on disk.
    /// Cluster metadata (display name, status, infra cache) does not
    /// survive a restart, since it holds nothing the live cluster can't
    /// re-derive; only connectivity does.
    pub async fn restore_from_disk(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.clusters_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let id = match file_name.strip_suffix(".kubeconfig.enc") {
                Some(id) => id,
                None => continue,
            };
            let sealed = fs::read_to_string(entry.path())?;
            let kubeconfig_yaml = match self.secretbox.open(&sealed) {
                Ok(yaml) => yaml,
                Err(e) => {
                    warn!("could not decrypt stored kubeconfig for cluster '{}': {}", id, e);
                    continue;
                }
            };
            if let Err(e) = self.register(id.to_string(), id.to_string(), &kubeconfig_yaml).await {
                warn!("could not reconnect cluster '{}' from disk: {}", id, e);
            }
        }
        Ok(())
    }

    /// Registers a cluster from a raw kubeconfig YAML document, sealing
    /// it for storage and building a live client to confirm reachability
    /// before accepting the registration.
    pub async fn register(&self, id: String, display_name: String, kubeconfig_yaml: &str) -> Result<KubernetesCluster> {
        let kubeconfig = Kubeconfig::from_yaml(kubeconfig_yaml)
            .map_err(|e| ErrorKind::BackendError(format!("invalid kubeconfig: {}", e)))?;
        let context_name = kubeconfig.current_context.clone().unwrap_or_default();

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ErrorKind::BackendError(format!("could not build kube config: {}", e)))?;
        let server_url = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();

        let client = Client::try_from(config).map_err(|e| ErrorKind::BackendError(format!("could not build kube client: {}", e)))?;

        let mut cluster = KubernetesCluster::new(id.clone(), display_name, context_name);
        cluster.server_url = Some(server_url);
        cluster.default_namespace = default_namespace;
        cluster.status = KubernetesClusterStatus::Connected;

        let sealed = self
            .secretbox
            .seal(kubeconfig_yaml)
            .map_err(|e| ErrorKind::BackendError(format!("could not seal kubeconfig: {}", e)))?;
        self.write_sealed(&id, &sealed)?;

        self.clusters.lock().unwrap().insert(id.clone(), cluster.clone());
        self.clients.lock().unwrap().insert(id, client);
        Ok(cluster)
    }

    pub fn list(&self) -> Vec<KubernetesCluster> {
        self.clusters.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<KubernetesCluster> {
        self.clusters.lock().unwrap().get(id).cloned()
    }

    pub fn client_for(&self, id: &str) -> Option<Client> {
        self.clients.lock().unwrap().get(id).cloned()
    }

    pub async fn scan_infra(&self, id: &str, namespace: &str) -> Result<InfraScan> {
        let client = self.client_for(id).ok_or_else(|| ErrorKind::BackendError(format!("unknown cluster '{}'", id)))?;
        let backend = ushadow_core::deploy::kubernetes::KubernetesBackend::new(client);
        let scan = backend.scan_infra(namespace).await?;

        if let Some(cluster) = self.clusters.lock().unwrap().get_mut(id) {
            cluster.infra.insert(namespace.to_string(), scan.clone());
            cluster.last_checked = Some(chrono::Utc::now());
        }
        Ok(scan)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.clients.lock().unwrap().remove(id);
        let _ = fs::remove_file(self.sealed_path(id));
        self.clusters
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ErrorKind::BackendError(format!("unknown cluster '{}'", id)).into())
    }
}
