use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use ushadow_core::{DeploymentManager, FleetManager, MeshRouter, SecretBox};
use ushadow_definitions::{Deployment, Result};
use ushadow_filebacked::{InstanceStore, TemplateRegistry, WiringStore};
use ushadow_settings::SettingsStore;

use crate::clusters::ClusterManager;

/// The canonical shared state for the actix app.
///
/// Consumers (HTTP handlers) only ever go through the public methods on
/// this struct; no handler takes a raw lock itself. Each filebacked store
/// guards its own file, so a lock here only ever blocks other requests,
/// never the whole process.
pub struct AppContext {
    pub data_dir: PathBuf,
    templates: RwLock<TemplateRegistry>,
    instances: Mutex<InstanceStore>,
    wiring: Mutex<WiringStore>,
    settings: Arc<Mutex<SettingsStore>>,
    /// Ephemeral cache of deployment records, keyed by deployment id.
    /// Backends are themselves stateless (spec.md 4.4.2); this cache only
    /// spares handlers from re-querying the backend on every read, and is
    /// rebuilt lazily from `Backend::list_deployments` after a restart.
    deployments: Mutex<BTreeMap<String, Deployment>>,
    pub deployer: DeploymentManager,
    pub fleet: Arc<FleetManager>,
    pub clusters: ClusterManager,
    pub http: reqwest::Client,
}

impl AppContext {
    pub async fn new(
        data_dir: PathBuf,
        fleet: Arc<FleetManager>,
        auth_secret: &str,
        mesh: Arc<dyn MeshRouter>,
        mesh_hostname: String,
    ) -> Result<Self> {
        let templates = TemplateRegistry::new(data_dir.join("compose"), data_dir.join("providers"))?;
        let instances = InstanceStore::load(data_dir.join("instances.yaml"))?;
        let wiring = WiringStore::load(data_dir.join("wiring.yaml"))?;
        let settings = Arc::new(Mutex::new(SettingsStore::load(&data_dir.join("settings.yaml"))?));

        let mut deployer = DeploymentManager::new();
        match ushadow_core::deploy::docker::LocalDockerBackend::connect(settings.clone(), mesh, mesh_hostname) {
            Ok(docker) => deployer = deployer.with_local_docker(docker),
            Err(e) => warn!("local docker daemon unreachable; local deploys will fail until it is: {}", e),
        }

        let secretbox = SecretBox::from_passphrase(auth_secret)?;
        let clusters = ClusterManager::new(&data_dir, secretbox)?;
        if let Err(e) = clusters.restore_from_disk().await {
            warn!("could not restore registered kubernetes clusters: {}", e);
        }

        Ok(AppContext {
            data_dir,
            templates: RwLock::new(templates),
            instances: Mutex::new(instances),
            wiring: Mutex::new(wiring),
            settings,
            deployments: Mutex::new(BTreeMap::new()),
            deployer,
            fleet,
            clusters,
            http: reqwest::Client::new(),
        })
    }

    pub fn reload_templates(&self) -> Result<usize> {
        let mut templates = self.templates.write().unwrap();
        templates.reload()?;
        Ok(templates.list().len())
    }

    pub fn with_templates<R>(&self, f: impl FnOnce(&TemplateRegistry) -> R) -> R {
        f(&self.templates.read().unwrap())
    }

    pub fn with_instances<R>(&self, f: impl FnOnce(&InstanceStore) -> R) -> R {
        f(&self.instances.lock().unwrap())
    }

    pub fn with_instances_mut<R>(&self, f: impl FnOnce(&mut InstanceStore) -> R) -> R {
        f(&mut self.instances.lock().unwrap())
    }

    pub fn with_wiring<R>(&self, f: impl FnOnce(&WiringStore) -> R) -> R {
        f(&self.wiring.lock().unwrap())
    }

    pub fn with_wiring_mut<R>(&self, f: impl FnOnce(&mut WiringStore) -> R) -> R {
        f(&mut self.wiring.lock().unwrap())
    }

    pub fn with_settings_mut<R>(&self, f: impl FnOnce(&mut SettingsStore) -> R) -> R {
        f(&mut self.settings.lock().unwrap())
    }

    pub fn record_deployment(&self, deployment: Deployment) {
        self.deployments.lock().unwrap().insert(deployment.id.clone(), deployment);
    }

    pub fn get_deployment(&self, id: &str) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(id).cloned()
    }

    pub fn deployments_for(&self, instance_id: &str) -> Vec<Deployment> {
        self.deployments.lock().unwrap().values().filter(|d| d.instance_id == instance_id).cloned().collect()
    }

    pub fn active_deployments_for(&self, instance_id: &str) -> Vec<Deployment> {
        self.deployments_for(instance_id).into_iter().filter(|d| d.is_active()).collect()
    }
}
