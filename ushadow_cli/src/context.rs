use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ushadow_core::deploy::docker::LocalDockerBackend;
use ushadow_core::mesh::ProcessMeshRouter;
use ushadow_core::DeploymentManager;
use ushadow_definitions::Result;
use ushadow_filebacked::{InstanceStore, TemplateRegistry, WiringStore};
use ushadow_settings::SettingsStore;

/// Everything a one-shot `ushadowctl` invocation needs, loaded directly
/// against a data directory the same way `ushadow_leader::state::AppContext`
/// does — but owned (not behind locks), since a CLI command runs to
/// completion on one thread and never shares this with another request.
/// `settings` is still behind an `Arc<Mutex<_>>` despite the single-thread
/// use, purely so the same store can be handed to [`LocalDockerBackend`]
/// for its port-remap overrides without a second, divergent copy.
pub struct CliContext {
    pub data_dir: PathBuf,
    pub templates: TemplateRegistry,
    pub instances: InstanceStore,
    pub wiring: WiringStore,
    pub settings: Arc<Mutex<SettingsStore>>,
    pub deployer: DeploymentManager,
}

impl CliContext {
    pub fn load(data_dir: PathBuf) -> Result<Self> {
        let templates = TemplateRegistry::new(data_dir.join("compose"), data_dir.join("providers"))?;
        let instances = InstanceStore::load(data_dir.join("instances.yaml"))?;
        let wiring = WiringStore::load(data_dir.join("wiring.yaml"))?;
        let settings = Arc::new(Mutex::new(SettingsStore::load(&data_dir.join("settings.yaml"))?));

        let mesh_hostname = std::env::var("TAILSCALE_HOSTNAME")
            .or_else(|_| std::env::var("HOST_HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        let mesh = Arc::new(ProcessMeshRouter::default());

        let mut deployer = DeploymentManager::new();
        match LocalDockerBackend::connect(settings.clone(), mesh, mesh_hostname) {
            Ok(docker) => deployer = deployer.with_local_docker(docker),
            Err(e) => warn!("local docker daemon unreachable; local deploys will fail until it is: {}", e),
        }

        Ok(CliContext { data_dir, templates, instances, wiring, settings, deployer })
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit.log")
    }
}
