use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ushadow_definitions::resolved::ResolvedEnv;
use ushadow_definitions::{BackendType, Deployment, DeploymentStatus, ErrorKind, Result};
use ushadow_filebacked::{InstanceStore, TemplateRegistry, WiringStore};
use ushadow_settings::SettingsStore;

use crate::resolver::CapabilityResolver;
use super::backend::Backend;
use super::compose;
use super::docker::LocalDockerBackend;
use super::kubernetes::KubernetesBackend;

/// The output of [`DeploymentManager::prepare_deploy`]: everything the
/// async half needs, with no remaining borrow into the filebacked stores.
pub struct PreparedDeploy {
    instance_id: String,
    compose_file: PathBuf,
    service: String,
    env: BTreeMap<String, ResolvedEnv>,
}

/// Guards against two deploys racing for the same `(service, target[,
/// instance])` key (spec.md 5, ordering guarantee i). Held for the
/// duration of one deploy/stop/remove/restart call; dropped automatically
/// releases the key even on error or panic-unwind.
struct DeployGuard {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}

/// Orchestrates the capability resolver and the backend selected for an
/// instance's target (spec.md 4.4/5). Holds no durable state itself —
/// everything persistent lives in the filebacked stores it's handed, or
/// in whatever record store the caller (the leader process) keeps
/// [`Deployment`]s in.
pub struct DeploymentManager {
    in_flight: Arc<Mutex<HashSet<String>>>,
    local_docker: Option<LocalDockerBackend>,
}

impl DeploymentManager {
    pub fn new() -> Self {
        DeploymentManager { in_flight: Arc::new(Mutex::new(HashSet::new())), local_docker: None }
    }

    pub fn with_local_docker(mut self, backend: LocalDockerBackend) -> Self {
        self.local_docker = Some(backend);
        self
    }

    fn lock_key(service_id: &str, target: &str, instance_id: Option<&str>) -> String {
        match instance_id {
            Some(id) => format!("{}::{}::{}", service_id, target, id),
            None => format!("{}::{}", service_id, target),
        }
    }

    fn acquire(&self, key: &str) -> Result<DeployGuard> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(key.to_string()) {
            return Err(ErrorKind::ConcurrentDeploy(key.to_string()).into());
        }
        Ok(DeployGuard { key: key.to_string(), in_flight: self.in_flight.clone() })
    }

    /// Synchronous half of a deploy: resolves `instance_id`'s environment
    /// against the filebacked stores (spec.md 4.3) and looks up its
    /// compose body. Deliberately takes no lock that needs to survive an
    /// `.await` — callers holding `Mutex` guards on the stores should
    /// drop them before calling [`deploy_resolved`](Self::deploy_resolved)
    /// with the result.
    pub fn prepare_deploy(
        &self,
        templates: &TemplateRegistry,
        instances: &InstanceStore,
        wiring: &WiringStore,
        settings: &mut SettingsStore,
        instance_id: &str,
    ) -> Result<PreparedDeploy> {
        let instance = instances.require(instance_id)?.clone();

        let mut resolver = CapabilityResolver::new(templates, instances, wiring, settings);
        let env = resolver.resolve(instance_id)?;

        let template = templates.require(&instance.template_id)?;
        let (compose_file, service) = match &template.source {
            ushadow_definitions::Source::Compose { compose_file, service } => (compose_file.clone(), service.clone()),
            ushadow_definitions::Source::Provider { .. } => {
                return Err(ErrorKind::BackendError("provider templates have no deployable service body".into()).into())
            }
        };

        Ok(PreparedDeploy { instance_id: instance_id.to_string(), compose_file, service, env })
    }

    /// Renders the compose service for a prepared instance without
    /// dispatching to any backend — the compose-resolution half of
    /// `deploy_resolved`, reused by `--dry-run` and [`diff`](Self::diff).
    pub async fn resolve(&self, prepared: PreparedDeploy) -> Result<ushadow_definitions::resolved::ResolvedServiceDefinition> {
        compose::resolve_service_definition(&prepared.instance_id, &prepared.compose_file, &prepared.service, prepared.env).await
    }

    /// Asynchronous half: renders the compose service and ships it to the
    /// chosen backend (spec.md 4.4.1 → 4.4.2 handoff). Holds the
    /// per-target deploy lock for its own duration only.
    pub async fn deploy_resolved(
        &self,
        prepared: PreparedDeploy,
        backend_type: BackendType,
        target: &str,
        namespace: Option<&str>,
    ) -> Result<Deployment> {
        let _guard = self.acquire(&Self::lock_key(&prepared.instance_id, target, None))?;

        let instance_id = prepared.instance_id.clone();
        let resolved = self.resolve(prepared).await?;
        let deployment_id = format!("{}-{}", instance_id, uuid::Uuid::new_v4());

        let backend = self.backend_for(backend_type, target)?;
        backend.deploy(target, &resolved, &deployment_id, namespace).await
    }

    pub async fn stop(&self, deployment: &Deployment) -> Result<bool> {
        let _guard = self.acquire(&Self::lock_key(&deployment.instance_id, &deployment.target_id, None))?;
        self.backend_for(deployment.backend_type, &deployment.target_id)?.stop(&deployment.target_id, deployment).await
    }

    pub async fn remove(&self, deployment: &Deployment) -> Result<bool> {
        let _guard = self.acquire(&Self::lock_key(&deployment.instance_id, &deployment.target_id, None))?;
        self.backend_for(deployment.backend_type, &deployment.target_id)?.remove(&deployment.target_id, deployment).await
    }

    pub async fn restart(&self, deployment: &Deployment) -> Result<bool> {
        let _guard = self.acquire(&Self::lock_key(&deployment.instance_id, &deployment.target_id, None))?;
        self.backend_for(deployment.backend_type, &deployment.target_id)?.restart(&deployment.target_id, deployment).await
    }

    pub async fn refresh_status(&self, deployment: &Deployment) -> Result<DeploymentStatus> {
        self.backend_for(deployment.backend_type, &deployment.target_id)?.get_status(&deployment.target_id, deployment).await
    }

    pub async fn logs(&self, deployment: &Deployment, tail: usize) -> Result<Vec<String>> {
        self.backend_for(deployment.backend_type, &deployment.target_id)?.get_logs(&deployment.target_id, deployment, tail).await
    }

    /// On-demand comparison of what a deployment was actually deployed
    /// with against what its instance would resolve to right now. Never
    /// acts on the result — spec.md has no reconciliation loop, this is
    /// purely an operator-facing report (`ushadowctl diff`).
    pub async fn diff(
        &self,
        templates: &TemplateRegistry,
        instances: &InstanceStore,
        wiring: &WiringStore,
        settings: &mut SettingsStore,
        deployment: &Deployment,
    ) -> Result<Vec<crate::diff::DiffEntry>> {
        let prepared = self.prepare_deploy(templates, instances, wiring, settings, &deployment.instance_id)?;
        let current = self.resolve(prepared).await?;
        match &deployment.deployed_config {
            Some(deployed) => Ok(crate::diff::diff_resolved(deployed, &current)),
            None => Ok(vec![crate::diff::DiffEntry {
                field: "deployed_config".into(),
                deployed: "<none recorded>".into(),
                current: "<n/a>".into(),
            }]),
        }
    }

    fn backend_for(&self, backend_type: BackendType, target: &str) -> Result<Box<dyn Backend + '_>> {
        match backend_type {
            BackendType::Docker if target == "local" => self
                .local_docker
                .as_ref()
                .map(|b| Box::new(LocalDockerRef(b)) as Box<dyn Backend + '_>)
                .ok_or_else(|| ErrorKind::BackendError("local docker backend not configured".into()).into()),
            BackendType::Docker => Ok(Box::new(super::docker::RemoteDockerBackend::new(reqwest::Client::new()))),
            BackendType::Kubernetes => {
                Err(ErrorKind::BackendError("kubernetes deploys require a cluster-scoped manager; use KubernetesBackend directly".into()).into())
            }
        }
    }
}

impl Default for DeploymentManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a borrowed [`LocalDockerBackend`] to the boxed-trait-object
/// shape `backend_for` returns, since the manager only ever holds one.
struct LocalDockerRef<'a>(&'a LocalDockerBackend);

#[async_trait::async_trait]
impl<'a> Backend for LocalDockerRef<'a> {
    async fn deploy(
        &self,
        target: &str,
        resolved: &ushadow_definitions::resolved::ResolvedServiceDefinition,
        deployment_id: &str,
        namespace: Option<&str>,
    ) -> Result<Deployment> {
        self.0.deploy(target, resolved, deployment_id, namespace).await
    }
    async fn stop(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.0.stop(target, deployment).await
    }
    async fn remove(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.0.remove(target, deployment).await
    }
    async fn restart(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.0.restart(target, deployment).await
    }
    async fn get_status(&self, target: &str, deployment: &Deployment) -> Result<DeploymentStatus> {
        self.0.get_status(target, deployment).await
    }
    async fn get_logs(&self, target: &str, deployment: &Deployment, tail: usize) -> Result<Vec<String>> {
        self.0.get_logs(target, deployment, tail).await
    }
    async fn list_deployments(&self, target: &str, service_id: Option<&str>) -> Result<Vec<Deployment>> {
        self.0.list_deployments(target, service_id).await
    }
}

/// The Kubernetes backend is cluster-scoped (one client per registered
/// cluster) rather than a single process-wide instance, so it is
/// constructed and driven directly by the leader's cluster manager
/// instead of through `DeploymentManager::backend_for`. Exposed here so
/// callers building that manager can reuse the same [`Backend`] trait.
pub fn kubernetes_backend(client: kube::Client) -> KubernetesBackend {
    KubernetesBackend::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_distinguishes_targets() {
        let a = DeploymentManager::lock_key("my-db", "local", None);
        let b = DeploymentManager::lock_key("my-db", "node-2", None);
        assert_ne!(a, b);
    }

    #[test]
    fn acquire_rejects_concurrent_hold_on_same_key() {
        let manager = DeploymentManager::new();
        let key = DeploymentManager::lock_key("my-db", "local", None);
        let _first = manager.acquire(&key).unwrap();
        assert!(manager.acquire(&key).is_err());
    }

    #[test]
    fn releasing_a_guard_frees_the_key() {
        let manager = DeploymentManager::new();
        let key = DeploymentManager::lock_key("my-db", "local", None);
        {
            let _guard = manager.acquire(&key).unwrap();
        }
        assert!(manager.acquire(&key).is_ok());
    }
}
