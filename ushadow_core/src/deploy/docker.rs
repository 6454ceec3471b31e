use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, ListContainersOptions, LogsOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, PortBinding, PortMap};
use bollard::Docker as Bollard;
use chrono::Utc;
use futures::stream::StreamExt;

use ushadow_definitions::resolved::ResolvedServiceDefinition;
use ushadow_definitions::{BackendType, Deployment, DeploymentStatus, ErrorKind, Result};
use ushadow_settings::SettingsStore;

use crate::mesh::MeshRouter;
use super::backend::Backend;

/// Container labels, authoritative over any in-memory deployment record
/// (spec.md 6): a leader restart reconstructs everything it knows about a
/// running container from these alone.
const LABEL_DEPLOYMENT: &str = "ushadow.deployment_id";
const LABEL_SERVICE: &str = "ushadow.service_id";
const LABEL_HOSTNAME: &str = "ushadow.unode_hostname";
const LABEL_DEPLOYED_AT: &str = "ushadow.deployed_at";
const LABEL_BACKEND_TYPE: &str = "ushadow.backend_type";
const LABEL_HEALTH_PATH: &str = "ushadow.health_check_path";
const LABEL_HEALTH_PORT: &str = "ushadow.health_check_port";

/// How far past a conflicting host port to search for a free one (spec.md
/// 4.4.3 "lowest free port within a per-variable allowed range"). Kept
/// small: a template whose preferred port and the next thousand are all
/// taken almost certainly has a different problem.
const PORT_REMAP_RANGE: u16 = 1000;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Deploys onto the Docker daemon reachable directly from the leader
/// process (spec.md 4.4.3, local case). Holds no state of its own beyond
/// the daemon connection: every deployment is reconstructed from
/// container labels, so a leader restart never loses track of what is
/// actually running.
pub struct LocalDockerBackend {
    client: Bollard,
    http: reqwest::Client,
    settings: Arc<Mutex<SettingsStore>>,
    mesh: Arc<dyn MeshRouter>,
    /// This leader's own mesh hostname, stamped onto every container it
    /// deploys and used to build `https://<hostname>/<service_id>` URLs.
    hostname: String,
}

impl LocalDockerBackend {
    pub fn connect(settings: Arc<Mutex<SettingsStore>>, mesh: Arc<dyn MeshRouter>, hostname: String) -> Result<Self> {
        let client = Bollard::connect_with_local_defaults()
            .map_err(|e| ErrorKind::BackendError(format!("could not connect to local docker daemon: {}", e)))?;
        Ok(LocalDockerBackend { client, http: reqwest::Client::new(), settings, mesh, hostname })
    }

    fn container_name(deployment_id: &str) -> String {
        format!("ushadow-{}", deployment_id)
    }

    /// Returns `true` if nothing is currently listening on `port` on this
    /// host. Binding and immediately dropping a listener is the same probe
    /// a user would run by hand (`nc -l`/`lsof`); it's a false negative
    /// only in the narrow race where something else grabs the port between
    /// our probe and the container's own bind, which a retpark on conflict
    /// at the daemon level would catch anyway.
    fn port_is_free(port: u16) -> bool {
        TcpListener::bind(("0.0.0.0", port)).is_ok()
    }

    /// Picks `preferred` if free, else the lowest free port in
    /// `preferred+1 ..= preferred+PORT_REMAP_RANGE`.
    fn pick_free_port(preferred: u16) -> Option<u16> {
        if Self::port_is_free(preferred) {
            return Some(preferred);
        }
        (preferred.saturating_add(1)..=preferred.saturating_add(PORT_REMAP_RANGE)).find(|&p| Self::port_is_free(p))
    }

    /// Remaps any requested host port that's already taken, returning the
    /// rewritten port list plus the `(container_port, assigned_port)` pairs
    /// that changed so the caller can persist them as settings overrides
    /// (spec.md 4.4.3 "Port-conflict remapping").
    fn remap_conflicting_ports(
        resolved: &ResolvedServiceDefinition,
    ) -> Result<(Vec<ushadow_definitions::resolved::PortMapping>, Vec<(u16, u16)>)> {
        let mut ports = resolved.ports.clone();
        let mut remapped = Vec::new();
        for p in ports.iter_mut() {
            if let Some(requested) = p.host_port {
                if !Self::port_is_free(requested) {
                    let assigned = Self::pick_free_port(requested + 1).ok_or_else(|| {
                        ErrorKind::BackendError(format!(
                            "no free host port near {} for container port {}",
                            requested, p.container_port
                        ))
                    })?;
                    debug!("port {} already in use, remapping {} -> {}", requested, p.container_port, assigned);
                    p.host_port = Some(assigned);
                    remapped.push((p.container_port, assigned));
                }
            }
        }
        Ok((ports, remapped))
    }

    /// Writes `services.<instance_id>.ports.<container_port> = host_port`
    /// for every remapped port, and saves the store so the next deploy of
    /// this instance reuses the same assignment instead of re-probing.
    fn persist_port_overrides(&self, instance_id: &str, remapped: &[(u16, u16)]) {
        if remapped.is_empty() {
            return;
        }
        let mut settings = self.settings.lock().unwrap();
        for (container_port, assigned) in remapped {
            settings.set_int(&format!("services.{}.ports.{}", instance_id, container_port), i64::from(*assigned));
        }
        if let Err(e) = settings.save() {
            warn!("could not persist port remap override for '{}': {}", instance_id, e);
        }
    }

    fn base_labels(&self, deployment_id: &str, resolved: &ResolvedServiceDefinition) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(LABEL_DEPLOYMENT.to_string(), deployment_id.to_string());
        labels.insert(LABEL_SERVICE.to_string(), resolved.instance_id.clone());
        labels.insert(LABEL_HOSTNAME.to_string(), self.hostname.clone());
        labels.insert(LABEL_DEPLOYED_AT.to_string(), Utc::now().to_rfc3339());
        labels.insert(LABEL_BACKEND_TYPE.to_string(), "docker".to_string());
        labels
    }

    /// The path registered with the mesh-VPN reverse proxy for a service
    /// (spec.md 4.6): `/<service_id>`, matching the externally visible
    /// `https://<hostname>/<service_id>` URL.
    fn route_path(instance_id: &str) -> String {
        format!("/{}", instance_id)
    }
}

#[async_trait]
impl Backend for LocalDockerBackend {
    async fn deploy(
        &self,
        _target: &str,
        resolved: &ResolvedServiceDefinition,
        deployment_id: &str,
        _namespace: Option<&str>,
    ) -> Result<Deployment> {
        let image = resolved
            .image
            .clone()
            .ok_or_else(|| ErrorKind::BackendError("resolved service has no image".into()))?;

        let (ports, remapped) = Self::remap_conflicting_ports(resolved)?;
        self.persist_port_overrides(&resolved.instance_id, &remapped);

        let mut labels = self.base_labels(deployment_id, resolved);
        if let Some(health_path) = &resolved.health_check_path {
            labels.insert(LABEL_HEALTH_PATH.to_string(), health_path.clone());
            let health_port = resolved.health_check_port.or_else(|| ports.first().map(|p| p.container_port));
            if let Some(health_port) = health_port {
                labels.insert(LABEL_HEALTH_PORT.to_string(), health_port.to_string());
            }
        }

        let env: Vec<String> = resolved.environment.iter().map(|(k, v)| format!("{}={}", k, v.value)).collect();

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for p in &ports {
            let key = format!("{}/{}", p.container_port, p.protocol);
            let host_port = p.host_port.map(|hp| hp.to_string());
            port_bindings.insert(
                key,
                Some(vec![PortBinding { host_ip: Some("0.0.0.0".to_string()), host_port }]),
            );
        }

        let binds: Vec<String> = resolved
            .volumes
            .iter()
            .map(|v| format!("{}:{}{}", v.source, v.target, if v.read_only { ":ro" } else { "" }))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(binds),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(restart_policy_name(&resolved.restart_policy)),
                maximum_retry_count: None,
            }),
            network_mode: resolved.network.clone(),
            ..Default::default()
        };

        let config = ContainerConfig {
            image: Some(image),
            env: Some(env),
            cmd: resolved.command.clone(),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = Self::container_name(deployment_id);
        self.client
            .create_container(
                Some(bollard::container::CreateContainerOptions { name: name.clone(), platform: None }),
                config,
            )
            .await
            .map_err(|e| ErrorKind::BackendError(format!("create_container failed: {}", e)))?;

        self.client
            .start_container::<String>(&name, None)
            .await
            .map_err(|e| ErrorKind::BackendError(format!("start_container failed: {}", e)))?;

        if let Some(first_port) = ports.first().and_then(|p| p.host_port) {
            if let Err(e) = self.mesh.add_path_route(&Self::route_path(&resolved.instance_id), &name, first_port).await {
                warn!("could not register mesh route for '{}': {}", resolved.instance_id, e);
            }
        }

        let mut remapped_resolved = resolved.clone();
        remapped_resolved.ports = ports.clone();

        let mut deployment = Deployment::new(
            deployment_id.to_string(),
            resolved.instance_id.clone(),
            resolved.compose_service.clone().unwrap_or_default(),
            BackendType::Docker,
            "local".to_string(),
        );
        deployment.deployed_config = Some(remapped_resolved);
        deployment.backend_metadata.insert("container_name".to_string(), name);
        deployment.port = ports.first().and_then(|p| p.host_port);
        deployment.access_url = Some(format!("https://{}{}", self.hostname, Self::route_path(&resolved.instance_id)));
        deployment.mark_running();
        Ok(deployment)
    }

    async fn stop(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let name = Self::container_name(&deployment.id);
        self.client
            .stop_container(&name, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(|e| ErrorKind::BackendError(format!("stop_container failed: {}", e)))?;
        Ok(true)
    }

    async fn remove(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let name = Self::container_name(&deployment.id);
        self.client
            .remove_container(&name, Some(RemoveContainerOptions { v: true, force: true, ..Default::default() }))
            .await
            .map_err(|e| ErrorKind::BackendError(format!("remove_container failed: {}", e)))?;
        if let Err(e) = self.mesh.remove_path_route(&Self::route_path(&deployment.instance_id)).await {
            warn!("could not withdraw mesh route for '{}': {}", deployment.instance_id, e);
        }
        Ok(true)
    }

    async fn restart(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let name = Self::container_name(&deployment.id);
        self.client
            .restart_container(&name, None)
            .await
            .map_err(|e| ErrorKind::BackendError(format!("restart_container failed: {}", e)))?;
        Ok(true)
    }

    async fn get_status(&self, _target: &str, deployment: &Deployment) -> Result<DeploymentStatus> {
        let name = Self::container_name(&deployment.id);
        match self.client.inspect_container(&name, None).await {
            Ok(details) => {
                let state = details.state.as_ref().and_then(|s| s.status.as_ref()).map(|s| s.to_string());
                let labels = details.config.as_ref().and_then(|c| c.labels.clone()).unwrap_or_default();
                let port_map = details.network_settings.as_ref().and_then(|n| n.ports.clone());
                let (status, _) = self.derive_status(state.as_deref(), &labels, port_map.as_ref(), host_port_from_map).await;
                Ok(status)
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(DeploymentStatus::NotApplicable)
            }
            Err(e) => Err(ErrorKind::BackendError(format!("inspect_container failed: {}", e)).into()),
        }
    }

    async fn get_logs(&self, _target: &str, deployment: &Deployment, tail: usize) -> Result<Vec<String>> {
        let name = Self::container_name(&deployment.id);
        let mut stream = self.client.logs(
            &name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ErrorKind::BackendError(format!("log stream error: {}", e)))?;
            lines.push(chunk.to_string());
        }
        Ok(lines)
    }

    async fn list_deployments(&self, _target: &str, service_id: Option<&str>) -> Result<Vec<Deployment>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![LABEL_DEPLOYMENT.to_string()]);
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions { all: true, filters, ..Default::default() }))
            .await
            .map_err(|e| ErrorKind::BackendError(format!("list_containers failed: {}", e)))?;

        let mut out = Vec::new();
        for c in containers {
            let labels = c.labels.clone().unwrap_or_default();
            let deployment_id = match labels.get(LABEL_DEPLOYMENT) {
                Some(id) => id.clone(),
                None => continue,
            };
            let instance_id = labels.get(LABEL_SERVICE).cloned().unwrap_or_default();
            if let Some(filter) = service_id {
                if instance_id != filter {
                    continue;
                }
            }
            let hostname = labels.get(LABEL_HOSTNAME).cloned().unwrap_or_default();
            let deployed_at = labels.get(LABEL_DEPLOYED_AT).cloned();

            // template_id isn't part of the label vocabulary (spec.md 6) and so
            // can't be reconstructed from a bare `docker ps` — left blank rather
            // than guessed.
            let mut deployment = Deployment::new(
                deployment_id,
                instance_id.clone(),
                String::new(),
                BackendType::Docker,
                "local".to_string(),
            );
            deployment.backend_metadata.insert("unode_hostname".to_string(), hostname.clone());
            if let Some(container_id) = c.id.clone() {
                deployment.backend_metadata.insert("container_id".to_string(), container_id);
            }
            if let Some(deployed_at) = deployed_at {
                deployment.backend_metadata.insert("deployed_at".to_string(), deployed_at);
            }

            let ports = c.ports.clone();
            deployment.port = ports.as_ref().and_then(|p| p.first()).and_then(|p| p.public_port);
            if !hostname.is_empty() {
                deployment.access_url = Some(format!("https://{}{}", hostname, Self::route_path(&instance_id)));
            }
            let (status, healthy) = self
                .derive_status(c.state.as_deref(), &labels, ports.as_ref(), host_port_from_summary)
                .await;
            deployment.status = status;
            deployment.healthy = healthy;
            out.push(deployment);
        }
        Ok(out)
    }
}

impl LocalDockerBackend {
    /// Maps Docker's container state plus, for a running container
    /// carrying a health-check label, an HTTP probe of it, onto a
    /// [`DeploymentStatus`] (spec.md 4.4.3 "Status derivation").
    ///
    /// `lookup_host_port` abstracts over the two shapes bollard hands back
    /// port info in (`inspect_container`'s `PortMap` vs.
    /// `list_containers`'s `Vec<Port>`), so this logic runs once for both
    /// `get_status` and `list_deployments`.
    async fn derive_status<P>(
        &self,
        state: Option<&str>,
        labels: &HashMap<String, String>,
        ports: Option<&P>,
        lookup_host_port: impl Fn(&P, u16) -> Option<u16>,
    ) -> (DeploymentStatus, Option<bool>) {
        let base = match state {
            Some("running") => DeploymentStatus::Running,
            Some("exited") => DeploymentStatus::Stopped,
            Some("created") => DeploymentStatus::Pending,
            Some("dead") => DeploymentStatus::Failed,
            Some("paused") => DeploymentStatus::Stopped,
            _ => DeploymentStatus::NotApplicable,
        };

        if base != DeploymentStatus::Running {
            return (base, None);
        }

        let health_path = match labels.get(LABEL_HEALTH_PATH) {
            Some(p) => p,
            None => return (DeploymentStatus::Running, Some(true)),
        };
        let health_port: u16 = labels.get(LABEL_HEALTH_PORT).and_then(|p| p.parse().ok()).unwrap_or(0);
        let host_port = ports.and_then(|p| lookup_host_port(p, health_port));

        match host_port {
            Some(host_port) => {
                let url = format!("http://localhost:{}{}", host_port, health_path);
                match self.http.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
                    Ok(resp) if resp.status().is_success() => (DeploymentStatus::Running, Some(true)),
                    Ok(resp) => {
                        debug!("health check for {} returned {}", url, resp.status());
                        (DeploymentStatus::Deploying, Some(false))
                    }
                    Err(e) => {
                        debug!("health check for {} failed: {}", url, e);
                        (DeploymentStatus::Deploying, Some(false))
                    }
                }
            }
            None => (DeploymentStatus::Deploying, Some(false)),
        }
    }
}

fn host_port_from_map(ports: &PortMap, container_port: u16) -> Option<u16> {
    ports
        .get(&format!("{}/tcp", container_port))?
        .as_ref()?
        .first()?
        .host_port
        .as_ref()?
        .parse()
        .ok()
}

fn host_port_from_summary(ports: &Vec<bollard::models::Port>, container_port: u16) -> Option<u16> {
    ports.iter().find(|p| p.private_port == container_port).and_then(|p| p.public_port)
}

fn restart_policy_name(policy: &str) -> bollard::models::RestartPolicyNameEnum {
    use bollard::models::RestartPolicyNameEnum::*;
    match policy {
        "always" => ALWAYS,
        "on-failure" => ON_FAILURE,
        "no" => NO,
        _ => UNLESS_STOPPED,
    }
}

/// Deploys to a worker node's local Docker daemon over the mesh network
/// (spec.md 4.4.3, remote case). The leader never dials the remote
/// daemon's socket directly; it calls the small HTTP agent every unode
/// runs, authenticated with the per-node secret issued at join time. The
/// agent is the one holding the bollard connection on the worker side.
pub struct RemoteDockerBackend {
    http: reqwest::Client,
    agent_port: u16,
}

impl RemoteDockerBackend {
    pub fn new(http: reqwest::Client) -> Self {
        RemoteDockerBackend { http, agent_port: 7780 }
    }

    /// Same as [`new`](Self::new) but against a non-default agent port —
    /// only needed to point the worker-RPC boundary at a local mock server
    /// in tests, since every real unode agent listens on 7780.
    pub fn with_agent_port(http: reqwest::Client, agent_port: u16) -> Self {
        RemoteDockerBackend { http, agent_port }
    }

    fn agent_url(&self, mesh_address: &str, path: &str) -> String {
        format!("http://{}:{}{}", mesh_address, self.agent_port, path)
    }
}

#[async_trait]
impl Backend for RemoteDockerBackend {
    async fn deploy(
        &self,
        target: &str,
        resolved: &ResolvedServiceDefinition,
        deployment_id: &str,
        _namespace: Option<&str>,
    ) -> Result<Deployment> {
        let node_secret = std::env::var(format!("USHADOW_NODE_SECRET_{}", target))
            .map_err(|_| ErrorKind::BackendError(format!("no join secret on file for node '{}'", target)))?;

        let resp = self
            .http
            .post(self.agent_url(target, &format!("/containers/{}", deployment_id)))
            .header("X-Node-Secret", node_secret)
            .json(resolved)
            .send()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("unode agent unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ErrorKind::BackendError(format!("unode agent rejected deploy: HTTP {}", resp.status())).into());
        }

        let mut deployment = Deployment::new(
            deployment_id.to_string(),
            resolved.instance_id.clone(),
            resolved.compose_service.clone().unwrap_or_default(),
            BackendType::Docker,
            target.to_string(),
        );
        deployment.deployed_config = Some(resolved.clone());
        deployment.mark_running();
        Ok(deployment)
    }

    async fn stop(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.agent_action(target, &deployment.id, "stop").await
    }

    async fn remove(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.agent_action(target, &deployment.id, "remove").await
    }

    async fn restart(&self, target: &str, deployment: &Deployment) -> Result<bool> {
        self.agent_action(target, &deployment.id, "restart").await
    }

    async fn get_status(&self, target: &str, deployment: &Deployment) -> Result<DeploymentStatus> {
        let resp = self
            .http
            .get(self.agent_url(target, &format!("/containers/{}/status", deployment.id)))
            .send()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("unode agent unreachable: {}", e)))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DeploymentStatus::NotApplicable);
        }
        resp.json::<DeploymentStatus>()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("malformed status response: {}", e)).into())
    }

    async fn get_logs(&self, target: &str, deployment: &Deployment, tail: usize) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.agent_url(target, &format!("/containers/{}/logs?tail={}", deployment.id, tail)))
            .send()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("unode agent unreachable: {}", e)))?;
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("malformed logs response: {}", e)).into())
    }

    async fn list_deployments(&self, target: &str, service_id: Option<&str>) -> Result<Vec<Deployment>> {
        let mut url = self.agent_url(target, "/containers");
        if let Some(id) = service_id {
            url.push_str(&format!("?instance_id={}", id));
        }
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("unode agent unreachable: {}", e)))?;
        resp.json::<Vec<Deployment>>()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("malformed list response: {}", e)).into())
    }
}

impl RemoteDockerBackend {
    async fn agent_action(&self, target: &str, deployment_id: &str, action: &str) -> Result<bool> {
        let resp = self
            .http
            .post(self.agent_url(target, &format!("/containers/{}/{}", deployment_id, action)))
            .send()
            .await
            .map_err(|e| ErrorKind::BackendError(format!("unode agent unreachable: {}", e)))?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_preferred_port_when_free() {
        // Bind something improbable-but-deterministic-enough to not be
        // free, then ask for a completely different, almost certainly
        // free, port.
        assert_eq!(LocalDockerBackend::pick_free_port(59219), Some(59219));
    }

    #[test]
    fn remaps_around_a_held_port() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let held = listener.local_addr().unwrap().port();

        let mut resolved = ResolvedServiceDefinition::new("my-db");
        resolved.ports.push(ushadow_definitions::resolved::PortMapping {
            container_port: 5432,
            host_port: Some(held),
            protocol: "tcp".to_string(),
        });

        let (ports, remapped) = LocalDockerBackend::remap_conflicting_ports(&resolved).unwrap();
        assert_eq!(remapped.len(), 1);
        assert_eq!(remapped[0].0, 5432);
        assert_ne!(ports[0].host_port, Some(held));
    }

    #[test]
    fn route_path_is_slash_prefixed_instance_id() {
        assert_eq!(LocalDockerBackend::route_path("my-db"), "/my-db");
    }
}
