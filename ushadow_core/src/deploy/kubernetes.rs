use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment as K8sDeployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, PersistentVolumeClaim, Pod, PodSpec, PodTemplateSpec, Secret, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount as K8sVolumeMount,
};
use k8s_openapi::api::networking::v1::IngressClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams};
use kube::{Client, ResourceExt};

use ushadow_definitions::kubernetes::InfraScan;
use ushadow_definitions::resolved::{ResolvedServiceDefinition, VolumeKind};
use ushadow_definitions::{BackendType, Deployment, DeploymentStatus, ErrorKind, Result};

use super::backend::Backend;

const MANAGER: &str = "ushadowd";
const LABEL_INSTANCE: &str = "ushadow.io/instance-id";
const LABEL_DEPLOYMENT: &str = "ushadow.io/deployment-id";

/// Builds a client from in-cluster config if present, else the local
/// kubeconfig, via kube-rs's own `Client::try_default` fallback order.
pub async fn make_client() -> Result<Client> {
    Client::try_default()
        .await
        .map_err(|e| ErrorKind::BackendError(format!("could not build kubernetes client: {}", e)).into())
}

fn deployment_name(deployment_id: &str) -> String {
    format!("ushadow-{}", deployment_id)
}

/// Compiles a [`ResolvedServiceDefinition`] into the Kubernetes objects
/// that run it (spec.md 4.4.4): one `Deployment` plus, when the service
/// exposes any ports, a matching `Service`. Volumes are classified by
/// [`VolumeKind`] at resolve time, so the compiler never has to guess
/// whether a mount is a PVC, an emptyDir, or a ConfigMap.
pub fn compile_manifests(resolved: &ResolvedServiceDefinition, deployment_id: &str, namespace: &str) -> (K8sDeployment, Option<Service>) {
    let name = deployment_name(deployment_id);
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_INSTANCE.to_string(), resolved.instance_id.clone());
    labels.insert(LABEL_DEPLOYMENT.to_string(), deployment_id.to_string());
    labels.insert("app".to_string(), name.clone());

    let env: Vec<EnvVar> = resolved
        .environment
        .iter()
        .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.value.clone()), value_from: None })
        .collect();

    let ports: Vec<ContainerPort> = resolved
        .ports
        .iter()
        .map(|p| ContainerPort { container_port: p.container_port as i32, protocol: Some(p.protocol.to_uppercase()), ..Default::default() })
        .collect();

    let volumes: Vec<Volume> = resolved
        .volumes
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let name = format!("vol-{}", i);
            match v.kind {
                VolumeKind::PersistentVolumeClaim => Volume {
                    name,
                    persistent_volume_claim: Some(k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource {
                        claim_name: v.source.clone(),
                        read_only: Some(v.read_only),
                    }),
                    ..Default::default()
                },
                VolumeKind::ConfigMap => Volume {
                    name,
                    config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                        name: v.source.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                VolumeKind::EmptyDir | VolumeKind::BindMount => {
                    Volume { name, empty_dir: Some(Default::default()), ..Default::default() }
                }
            }
        })
        .collect();

    let volume_mounts: Vec<K8sVolumeMount> = resolved
        .volumes
        .iter()
        .enumerate()
        .map(|(i, v)| K8sVolumeMount { name: format!("vol-{}", i), mount_path: v.target.clone(), read_only: Some(v.read_only), ..Default::default() })
        .collect();

    let container = Container {
        name: resolved.compose_service.clone().unwrap_or_else(|| "app".to_string()),
        image: resolved.image.clone(),
        command: resolved.command.clone(),
        env: Some(env),
        ports: Some(ports),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let deployment = K8sDeployment {
        metadata: ObjectMeta { name: Some(name.clone()), namespace: Some(namespace.to_string()), labels: Some(labels.clone()), ..Default::default() },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels.clone()), ..Default::default() }),
                spec: Some(PodSpec { containers: vec![container], volumes: Some(volumes), ..Default::default() }),
            },
            ..Default::default()
        }),
        status: None,
    };

    let service = if !resolved.ports.is_empty() {
        Some(Service {
            metadata: ObjectMeta { name: Some(name.clone()), namespace: Some(namespace.to_string()), labels: Some(labels.clone()), ..Default::default() },
            spec: Some(ServiceSpec {
                selector: Some(labels),
                ports: Some(
                    resolved
                        .ports
                        .iter()
                        .map(|p| ServicePort { port: p.container_port as i32, target_port: None, protocol: Some(p.protocol.to_uppercase()), ..Default::default() })
                        .collect(),
                ),
                ..Default::default()
            }),
            status: None,
        })
    } else {
        None
    };

    (deployment, service)
}

/// The Kubernetes deployment target (spec.md 4.4.4): applies compiled
/// manifests with server-side apply and derives status straight from the
/// live `Deployment` object, never from its own bookkeeping.
pub struct KubernetesBackend {
    client: Client,
}

impl KubernetesBackend {
    pub fn new(client: Client) -> Self {
        KubernetesBackend { client }
    }

    /// Inventories existing infrastructure in a namespace so the resolver
    /// can offer "use what's already there" instead of only "create new"
    /// (spec.md 4.4.4 infra scan).
    pub async fn scan_infra(&self, namespace: &str) -> Result<InfraScan> {
        let cm_api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let secret_api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let ingress_class_api: Api<IngressClass> = Api::all(self.client.clone());

        let lp = ListParams::default();
        let config_maps = cm_api.list(&lp).await.map_err(kube_err)?.items.into_iter().filter_map(|o| o.metadata.name).collect();
        let secrets = secret_api.list(&lp).await.map_err(kube_err)?.items.into_iter().filter_map(|o| o.metadata.name).collect();
        let persistent_volume_claims = pvc_api.list(&lp).await.map_err(kube_err)?.items.into_iter().filter_map(|o| o.metadata.name).collect();
        let ingress_classes = ingress_class_api.list(&lp).await.map_err(kube_err)?.items.into_iter().filter_map(|o| o.metadata.name).collect();

        Ok(InfraScan { scanned_at: Some(chrono::Utc::now()), config_maps, secrets, persistent_volume_claims, ingress_classes })
    }
}

fn kube_err(e: kube::Error) -> ushadow_definitions::Error {
    ErrorKind::BackendError(format!("kubernetes api error: {}", e)).into()
}

#[async_trait]
impl Backend for KubernetesBackend {
    async fn deploy(
        &self,
        target: &str,
        resolved: &ResolvedServiceDefinition,
        deployment_id: &str,
        namespace: Option<&str>,
    ) -> Result<Deployment> {
        let ns = namespace.or(resolved.namespace.as_deref()).unwrap_or("default");
        let (manifest, service) = compile_manifests(resolved, deployment_id, ns);
        let name = manifest.name_any();

        let deploy_api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), ns);
        let pp = PatchParams::apply(MANAGER);
        deploy_api.patch(&name, &pp, &Patch::Apply(&manifest)).await.map_err(kube_err)?;

        if let Some(svc) = &service {
            let svc_api: Api<Service> = Api::namespaced(self.client.clone(), ns);
            svc_api.patch(&name, &pp, &Patch::Apply(svc)).await.map_err(kube_err)?;
        }

        let mut deployment = Deployment::new(
            deployment_id.to_string(),
            resolved.instance_id.clone(),
            resolved.compose_service.clone().unwrap_or_default(),
            BackendType::Kubernetes,
            target.to_string(),
        );
        deployment.deployed_config = Some(resolved.clone());
        deployment.backend_metadata.insert("namespace".to_string(), ns.to_string());
        deployment.backend_metadata.insert("deployment_name".to_string(), name);
        deployment.status = DeploymentStatus::Deploying;
        Ok(deployment)
    }

    async fn stop(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let ns = deployment.backend_metadata.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let name = deployment_name(&deployment.id);
        let api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), &ns);
        let patch = serde_json::json!({ "spec": { "replicas": 0 } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await.map_err(kube_err)?;
        Ok(true)
    }

    async fn remove(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let ns = deployment.backend_metadata.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let name = deployment_name(&deployment.id);
        let deploy_api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), &ns);
        deploy_api.delete(&name, &DeleteParams::default()).await.map_err(kube_err)?;
        let svc_api: Api<Service> = Api::namespaced(self.client.clone(), &ns);
        let _ = svc_api.delete(&name, &DeleteParams::default()).await;
        Ok(true)
    }

    async fn restart(&self, _target: &str, deployment: &Deployment) -> Result<bool> {
        let ns = deployment.backend_metadata.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let name = deployment_name(&deployment.id);
        let api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), &ns);
        let now = chrono::Utc::now().to_rfc3339();
        let patch = serde_json::json!({
            "spec": { "template": { "metadata": { "annotations": { "ushadow.io/restarted-at": now } } } }
        });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await.map_err(kube_err)?;
        Ok(true)
    }

    async fn get_status(&self, _target: &str, deployment: &Deployment) -> Result<DeploymentStatus> {
        let ns = deployment.backend_metadata.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let name = deployment_name(&deployment.id);
        let api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), &ns);
        match api.get(&name).await {
            Ok(d) => {
                let status = d.status.unwrap_or_default();
                let ready = status.ready_replicas.unwrap_or(0);
                let desired = status.replicas.unwrap_or(0);
                Ok(if desired == 0 {
                    DeploymentStatus::Stopped
                } else if ready >= desired {
                    DeploymentStatus::Running
                } else {
                    DeploymentStatus::Deploying
                })
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(DeploymentStatus::NotApplicable),
            Err(e) => Err(kube_err(e)),
        }
    }

    async fn get_logs(&self, _target: &str, deployment: &Deployment, tail: usize) -> Result<Vec<String>> {
        let ns = deployment.backend_metadata.get("namespace").cloned().unwrap_or_else(|| "default".to_string());
        let label = format!("{}={}", LABEL_DEPLOYMENT, deployment.id);
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &ns);
        let pods = pod_api.list(&ListParams::default().labels(&label)).await.map_err(kube_err)?;
        let pod = pods.items.first().ok_or_else(|| ErrorKind::BackendError("no pods found for deployment".into()))?;
        let pod_name = pod.name_any();

        let lp = LogParams { tail_lines: Some(tail as i64), ..Default::default() };
        let raw = pod_api.logs(&pod_name, &lp).await.map_err(kube_err)?;
        Ok(raw.lines().map(|l| l.to_string()).collect())
    }

    async fn list_deployments(&self, target: &str, service_id: Option<&str>) -> Result<Vec<Deployment>> {
        let api: Api<K8sDeployment> = Api::all(self.client.clone());
        let label = match service_id {
            Some(id) => format!("{}={}", LABEL_INSTANCE, id),
            None => LABEL_INSTANCE.to_string(),
        };
        let items = api.list(&ListParams::default().labels(&label)).await.map_err(kube_err)?;

        let mut out = Vec::new();
        for d in items.items {
            let labels = d.labels();
            let instance_id = labels.get(LABEL_INSTANCE).cloned().unwrap_or_default();
            let deployment_id = labels.get(LABEL_DEPLOYMENT).cloned().unwrap_or_default();
            let status = d.status.clone().unwrap_or_default();
            let ready = status.ready_replicas.unwrap_or(0);
            let desired = status.replicas.unwrap_or(0);

            let mut deployment = Deployment::new(deployment_id, instance_id, String::new(), BackendType::Kubernetes, target.to_string());
            deployment.status = if desired == 0 {
                DeploymentStatus::Stopped
            } else if ready >= desired {
                DeploymentStatus::Running
            } else {
                DeploymentStatus::Deploying
            };
            deployment.backend_metadata.insert("namespace".to_string(), d.namespace().unwrap_or_default());
            out.push(deployment);
        }
        Ok(out)
    }
}
