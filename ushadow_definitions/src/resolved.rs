use std::collections::BTreeMap;

/// Where a resolved environment entry's value ultimately came from,
/// highest to lowest precedence per spec.md 4.3's resolution order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    /// An explicit value set directly on the instance's own config.
    Override,
    /// Fetched from the settings store via a template's `settings_path`.
    Settings,
    /// The template's own declared default.
    Default,
    /// Supplied by a wired-in provider instance's capability output.
    Provider,
    /// Inherited from the leader process's own environment.
    OsEnviron,
    /// Derived from node/cluster infrastructure inventory (e.g. an
    /// existing ConfigMap or Secret discovered by the Kubernetes scan).
    Infrastructure,
}

/// One resolved environment entry, carrying provenance for diagnostics and
/// for the `ushadowctl` resolve/explain surface (spec.md 6).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolvedEnv {
    pub value: String,
    pub source: EnvSource,
    /// The settings-store path or capability name this value was derived
    /// from, when applicable (absent for plain overrides/OS environ).
    pub source_path: Option<String>,
}

impl ResolvedEnv {
    pub fn new(value: impl Into<String>, source: EnvSource) -> Self {
        ResolvedEnv { value: value.into(), source, source_path: None }
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// The portable currency handed from the capability resolver / deployment
/// manager to any [`Backend`](crate) implementation (spec.md 4.4.1):
/// everything a backend needs to run a service, with no further knowledge
/// of templates, wiring, or the settings store.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolvedServiceDefinition {
    pub instance_id: String,
    pub image: Option<String>,
    pub compose_file: Option<std::path::PathBuf>,
    pub compose_service: Option<String>,

    pub ports: Vec<PortMapping>,
    pub environment: BTreeMap<String, ResolvedEnv>,
    pub volumes: Vec<VolumeMount>,
    pub command: Option<Vec<String>>,
    pub restart_policy: String,

    /// Docker backend only: the compose network / bridge to join.
    pub network: Option<String>,
    /// Kubernetes backend only: target namespace.
    pub namespace: Option<String>,

    /// HTTP path a backend probes to decide readiness (spec.md 4.4.3/4.4.4),
    /// declared by the template via a `ushadow.health_check_path` compose
    /// label. Absent means "assume healthy the moment the process starts".
    pub health_check_path: Option<String>,
    /// Container port the health check is served on, defaulting to the
    /// service's first exposed port when a path is set but no port is.
    pub health_check_port: Option<u16>,

    /// Capabilities this service requires to be wired before it can run.
    pub requires: Vec<String>,
}

impl ResolvedServiceDefinition {
    pub fn new(instance_id: impl Into<String>) -> Self {
        ResolvedServiceDefinition {
            instance_id: instance_id.into(),
            image: None,
            compose_file: None,
            compose_service: None,
            ports: Vec::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            command: None,
            restart_policy: "unless-stopped".to_string(),
            network: None,
            namespace: None,
            health_check_path: None,
            health_check_port: None,
            requires: Vec::new(),
        }
    }

    pub fn env_as_plain_map(&self) -> BTreeMap<String, String> {
        self.environment.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    /// Host/external port, assigned at deploy time; may differ from the
    /// template's preferred port if remapped due to a conflict (spec.md
    /// 4.4.3).
    pub host_port: Option<u16>,
    pub protocol: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VolumeMount {
    /// Classified at compile time: PVC, emptyDir, or ConfigMap-backed
    /// (spec.md 4.4.4 volume classification).
    pub kind: VolumeKind,
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    PersistentVolumeClaim,
    EmptyDir,
    ConfigMap,
    BindMount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_as_plain_map_drops_provenance() {
        let mut def = ResolvedServiceDefinition::new("my-db");
        def.environment.insert(
            "POSTGRES_PASSWORD".to_string(),
            ResolvedEnv::new("secret123", EnvSource::Settings).with_source_path("services.postgres.password"),
        );
        let plain = def.env_as_plain_map();
        assert_eq!(plain.get("POSTGRES_PASSWORD").unwrap(), "secret123");
    }
}
