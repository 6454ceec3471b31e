use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;

use ushadow_definitions::resolved::{PortMapping, ResolvedEnv, ResolvedServiceDefinition, VolumeKind, VolumeMount};
use ushadow_definitions::{ErrorKind, Result};

/// Checks the compose tool is on `PATH`. We never reimplement compose's
/// variable substitution ourselves; we always shell out and let the real
/// tool resolve `${...}` references, anchors, and includes (spec.md 4.4.1).
pub fn cexists() -> Result<()> {
    if which::which("docker").is_err() {
        return Err(ErrorKind::BackendError("docker executable not found on PATH".into()).into());
    }
    Ok(())
}

/// `docker compose -f <file> config`: renders the fully-substituted,
/// single-document YAML for one compose file with the given environment
/// overlaid on the subprocess's environment.
async fn compose_config(compose_file: &Path, env: &BTreeMap<String, String>) -> Result<String> {
    cexists()?;
    let args = vec![
        "compose".to_string(),
        "-f".to_string(),
        compose_file.display().to_string(),
        "config".to_string(),
    ];
    debug!("docker {}", args.join(" "));
    let out = Command::new("docker").args(&args).envs(env).output().await?;
    if !out.status.success() {
        let err = String::from_utf8_lossy(&out.stderr).into_owned();
        return Err(ErrorKind::BackendError(format!("compose config failed: {}", err)).into());
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Renders a compose service into a backend-agnostic
/// [`ResolvedServiceDefinition`] by invoking the real compose tool and
/// reading back its fully-substituted output (spec.md 4.4.1).
pub async fn resolve_service_definition(
    instance_id: &str,
    compose_file: &Path,
    service: &str,
    env: BTreeMap<String, ResolvedEnv>,
) -> Result<ResolvedServiceDefinition> {
    let plain_env: BTreeMap<String, String> = env.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect();
    let rendered = compose_config(compose_file, &plain_env).await?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&rendered)
        .map_err(|e| ErrorKind::BackendError(format!("invalid compose config output: {}", e)))?;

    let svc = doc
        .get("services")
        .and_then(|s| s.get(service))
        .ok_or_else(|| ErrorKind::BackendError(format!("service '{}' missing from rendered compose config", service)))?;

    let image = svc
        .get("image")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ErrorKind::BackendError(format!("service '{}' has no image", service)))?
        .to_string();

    let command = svc.get("command").and_then(|v| v.as_sequence()).map(|seq| {
        seq.iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
    });

    let ports = svc
        .get("ports")
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(parse_port_mapping).collect())
        .unwrap_or_default();

    let volumes = svc
        .get("volumes")
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(parse_volume_mount).collect())
        .unwrap_or_default();

    let network = svc
        .get("networks")
        .and_then(|v| v.as_sequence())
        .and_then(|seq| seq.first())
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let labels = parse_labels(svc.get("labels"));
    let health_check_path = labels.get("ushadow.health_check_path").cloned();
    let health_check_port = labels.get("ushadow.health_check_port").and_then(|p| p.parse().ok());

    let mut resolved = ResolvedServiceDefinition::new(instance_id.to_string());
    resolved.image = Some(image);
    resolved.compose_file = Some(compose_file.to_path_buf());
    resolved.compose_service = Some(service.to_string());
    resolved.ports = ports;
    resolved.volumes = volumes;
    resolved.command = command;
    resolved.health_check_path = health_check_path;
    resolved.health_check_port = health_check_port;
    if let Some(restart) = svc.get("restart").and_then(|v| v.as_str()) {
        resolved.restart_policy = restart.to_string();
    }
    resolved.network = network;
    resolved.environment = env;
    Ok(resolved)
}

fn parse_port_mapping(v: &serde_yaml::Value) -> Option<PortMapping> {
    let s = v.as_str()?;
    let (host_part, container_part) = s.split_once(':')?;
    let (container_port, protocol) = match container_part.split_once('/') {
        Some((p, proto)) => (p, proto.to_string()),
        None => (container_part, "tcp".to_string()),
    };
    Some(PortMapping {
        container_port: container_port.parse().ok()?,
        host_port: host_part.parse().ok(),
        protocol,
    })
}

/// Compose accepts `labels` as either a mapping (`key: value`) or a list of
/// `"key=value"` strings; normalize both into a flat map.
fn parse_labels(v: Option<&serde_yaml::Value>) -> BTreeMap<String, String> {
    match v {
        Some(serde_yaml::Value::Mapping(map)) => map
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect(),
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn parse_volume_mount(v: &serde_yaml::Value) -> Option<VolumeMount> {
    let s = v.as_str()?;
    let mut parts = s.splitn(3, ':');
    let source = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let read_only = parts.next().map(|m| m.contains("ro")).unwrap_or(false);
    let kind = if source.starts_with('/') || source.starts_with('.') {
        VolumeKind::BindMount
    } else {
        VolumeKind::PersistentVolumeClaim
    };
    Some(VolumeMount { kind, source, target, read_only })
}
