use ushadow_definitions::resolved::ResolvedServiceDefinition;

/// One field that differs between a live deployment's resolved config and
/// what the instance would resolve to right now.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub field: String,
    pub deployed: String,
    pub current: String,
}

/// Compares a deployed [`ResolvedServiceDefinition`] against a freshly
/// resolved one for the same instance. Read-only and on-demand: spec.md
/// explicitly has no reconciliation loop, so this never acts on what it
/// finds — it is exposed only as `DeploymentManager::diff`.
pub fn diff_resolved(deployed: &ResolvedServiceDefinition, current: &ResolvedServiceDefinition) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    if deployed.image != current.image {
        entries.push(DiffEntry { field: "image".into(), deployed: fmt_opt(&deployed.image), current: fmt_opt(&current.image) });
    }
    if deployed.command != current.command {
        entries.push(DiffEntry {
            field: "command".into(),
            deployed: format!("{:?}", deployed.command),
            current: format!("{:?}", current.command),
        });
    }

    let deployed_env = deployed.env_as_plain_map();
    let current_env = current.env_as_plain_map();
    let mut keys: Vec<&String> = deployed_env.keys().chain(current_env.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let dv = deployed_env.get(key).cloned().unwrap_or_default();
        let cv = current_env.get(key).cloned().unwrap_or_default();
        if dv != cv {
            entries.push(DiffEntry { field: format!("env.{}", key), deployed: dv, current: cv });
        }
    }

    if deployed.ports != current.ports {
        entries.push(DiffEntry {
            field: "ports".into(),
            deployed: format!("{:?}", deployed.ports),
            current: format!("{:?}", current.ports),
        });
    }

    entries
}

fn fmt_opt(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "<none>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ushadow_definitions::resolved::{EnvSource, ResolvedEnv};

    fn base(instance_id: &str) -> ResolvedServiceDefinition {
        ResolvedServiceDefinition::new(instance_id.to_string())
    }

    #[test]
    fn identical_configs_produce_no_diff() {
        let a = base("chronicle");
        let b = base("chronicle");
        assert!(diff_resolved(&a, &b).is_empty());
    }

    #[test]
    fn image_change_is_reported() {
        let mut a = base("chronicle");
        a.image = Some("chronicle:1.0".into());
        let mut b = base("chronicle");
        b.image = Some("chronicle:1.1".into());
        let diffs = diff_resolved(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "image");
    }

    #[test]
    fn env_value_change_is_reported_by_key() {
        let mut a = base("chronicle");
        a.environment.insert("API_KEY".into(), ResolvedEnv::new("old", EnvSource::Override));
        let mut b = base("chronicle");
        b.environment.insert("API_KEY".into(), ResolvedEnv::new("new", EnvSource::Override));
        let diffs = diff_resolved(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "env.API_KEY");
    }
}
