use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_yaml::Value as Yaml;
use walkdir::WalkDir;

use ushadow_definitions::template::EnvMap;
use ushadow_definitions::{ConfigField, ErrorKind, Mode, Result, Source, Template};

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_dash = false;
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn file_stem(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("template").to_string()
}

/// One manifest under `providers/`, matching spec.md 4.1: `capability`,
/// `mode` and an `env_maps` list.
#[derive(Deserialize)]
struct ProviderManifest {
    capability: String,
    display_name: Option<String>,
    description: Option<String>,
    mode: Option<Mode>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    optional: Vec<String>,
    #[serde(default)]
    config_schema: Vec<ConfigField>,
    #[serde(default)]
    env_maps: Vec<EnvMap>,
    icon: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

fn read_yaml_file(path: &Path) -> Result<Yaml> {
    let mut f = File::open(path)?;
    let mut data = String::new();
    f.read_to_string(&mut data)?;
    Ok(serde_yaml::from_str(&data)?)
}

fn parse_provider_file(path: &Path) -> Result<Template> {
    let mut f = File::open(path)?;
    let mut data = String::new();
    f.read_to_string(&mut data)?;
    let manifest: ProviderManifest = serde_yaml::from_str(&data)?;

    let id = slugify(&file_stem(path));
    Ok(Template {
        id,
        source: Source::Provider { provider_file: path.to_path_buf() },
        display_name: manifest.display_name.unwrap_or_else(|| manifest.capability.clone()),
        description: manifest.description.unwrap_or_default(),
        requires: manifest.requires,
        optional: manifest.optional,
        provides: Some(manifest.capability),
        config_schema: manifest.config_schema,
        env_maps: manifest.env_maps,
        env_mapping: BTreeMap::new(),
        mode: manifest.mode,
        ui: ushadow_definitions::template::TemplateUiMeta { icon: manifest.icon, tags: manifest.tags },
        configured: false,
        available: false,
        installed: true,
    })
}

/// One compose service's relevant subset, read loosely off the raw YAML
/// tree rather than a strict struct — compose files vary in which keys
/// they set, and we only need a handful (image, ports, environment,
/// volumes, and the `ushadow.*` label hints).
fn parse_compose_service(
    compose_path: &Path,
    service_name: &str,
    service: &Yaml,
) -> Template {
    let id = slugify(&format!("{}-{}", file_stem(compose_path), service_name));

    let labels = service.get("labels");
    let label_str = |key: &str| -> Option<String> {
        match labels {
            Some(Yaml::Mapping(m)) => m
                .get(&Yaml::String(key.to_string()))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            Some(Yaml::Sequence(seq)) => seq.iter().find_map(|entry| {
                let entry = entry.as_str()?;
                let prefix = format!("{}=", key);
                entry.strip_prefix(&prefix).map(|v| v.to_string())
            }),
            _ => None,
        }
    };

    let requires: Vec<String> = label_str(COMPOSE_LABEL_REQUIRES)
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let optional: Vec<String> = label_str(COMPOSE_LABEL_OPTIONAL)
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let provides = label_str(COMPOSE_LABEL_PROVIDES);
    let display_name = label_str(COMPOSE_LABEL_DISPLAY_NAME).unwrap_or_else(|| service_name.to_string());
    let description = label_str(COMPOSE_LABEL_DESCRIPTION).unwrap_or_default();

    Template {
        id,
        source: Source::Compose {
            compose_file: compose_path.to_path_buf(),
            service: service_name.to_string(),
        },
        display_name,
        description,
        requires,
        optional,
        provides,
        config_schema: Vec::new(),
        env_maps: Vec::new(),
        env_mapping: BTreeMap::new(),
        mode: None,
        ui: Default::default(),
        configured: false,
        available: false,
        installed: true,
    }
}

fn discover_compose(dir: &Path) -> Result<Vec<Template>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let ext_ok = matches!(path.extension().and_then(|e| e.to_str()), Some("yml") | Some("yaml"));
        if !entry.file_type().is_file() || !ext_ok {
            continue;
        }
        let doc = read_yaml_file(path)?;
        let services = match doc.get("services") {
            Some(Yaml::Mapping(m)) => m,
            _ => continue,
        };
        for (name, svc) in services {
            let name = match name.as_str() {
                Some(n) => n,
                None => continue,
            };
            out.push(parse_compose_service(path, name, svc));
        }
    }
    Ok(out)
}

fn discover_providers(dir: &Path) -> Result<Vec<Template>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let ext_ok = matches!(path.extension().and_then(|e| e.to_str()), Some("yml") | Some("yaml"));
        if !entry.file_type().is_file() || !ext_ok {
            continue;
        }
        out.push(parse_provider_file(path)?);
    }
    Ok(out)
}

/// Discovers and caches templates from `compose/` and `providers/`
/// (spec.md 4.1). Ids are derived deterministically from file name plus
/// service name or capability, so they survive a `reload()` even if the
/// scan order of the filesystem changes.
pub struct TemplateRegistry {
    compose_dir: PathBuf,
    providers_dir: PathBuf,
    templates: BTreeMap<String, Template>,
}

pub(crate) const COMPOSE_LABEL_REQUIRES: &str = "ushadow.requires";
pub(crate) const COMPOSE_LABEL_OPTIONAL: &str = "ushadow.optional";
pub(crate) const COMPOSE_LABEL_PROVIDES: &str = "ushadow.provides";
pub(crate) const COMPOSE_LABEL_DISPLAY_NAME: &str = "ushadow.display_name";
pub(crate) const COMPOSE_LABEL_DESCRIPTION: &str = "ushadow.description";

impl TemplateRegistry {
    pub fn new(compose_dir: impl Into<PathBuf>, providers_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut reg = TemplateRegistry {
            compose_dir: compose_dir.into(),
            providers_dir: providers_dir.into(),
            templates: BTreeMap::new(),
        };
        reg.reload()?;
        Ok(reg)
    }

    pub fn reload(&mut self) -> Result<()> {
        let mut fresh = BTreeMap::new();
        for t in discover_compose(&self.compose_dir)? {
            fresh.insert(t.id.clone(), t);
        }
        for t in discover_providers(&self.providers_dir)? {
            fresh.insert(t.id.clone(), t);
        }
        self.templates = fresh;
        Ok(())
    }

    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Template> {
        self.templates.get(id).ok_or_else(|| ErrorKind::UnknownTemplate(id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn discovers_compose_services_with_label_hints() {
        let tmp = std::env::temp_dir().join(format!("ushadow-templates-test-{}", std::process::id()));
        let compose_dir = tmp.join("compose");
        let providers_dir = tmp.join("providers");
        std::fs::create_dir_all(&compose_dir).unwrap();
        std::fs::create_dir_all(&providers_dir).unwrap();

        write_file(
            &compose_dir,
            "chronicle.yml",
            r#"
version: "3.8"
services:
  chronicle:
    image: ghcr.io/example/chronicle:latest
    labels:
      ushadow.requires: "llm,memory"
      ushadow.display_name: "Chronicle"
"#,
        );

        let reg = TemplateRegistry::new(&compose_dir, &providers_dir).unwrap();
        let tpl = reg.get("chronicle-chronicle").expect("template discovered");
        assert_eq!(tpl.display_name, "Chronicle");
        assert_eq!(tpl.requires, vec!["llm".to_string(), "memory".to_string()]);
        assert!(tpl.is_compose());

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn discovers_provider_manifests() {
        let tmp = std::env::temp_dir().join(format!("ushadow-templates-test2-{}", std::process::id()));
        let compose_dir = tmp.join("compose");
        let providers_dir = tmp.join("providers");
        std::fs::create_dir_all(&compose_dir).unwrap();
        std::fs::create_dir_all(&providers_dir).unwrap();

        write_file(
            &providers_dir,
            "openai.yaml",
            r#"
capability: llm
mode: cloud
env_maps:
  - logical_key: api_key
    env_var: OPENAI_API_KEY
    settings_path: api_keys.openai
    required: true
"#,
        );

        let reg = TemplateRegistry::new(&compose_dir, &providers_dir).unwrap();
        let tpl = reg.get("openai").expect("provider discovered");
        assert_eq!(tpl.provides, Some("llm".to_string()));
        assert!(tpl.is_provider());
        assert_eq!(tpl.env_maps.len(), 1);

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn missing_directories_yield_empty_registry() {
        let reg = TemplateRegistry::new("/nonexistent/compose", "/nonexistent/providers").unwrap();
        assert!(reg.list().is_empty());
    }
}
