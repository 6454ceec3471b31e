use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where a template was discovered from. Templates are read-only and are
/// rediscovered on startup and on `reload()` (spec.md 4.1); ids must stay
/// stable across rediscovery since persisted instances reference them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
    Compose { compose_file: PathBuf, service: String },
    Provider { provider_file: PathBuf },
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Compose { .. } => "compose",
            Source::Provider { .. } => "provider",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Secret,
    Integer,
    Boolean,
    Url,
    Enum,
    Number,
}

/// One entry in a template's config schema.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ConfigField {
    pub key: String,
    pub field_type: Option<FieldType>,
    pub label: String,
    pub help: Option<String>,
    pub default: Option<String>,
    /// Settings-store path this field falls back to when no override exists.
    pub settings_path: Option<String>,
    pub validator: Option<String>,
    pub enum_options: Vec<String>,
    pub optional: bool,
    /// When set and `settings_path` resolves to nothing, a fresh secret is
    /// generated and persisted to the settings store on first use
    /// (spec.md 4.3 `generate_if_missing`).
    pub generate_if_missing: Option<ushadow_settings::Generator>,
}

/// One entry in a provider template's `env_maps` list (spec.md 4.1/4.3):
/// binds a canonical logical key to an exported env var name, a settings
/// path to fall back to, an optional default, and whether it's required.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnvMap {
    pub logical_key: String,
    pub env_var: Option<String>,
    pub settings_path: Option<String>,
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl EnvMap {
    /// The exported variable name: explicit `env_var`, else uppercase of the logical key.
    pub fn env_var_name(&self) -> String {
        self.env_var
            .clone()
            .unwrap_or_else(|| self.logical_key.to_uppercase())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Cloud,
    Local,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct TemplateUiMeta {
    pub icon: Option<String>,
    pub tags: Vec<String>,
}

/// A discovered, read-only description of something instantiable.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Template {
    pub id: String,
    pub source: Source,
    pub display_name: String,
    pub description: String,

    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    /// At most one capability provided by this template.
    pub provides: Option<String>,

    #[serde(default)]
    pub config_schema: Vec<ConfigField>,

    /// Provider-only: how this template's capability resolves to env vars.
    #[serde(default)]
    pub env_maps: Vec<EnvMap>,

    /// Consumer-only: renames a provider's exported var to what this
    /// service's compose definition actually expects.
    #[serde(default)]
    pub env_mapping: BTreeMap<String, String>,

    pub mode: Option<Mode>,

    #[serde(default)]
    pub ui: TemplateUiMeta,

    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub installed: bool,
}

impl Template {
    pub fn is_compose(&self) -> bool {
        matches!(self.source, Source::Compose { .. })
    }

    pub fn is_provider(&self) -> bool {
        matches!(self.source, Source::Provider { .. })
    }

    pub fn env_map_for(&self, logical_key: &str) -> Option<&EnvMap> {
        self.env_maps.iter().find(|e| e.logical_key == logical_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_name_defaults_to_uppercase_key() {
        let m = EnvMap {
            logical_key: "api_key".into(),
            env_var: None,
            settings_path: None,
            default: None,
            required: true,
        };
        assert_eq!(m.env_var_name(), "API_KEY");
    }

    #[test]
    fn env_var_name_honors_explicit_override() {
        let m = EnvMap {
            logical_key: "api_key".into(),
            env_var: Some("OPENAI_API_KEY".into()),
            settings_path: None,
            default: None,
            required: true,
        };
        assert_eq!(m.env_var_name(), "OPENAI_API_KEY");
    }
}
