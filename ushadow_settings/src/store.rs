use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use serde_yaml::Value as Yaml;

use super::value::Scalar;
use super::{ErrorKind, Result};

/// A typed facade over a single YAML document, addressed by dotted paths.
///
/// Replaces the "deep dynamic `get(path, default)`" pattern of the original
/// tool with explicit typed getters, per DESIGN NOTES.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    root: Yaml,
    path: Option<PathBuf>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        SettingsStore {
            root: Yaml::Mapping(Default::default()),
            path: None,
        }
    }
}

impl SettingsStore {
    /// Load `config/settings.yaml` (or an arbitrary path) if present;
    /// an absent file is not an error, it starts out empty.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(SettingsStore {
                root: Yaml::Mapping(Default::default()),
                path: Some(path.to_path_buf()),
            });
        }
        let mut f = File::open(path)?;
        let mut data = String::new();
        f.read_to_string(&mut data)?;
        let root = if data.trim().is_empty() {
            Yaml::Mapping(Default::default())
        } else {
            serde_yaml::from_str(&data)?
        };
        Ok(SettingsStore {
            root,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ErrorKind::PathNotFound("<in-memory settings store>".into()))?;
        let encoded = serde_yaml::to_string(&self.root)?;
        // write to a sibling temp file then rename, so a crash mid-write
        // never leaves settings.yaml truncated.
        let tmp = path.with_extension("yaml.tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(encoded.as_bytes())?;
            f.sync_data()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn navigate<'a>(root: &'a Yaml, path: &str) -> Option<&'a Yaml> {
        let mut cur = root;
        for part in path.split('.') {
            cur = cur.as_mapping()?.get(&Yaml::String(part.to_string()))?;
        }
        Some(cur)
    }

    fn navigate_mut<'a>(root: &'a mut Yaml, path: &str) -> &'a mut Yaml {
        let mut cur = root;
        for part in path.split('.') {
            if !cur.is_mapping() {
                *cur = Yaml::Mapping(Default::default());
            }
            let map = cur.as_mapping_mut().unwrap();
            cur = map
                .entry(Yaml::String(part.to_string()))
                .or_insert(Yaml::Null);
        }
        cur
    }

    pub fn get_scalar(&self, path: &str) -> Option<Scalar> {
        let v = Self::navigate(&self.root, path)?;
        yaml_to_scalar(v)
    }

    pub fn get_string(&self, path: &str) -> Result<String> {
        self.get_scalar(path)
            .map(Scalar::into_string)
            .ok_or_else(|| ErrorKind::PathNotFound(path.to_string()).into())
    }

    pub fn get_string_opt(&self, path: &str) -> Option<String> {
        self.get_scalar(path).map(Scalar::into_string)
    }

    pub fn get_int(&self, path: &str) -> Result<i64> {
        match self.get_scalar(path) {
            Some(Scalar::Int(i)) => Ok(i),
            Some(_) => Err(ErrorKind::TypeMismatch(path.to_string(), "integer").into()),
            None => Err(ErrorKind::PathNotFound(path.to_string()).into()),
        }
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        match self.get_scalar(path) {
            Some(Scalar::Bool(b)) => Ok(b),
            Some(_) => Err(ErrorKind::TypeMismatch(path.to_string(), "boolean").into()),
            None => Err(ErrorKind::PathNotFound(path.to_string()).into()),
        }
    }

    /// A read-only view of the subtree rooted at `path`, e.g. for handing a
    /// UI the whole `selected_providers` map.
    pub fn select(&self, path: &str) -> SettingsStore {
        let sub = Self::navigate(&self.root, path).cloned().unwrap_or(Yaml::Mapping(Default::default()));
        SettingsStore { root: sub, path: None }
    }

    pub fn set_string(&mut self, path: &str, value: &str) {
        let slot = Self::navigate_mut(&mut self.root, path);
        *slot = Yaml::String(value.to_string());
    }

    pub fn set_int(&mut self, path: &str, value: i64) {
        let slot = Self::navigate_mut(&mut self.root, path);
        *slot = Yaml::Number(value.into());
    }

    pub fn has_path(&self, path: &str) -> bool {
        Self::navigate(&self.root, path).is_some()
    }
}

fn yaml_to_scalar(v: &Yaml) -> Option<Scalar> {
    match v {
        Yaml::String(s) => Some(Scalar::Str(s.clone())),
        Yaml::Bool(b) => Some(Scalar::Bool(*b)),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Int(i))
            } else {
                n.as_f64().map(Scalar::Float)
            }
        }
        Yaml::Null => Some(Scalar::Null),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut s = SettingsStore::default();
        s.set_string("api_keys.openai", "sk-xyz");
        assert_eq!(s.get_string("api_keys.openai").unwrap(), "sk-xyz");
    }

    #[test]
    fn missing_path_is_an_error() {
        let s = SettingsStore::default();
        assert!(s.get_string("nope.nope").is_err());
    }

    #[test]
    fn select_returns_subtree() {
        let mut s = SettingsStore::default();
        s.set_string("selected_providers.llm", "openai-prod");
        let sub = s.select("selected_providers");
        assert_eq!(sub.get_string("llm").unwrap(), "openai-prod");
    }
}
