use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use ushadow_definitions::wiring::DefaultsMap;
use ushadow_definitions::{ErrorKind, Result, Wiring};
use ushadow_settings::Value;

/// The persisted shape of `wiring.yaml`: every wiring row plus the
/// capability→instance defaults map (spec.md 3 "Defaults map").
#[derive(Serialize, Deserialize, Default)]
struct WiringDocument {
    schema_version: Option<semver::Version>,
    #[serde(default)]
    wirings: Vec<Wiring>,
    #[serde(default)]
    defaults: DefaultsMap,
}

pub struct WiringStore {
    path: PathBuf,
    wirings: Vec<Wiring>,
    defaults: DefaultsMap,
}

impl WiringStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let mut f = File::open(&path)?;
            let mut data = String::new();
            f.read_to_string(&mut data)?;
            if data.trim().is_empty() {
                WiringDocument::default()
            } else {
                let doc: WiringDocument = serde_yaml::from_str(&data)?;
                crate::util::verify_schema_version("wiring.yaml", &doc.schema_version)?;
                doc
            }
        } else {
            WiringDocument::default()
        };
        Ok(WiringStore { path, wirings: doc.wirings, defaults: doc.defaults })
    }

    fn save(&self) -> Result<()> {
        let doc = WiringDocument {
            schema_version: Some(semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap()),
            wirings: self.wirings.clone(),
            defaults: self.defaults.clone(),
        };
        let yaml = serde_yaml::to_string(&doc)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(yaml.as_bytes())?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn list(&self) -> &[Wiring] {
        &self.wirings
    }

    pub fn list_for(&self, target_id: &str) -> Vec<&Wiring> {
        self.wirings.iter().filter(|w| w.target_instance_id == target_id).collect()
    }

    pub fn get_provider(&self, consumer_id: &str, capability: &str) -> Option<&Wiring> {
        self.wirings
            .iter()
            .find(|w| w.target_instance_id == consumer_id && w.target_capability == capability)
    }

    /// Upserts on `(target_instance_id, target_capability)` per spec.md 4.2.
    pub fn create(&mut self, wiring: Wiring) -> Result<Wiring> {
        let key = wiring.target_key();
        if let Some(existing) = self.wirings.iter_mut().find(|w| w.target_key() == key) {
            *existing = wiring.clone();
        } else {
            self.wirings.push(wiring.clone());
        }
        self.save()?;
        Ok(wiring)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.wirings.len();
        self.wirings.retain(|w| w.id != id);
        if self.wirings.len() == before {
            return Err(ErrorKind::UnknownInstance(id.to_string()).into());
        }
        self.save()
    }

    /// Cascade-removes every wiring referencing `instance_id` as source or
    /// target, and any default pointing at it (spec.md 4.2 invariant).
    pub fn remove_instance_references(&mut self, instance_id: &str) -> Result<()> {
        self.wirings
            .retain(|w| w.source_instance_id != instance_id && w.target_instance_id != instance_id);
        self.defaults.retain(|_, v| v.as_raw() != instance_id);
        self.save()
    }

    pub fn get_defaults(&self) -> &DefaultsMap {
        &self.defaults
    }

    pub fn set_default(&mut self, capability: &str, source_id: &str) -> Result<()> {
        self.defaults.insert(capability.to_string(), Value::literal(source_id));
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ushadow-wiring-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn create_upserts_on_target_key() {
        let path = test_path("upsert");
        let mut store = WiringStore::load(&path).unwrap();
        store
            .create(Wiring::new("w1".into(), "redis-1".into(), "cache".into(), "app".into(), "cache".into()))
            .unwrap();
        store
            .create(Wiring::new("w2".into(), "redis-2".into(), "cache".into(), "app".into(), "cache".into()))
            .unwrap();
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.list()[0].source_instance_id, "redis-2");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn remove_instance_references_cascades() {
        let path = test_path("cascade");
        let mut store = WiringStore::load(&path).unwrap();
        store
            .create(Wiring::new("w1".into(), "redis-1".into(), "cache".into(), "app".into(), "cache".into()))
            .unwrap();
        store.set_default("cache", "redis-1").unwrap();

        store.remove_instance_references("redis-1").unwrap();
        assert!(store.list().is_empty());
        assert!(store.get_defaults().is_empty());
        std::fs::remove_file(&path).ok();
    }
}
