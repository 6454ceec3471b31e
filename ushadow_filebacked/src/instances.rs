use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ushadow_definitions::ids::validate_slug;
use ushadow_definitions::{Error, ErrorKind, Instance, InstanceStatus, Result};

/// The persisted shape of `instances.yaml`: a flat map of id to instance,
/// holding the unresolved form (interpolations intact) per spec.md 4.2.
#[derive(Serialize, Deserialize, Default)]
struct InstancesDocument {
    schema_version: Option<semver::Version>,
    #[serde(flatten)]
    instances: BTreeMap<String, Instance>,
}

/// A patch applied by `update(id, patch)`; every field is optional so the
/// caller only supplies what's changing.
#[derive(Default)]
pub struct InstancePatch {
    pub display_name: Option<String>,
    pub config: Option<BTreeMap<String, ushadow_settings::Value>>,
    pub status: Option<InstanceStatus>,
    pub last_error: Option<Option<String>>,
}

/// CRUD + persistence for instances. Holds both the unresolved (persisted)
/// form, kept here, and exposes it directly — resolving to a runtime view
/// with interpolations expanded is the capability resolver's job, not the
/// store's (spec invariant i: editing never freezes an interpolation).
pub struct InstanceStore {
    path: PathBuf,
    instances: BTreeMap<String, Instance>,
}

impl InstanceStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let instances = if path.exists() {
            let mut f = File::open(&path)?;
            let mut data = String::new();
            f.read_to_string(&mut data)?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                let doc: InstancesDocument = serde_yaml::from_str(&data)?;
                crate::util::verify_schema_version("instances.yaml", &doc.schema_version)?;
                doc.instances
            }
        } else {
            BTreeMap::new()
        };
        Ok(InstanceStore { path, instances })
    }

    fn save(&self) -> Result<()> {
        let doc = InstancesDocument {
            schema_version: Some(semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap()),
            instances: self.instances.clone(),
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

    pub fn list(&self) -> Vec<&Instance> {
        self.instances.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Instance> {
        self.instances.get(id).ok_or_else(|| ErrorKind::UnknownInstance(id.to_string()).into())
    }

    pub fn create(&mut self, instance: Instance) -> Result<()> {
        validate_slug(&instance.id)?;
        if self.instances.contains_key(&instance.id) {
            return Err(ErrorKind::DuplicateId(instance.id.clone()).into());
        }
        self.instances.insert(instance.id.clone(), instance);
        self.save()
    }

    pub fn update(&mut self, id: &str, patch: InstancePatch) -> Result<Instance> {
        let inst = self.instances.get_mut(id).ok_or_else(|| Error::from(ErrorKind::UnknownInstance(id.to_string())))?;
        if let Some(name) = patch.display_name {
            inst.display_name = name;
        }
        if let Some(config) = patch.config {
            inst.config = config;
        }
        if let Some(status) = patch.status {
            inst.status = status;
        }
        if let Some(err) = patch.last_error {
            inst.last_error = err;
        }
        inst.touch();
        let updated = inst.clone();
        self.save()?;
        Ok(updated)
    }

    pub fn update_status(&mut self, id: &str, status: InstanceStatus, access_url: Option<String>, error: Option<String>) -> Result<()> {
        let inst = self.instances.get_mut(id).ok_or_else(|| Error::from(ErrorKind::UnknownInstance(id.to_string())))?;
        inst.status = status;
        if error.is_some() {
            inst.last_error = error;
        } else if status != InstanceStatus::Error {
            inst.last_error = None;
        }
        let _ = access_url;
        inst.touch();
        self.save()
    }

    /// Removes the instance; cascading removal of wiring is the caller's
    /// responsibility since wiring lives in a separate store (spec.md 4.2
    /// invariant).
    pub fn delete(&mut self, id: &str) -> Result<Instance> {
        let inst = self.instances.remove(id).ok_or_else(|| ErrorKind::UnknownInstance(id.to_string()))?;
        self.save()?;
        Ok(inst)
    }

    /// Returns only the direct-value config entries, filtering out
    /// interpolations — what a UI shows as "what the user actually set"
    /// (spec.md 4.2).
    pub fn get_overrides(&self, id: &str) -> Result<BTreeMap<String, ushadow_settings::Value>> {
        let inst = self.require(id)?;
        Ok(inst
            .config
            .iter()
            .filter(|(_, v)| !v.is_interpolation())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path() -> PathBuf {
        std::env::temp_dir().join(format!("ushadow-instances-test-{}-{}", std::process::id(), rand_suffix()))
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[test]
    fn create_persists_and_rejects_duplicates() {
        let path = test_path();
        let mut store = InstanceStore::load(&path).unwrap();
        let inst = Instance::new("my-db".into(), "postgres".into(), "My DB".into());
        store.create(inst.clone()).unwrap();

        assert!(store.create(inst).is_err());

        let reloaded = InstanceStore::load(&path).unwrap();
        assert!(reloaded.get("my-db").is_some());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn create_rejects_invalid_slug() {
        let path = test_path();
        let mut store = InstanceStore::load(&path).unwrap();
        let inst = Instance::new("My DB".into(), "postgres".into(), "My DB".into());
        assert!(store.create(inst).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn delete_removes_from_store() {
        let path = test_path();
        let mut store = InstanceStore::load(&path).unwrap();
        store.create(Instance::new("my-db".into(), "postgres".into(), "My DB".into())).unwrap();
        store.delete("my-db").unwrap();
        assert!(store.get("my-db").is_none());
        assert!(store.delete("my-db").is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn get_overrides_filters_interpolations() {
        let path = test_path();
        let mut store = InstanceStore::load(&path).unwrap();
        let mut inst = Instance::new("my-db".into(), "postgres".into(), "My DB".into());
        inst.config.insert("password".to_string(), ushadow_settings::Value::literal("hunter2"));
        inst.config.insert("host".to_string(), ushadow_settings::Value::interp("network.host"));
        store.create(inst).unwrap();

        let overrides = store.get_overrides("my-db").unwrap();
        assert!(overrides.contains_key("password"));
        assert!(!overrides.contains_key("host"));

        std::fs::remove_file(&path).ok();
    }
}
