use rand::RngCore;

use super::store::SettingsStore;
use super::Result;

/// Generator choices for `generate_if_missing` config fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    RandomHex32,
    RandomHex16,
    RandomUrlsafe,
}

impl Generator {
    fn generate(self) -> String {
        let mut rng = rand::thread_rng();
        match self {
            Generator::RandomHex32 => random_hex(&mut rng, 32),
            Generator::RandomHex16 => random_hex(&mut rng, 16),
            Generator::RandomUrlsafe => {
                let mut buf = [0u8; 32];
                rng.fill_bytes(&mut buf);
                base64::encode_config(&buf, base64::URL_SAFE_NO_PAD)
            }
        }
    }
}

fn random_hex(rng: &mut impl RngCore, n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    rng.fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `GetOrGenerate`: return the value at `path`, creating and persisting a
/// fresh one with `generator` if it's absent. Both the effect (persisting)
/// and the return happen in this single call, per DESIGN NOTES — callers
/// must never generate-without-persisting.
pub fn get_or_generate(store: &mut SettingsStore, path: &str, generator: Generator) -> Result<(String, bool)> {
    if let Some(existing) = store.get_string_opt(path) {
        return Ok((existing, false));
    }
    let fresh = generator.generate();
    store.set_string(path, &fresh);
    store.save()?;
    Ok((fresh, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_persists() {
        let dir = std::env::temp_dir().join(format!("ushadow-settings-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.yaml");
        let mut store = SettingsStore::load(&path).unwrap();

        let (v1, created1) = get_or_generate(&mut store, "services.chronicle.secret", Generator::RandomHex32).unwrap();
        assert!(created1);
        assert_eq!(v1.len(), 64);

        let reloaded = SettingsStore::load(&path).unwrap();
        let (v2, created2) = get_or_generate(&mut store, "services.chronicle.secret", Generator::RandomHex32).unwrap();
        assert!(!created2);
        assert_eq!(v1, v2);
        assert_eq!(reloaded.get_string("services.chronicle.secret").unwrap(), v1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
