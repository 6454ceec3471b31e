use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use ushadow_settings::Value;

/// An edge binding one instance's capability output to another instance's
/// required or optional input (spec.md 4.2).
///
/// Wiring is directed and is keyed by `(target_instance_id,
/// target_capability)` for uniqueness: a given requirement on a given
/// instance has at most one source.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Wiring {
    pub id: String,
    pub source_instance_id: String,
    pub source_capability: String,
    pub target_instance_id: String,
    pub target_capability: String,
    pub created_at: DateTime<Utc>,
}

impl Wiring {
    pub fn new(
        id: String,
        source_instance_id: String,
        source_capability: String,
        target_instance_id: String,
        target_capability: String,
    ) -> Self {
        Wiring {
            id,
            source_instance_id,
            source_capability,
            target_instance_id,
            target_capability,
            created_at: Utc::now(),
        }
    }

    pub fn target_key(&self) -> (String, String) {
        (self.target_instance_id.clone(), self.target_capability.clone())
    }
}

/// Default values offered for an unwired optional capability, keyed by
/// capability name, as declared on the consuming template (spec.md 4.3 step 3).
pub type DefaultsMap = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_key_identifies_the_unique_slot() {
        let w = Wiring::new(
            "w1".into(),
            "redis-1".into(),
            "cache".into(),
            "app-1".into(),
            "cache".into(),
        );
        assert_eq!(w.target_key(), ("app-1".to_string(), "cache".to_string()));
    }
}
