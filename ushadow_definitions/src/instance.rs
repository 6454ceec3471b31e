use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use ushadow_settings::Value;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Created but not yet fully configured: required capabilities unwired.
    Draft,
    /// All required inputs resolve; eligible for deployment.
    Ready,
    /// Has at least one non-terminal deployment record pointing at it.
    Deployed,
    /// Last resolution or deployment attempt failed.
    Error,
}

/// A user-created configuration over a [`Template`](crate::Template).
///
/// `config` holds the raw, possibly-interpolating values a user entered or
/// accepted as defaults (spec.md 4.1/4.2); it is never itself the resolved
/// environment a backend receives — that's produced by the capability
/// resolver from `config` plus wiring plus settings-store fallbacks.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Instance {
    pub id: String,
    pub template_id: String,
    pub display_name: String,

    #[serde(default)]
    pub config: BTreeMap<String, Value>,

    pub status: InstanceStatus,

    /// Present once at least one deployment has been created for this instance.
    pub deployment_id: Option<String>,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(id: String, template_id: String, display_name: String) -> Self {
        let now = Utc::now();
        Instance {
            id,
            template_id,
            display_name,
            config: BTreeMap::new(),
            status: InstanceStatus::Draft,
            deployment_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deployed(&self) -> bool {
        self.status == InstanceStatus::Deployed
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_starts_draft_with_no_deployment() {
        let inst = Instance::new("my-db".into(), "postgres".into(), "My DB".into());
        assert_eq!(inst.status, InstanceStatus::Draft);
        assert!(inst.deployment_id.is_none());
        assert!(!inst.is_deployed());
    }
}
