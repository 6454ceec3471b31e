use std::collections::BTreeMap;

use ushadow_definitions::resolved::{EnvSource, ResolvedEnv};
use ushadow_definitions::template::EnvMap;
use ushadow_definitions::{ErrorKind, Instance, Result, Template};
use ushadow_filebacked::{InstanceStore, TemplateRegistry, WiringStore};
use ushadow_settings::{generator, SettingsStore};

/// The instance or bare template chosen to provide one capability
/// (spec.md 4.3 step 1). A bare template is an "ambient singleton": there
/// is no instance-level override source, only settings/default.
enum Provider<'a> {
    Instance(&'a Instance),
    Template(&'a Template),
}

impl<'a> Provider<'a> {
    fn template_id(&self) -> &str {
        match self {
            Provider::Instance(i) => &i.template_id,
            Provider::Template(t) => &t.id,
        }
    }

    fn override_value(&self, logical_key: &str) -> Option<String> {
        match self {
            Provider::Instance(i) => i.config.get(logical_key).map(|v| v.as_raw()),
            Provider::Template(_) => None,
        }
    }
}

/// Produces the concrete environment map for an instance, walking
/// wiring → defaults → settings-selected provider → mode default, then
/// resolving each env_map entry override → settings → default
/// (spec.md 4.3).
pub struct CapabilityResolver<'a> {
    pub templates: &'a TemplateRegistry,
    pub instances: &'a InstanceStore,
    pub wiring: &'a WiringStore,
    pub settings: &'a mut SettingsStore,
}

impl<'a> CapabilityResolver<'a> {
    pub fn new(
        templates: &'a TemplateRegistry,
        instances: &'a InstanceStore,
        wiring: &'a WiringStore,
        settings: &'a mut SettingsStore,
    ) -> Self {
        CapabilityResolver { templates, instances, wiring, settings }
    }

    /// The full resolution pass for `instance_id`. Errors accumulate
    /// across every required capability so the caller sees every missing
    /// input in one report, per spec.md 4.3/7.
    pub fn resolve(&mut self, instance_id: &str) -> Result<BTreeMap<String, ResolvedEnv>> {
        let instance = self.instances.require(instance_id)?.clone();
        let template = self.templates.require(&instance.template_id)?.clone();

        let mut env = BTreeMap::new();
        let mut missing = Vec::new();

        for capability in &template.requires {
            match self.resolve_capability(&instance, &template, capability) {
                Ok(entries) => env.extend(entries),
                Err(keys) => missing.extend(keys),
            }
        }
        for capability in &template.optional {
            match self.resolve_capability(&instance, &template, capability) {
                Ok(entries) => env.extend(entries),
                Err(_) => warn!("optional capability '{}' unresolved for instance '{}'", capability, instance_id),
            }
        }

        if !missing.is_empty() {
            return Err(ErrorKind::ResolutionFailed(missing).into());
        }

        for field in &template.config_schema {
            if let Some((key, value)) = self.resolve_config_field(&instance, field)? {
                env.insert(key, value);
            }
        }

        Ok(env)
    }

    /// Step 1: select the provider for `capability`.
    fn select_provider(&self, consumer_id: &str, capability: &str, mode: Option<ushadow_definitions::Mode>) -> Option<Provider<'a>> {
        if let Some(w) = self.wiring.get_provider(consumer_id, capability) {
            if let Some(inst) = self.instances.get(&w.source_instance_id) {
                return Some(Provider::Instance(inst));
            }
        }
        if let Some(default_value) = self.wiring.get_defaults().get(capability) {
            let source_id = default_value.as_raw();
            if let Some(inst) = self.instances.get(&source_id) {
                return Some(Provider::Instance(inst));
            }
        }
        let selected_path = format!("selected_providers.{}", capability);
        if let Some(template_id) = self.settings.get_string_opt(&selected_path) {
            if let Some(tpl) = self.templates.get(&template_id) {
                return Some(Provider::Template(tpl));
            }
        }
        self.templates
            .list()
            .into_iter()
            .find(|t| t.provides.as_deref() == Some(capability) && (mode.is_none() || t.mode == mode))
    }

    /// Steps 2-3 for one capability: resolve every env_map entry on the
    /// chosen provider, then apply the consumer's `env_mapping` renames.
    /// Returns the keys that failed to resolve on error, for aggregation.
    fn resolve_capability(
        &self,
        instance: &Instance,
        consumer: &Template,
        capability: &str,
    ) -> std::result::Result<BTreeMap<String, ResolvedEnv>, Vec<String>> {
        let provider = match self.select_provider(&instance.id, capability, consumer.mode) {
            Some(p) => p,
            None => return Err(vec![capability.to_string()]),
        };
        let provider_template = match self.templates.get(provider.template_id()) {
            Some(t) => t.clone(),
            None => return Err(vec![capability.to_string()]),
        };

        let mut out = BTreeMap::new();
        let mut missing = Vec::new();

        for env_map in &provider_template.env_maps {
            match self.resolve_env_map(&provider, env_map) {
                Some(resolved) => {
                    let var_name = consumer
                        .env_mapping
                        .get(&env_map.env_var_name())
                        .cloned()
                        .unwrap_or_else(|| env_map.env_var_name());
                    out.insert(var_name, resolved);
                }
                None if env_map.required => missing.push(format!("{}.{}", capability, env_map.logical_key)),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(out)
    }

    /// Step 2 for a single env_map entry: override → settings → default.
    fn resolve_env_map(&self, provider: &Provider, env_map: &EnvMap) -> Option<ResolvedEnv> {
        if let Some(v) = provider.override_value(&env_map.logical_key) {
            return Some(ResolvedEnv::new(v, EnvSource::Override));
        }
        if let Some(path) = &env_map.settings_path {
            if let Some(v) = self.settings.get_string_opt(path) {
                return Some(ResolvedEnv::new(v, EnvSource::Settings).with_source_path(path.clone()));
            }
        }
        if let Some(default) = &env_map.default {
            return Some(ResolvedEnv::new(default.clone(), EnvSource::Default));
        }
        None
    }

    /// Service-specific (non-capability) config items, each resolved
    /// through the settings store with optional `generate_if_missing`.
    fn resolve_config_field(
        &mut self,
        instance: &Instance,
        field: &ushadow_definitions::ConfigField,
    ) -> Result<Option<(String, ResolvedEnv)>> {
        if let Some(v) = instance.config.get(&field.key) {
            return Ok(Some((field.key.clone(), ResolvedEnv::new(v.as_raw(), EnvSource::Override))));
        }
        if let Some(path) = &field.settings_path {
            if let Some(v) = self.settings.get_string_opt(path) {
                return Ok(Some((
                    field.key.clone(),
                    ResolvedEnv::new(v, EnvSource::Settings).with_source_path(path.clone()),
                )));
            }
            if let Some(gen) = field.generate_if_missing {
                let (v, _created) = generator::get_or_generate(self.settings, path, gen)?;
                return Ok(Some((
                    field.key.clone(),
                    ResolvedEnv::new(v, EnvSource::Settings).with_source_path(path.clone()),
                )));
            }
        }
        if let Some(default) = &field.default {
            return Ok(Some((field.key.clone(), ResolvedEnv::new(default.clone(), EnvSource::Default))));
        }
        if field.optional {
            Ok(None)
        } else {
            Ok(Some((field.key.clone(), ResolvedEnv::new(String::new(), EnvSource::Default))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &std::path::Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn resolves_via_wiring_override_before_settings() {
        use ushadow_settings::Value;

        let tmp = std::env::temp_dir().join(format!("ushadow-resolver-test-{}", std::process::id()));
        std::fs::create_dir_all(&tmp).unwrap();

        write_file(
            &tmp.join("providers").join("openai.yaml"),
            r#"
capability: llm
mode: cloud
env_maps:
  - logical_key: api_key
    env_var: API_KEY
    settings_path: api_keys.openai
    required: true
"#,
        );
        write_file(
            &tmp.join("compose").join("chronicle.yml"),
            r#"
version: "3.8"
services:
  chronicle:
    image: ghcr.io/example/chronicle:latest
    labels:
      ushadow.requires: "llm"
"#,
        );

        let templates = TemplateRegistry::new(tmp.join("compose"), tmp.join("providers")).unwrap();

        let mut instances = InstanceStore::load(tmp.join("instances.yaml")).unwrap();
        let mut openai_instance = ushadow_definitions::Instance::new("openai-1".into(), "openai".into(), "OpenAI".into());
        openai_instance.config.insert("api_key".to_string(), Value::literal("sk-override"));
        instances.create(openai_instance).unwrap();
        instances
            .create(ushadow_definitions::Instance::new("my-app".into(), "chronicle-chronicle".into(), "My App".into()))
            .unwrap();

        let mut wiring = WiringStore::load(tmp.join("wiring.yaml")).unwrap();
        wiring
            .create(ushadow_definitions::Wiring::new(
                "w1".into(),
                "openai-1".into(),
                "llm".into(),
                "my-app".into(),
                "llm".into(),
            ))
            .unwrap();

        let mut settings = SettingsStore::load(tmp.join("settings.yaml")).unwrap();

        let mut resolver = CapabilityResolver::new(&templates, &instances, &wiring, &mut settings);
        let resolved = resolver.resolve("my-app").unwrap();

        let entry = resolved.get("API_KEY").expect("API_KEY resolved");
        assert_eq!(entry.value, "sk-override");
        assert_eq!(entry.source, EnvSource::Override);

        std::fs::remove_dir_all(&tmp).ok();
    }
}
