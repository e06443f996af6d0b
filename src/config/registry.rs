//! Process-wide resource registry: built once at startup, read-only afterwards.

use crate::config::resolved::{ResolvedResource, ResourceConfig};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::logic::LogicRegistry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct ResourceRegistry {
    settings: ApiSettings,
    models: HashMap<String, Arc<ModelDefinition>>,
    resources: BTreeMap<String, Arc<ResourceConfig>>,
    logic: LogicRegistry,
}

impl ResourceRegistry {
    /// Validate the document and resolve every resource. Any failure here is fatal for startup.
    pub fn build(config: FullConfig, logic: LogicRegistry) -> Result<Self, ConfigError> {
        validate(&config)?;
        let FullConfig {
            settings,
            models,
            resources,
        } = config;

        let models = models
            .into_iter()
            .map(|(name, mut def)| {
                def.name = name.clone();
                (name, Arc::new(def))
            })
            .collect();
        let resources = resources
            .into_iter()
            .map(|(name, def)| {
                let cfg = ResourceConfig::from_definition(&name, def, &settings);
                (name, Arc::new(cfg))
            })
            .collect();

        let registry = Self {
            settings,
            models,
            resources,
            logic,
        };
        for name in registry.resources.keys() {
            registry.resolve(name)?;
        }
        Ok(registry)
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Look up a resource and check its model reference. Pure and idempotent.
    pub fn resolve(&self, name: &str) -> Result<ResolvedResource, ConfigError> {
        let config = self
            .resources
            .get(name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))?;
        let model_name = config
            .model
            .as_deref()
            .ok_or_else(|| ConfigError::MissingModel(name.to_string()))?;
        let model = self
            .models
            .get(model_name)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: model_name.to_string(),
                resource: name.to_string(),
            })?;
        let related = config
            .relationships
            .iter()
            .filter_map(|(field, meta)| {
                self.models
                    .get(&meta.entity)
                    .map(|m| (field.clone(), m.clone()))
            })
            .collect();
        Ok(ResolvedResource {
            config: config.clone(),
            model: model.clone(),
            logic: self.logic.for_resource(config.logic.as_deref()),
            related,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json_str;

    const DOC: &str = r#"{
        "models": {
            "user": { "table": "users" },
            "team": { "table": "teams" }
        },
        "resources": {
            "users": {
                "model": "user",
                "validation": { "name": "required|string|max:255", "email": ["required", "email"] },
                "relationships": {
                    "team_id": { "entity": "team", "labelField": "name", "valueField": "id" },
                    "owner_id": { "entity": "ghost" }
                },
                "api": { "per_page": 500, "max_per_page": 1000 }
            }
        }
    }"#;

    #[test]
    fn legacy_validation_applies_to_store_and_update() {
        let registry = ResourceRegistry::build(from_json_str(DOC).unwrap(), LogicRegistry::new()).unwrap();
        let users = registry.resolve("users").unwrap();
        assert_eq!(users.config.rules.store, users.config.rules.update);
        assert_eq!(
            users.config.rules.store.get("name").unwrap(),
            ["required", "string", "max:255"]
        );
        assert_eq!(users.config.rules.store.get("email").unwrap(), ["required", "email"]);
    }

    #[test]
    fn resource_pagination_is_capped_by_global_max() {
        let registry = ResourceRegistry::build(from_json_str(DOC).unwrap(), LogicRegistry::new()).unwrap();
        let users = registry.resolve("users").unwrap();
        assert_eq!(users.config.pagination.max_per_page, 100);
        assert_eq!(users.config.pagination.per_page, 100);
    }

    #[test]
    fn only_known_entities_are_eager_loadable() {
        let registry = ResourceRegistry::build(from_json_str(DOC).unwrap(), LogicRegistry::new()).unwrap();
        let users = registry.resolve("users").unwrap();
        assert!(users.related.contains_key("team_id"));
        assert!(!users.related.contains_key("owner_id"));
    }

    #[test]
    fn unknown_resource_is_a_config_error() {
        let registry = ResourceRegistry::build(from_json_str(DOC).unwrap(), LogicRegistry::new()).unwrap();
        assert!(matches!(
            registry.resolve("nope"),
            Err(ConfigError::UnknownResource(_))
        ));
    }

    #[test]
    fn missing_model_reference_fails_at_build() {
        let doc = r#"{ "resources": { "orphans": { "fillable": ["a"] } } }"#;
        let err = ResourceRegistry::build(from_json_str(doc).unwrap(), LogicRegistry::new())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingModel(name) if name == "orphans"));
    }

    #[test]
    fn unresolvable_model_reference_fails_at_build() {
        let doc = r#"{ "resources": { "posts": { "model": "post" } } }"#;
        let err = ResourceRegistry::build(from_json_str(doc).unwrap(), LogicRegistry::new())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingReference { kind: "model", .. }));
    }
}
