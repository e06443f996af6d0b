//! Config validation: naming and referential integrity checked before the registry is built.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

/// Route segment used for aggregate documentation; no resource may take it.
pub const RESERVED_NAMES: &[&str] = &["docs"];

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    for (name, model) in &config.models {
        if model.table.trim().is_empty() {
            return Err(ConfigError::Validation(format!("model '{}' has an empty table", name)));
        }
        if model.primary_key.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "model '{}' has an empty primary key",
                name
            )));
        }
    }

    let mut seen = HashSet::new();
    for (name, res) in &config.resources {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ConfigError::Validation(format!(
                "resource name '{}' must be a single path segment of [A-Za-z0-9_-]",
                name
            )));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::ReservedName(name.clone()));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::Validation(format!("duplicate resource name '{}'", name)));
        }
        if let Some(default_field) = &res.sort.default.field {
            if !res.sort.fields.is_empty() && !res.sort.fields.contains(default_field) {
                tracing::debug!(resource = %name, field = %default_field, "default sort field is not in the sortable list");
            }
        }
        if res.search.enabled && res.search.fields.is_empty() {
            return Err(ConfigError::Validation(format!(
                "resource '{}' enables search without searchable fields",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json_str;

    #[test]
    fn rejects_reserved_resource_name() {
        let doc = r#"{ "models": { "d": { "table": "d" } }, "resources": { "docs": { "model": "d" } } }"#;
        assert!(matches!(
            validate(&from_json_str(doc).unwrap()),
            Err(ConfigError::ReservedName(_))
        ));
    }

    #[test]
    fn rejects_search_without_fields() {
        let doc = r#"{ "models": { "p": { "table": "posts" } },
            "resources": { "posts": { "model": "p", "search": { "enabled": true } } } }"#;
        assert!(matches!(
            validate(&from_json_str(doc).unwrap()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn rejects_path_like_names() {
        let doc = r#"{ "models": { "p": { "table": "posts" } },
            "resources": { "a/b": { "model": "p" } } }"#;
        assert!(validate(&from_json_str(doc).unwrap()).is_err());
    }
}
