//! Load the resource document from JSON (string or file) and apply environment overrides.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::path::Path;

/// Env var overriding `settings.prefix`.
pub const PREFIX_ENV: &str = "CRUD_API_PREFIX";
/// Env var overriding `settings.debug` ("1"/"true" enables).
pub const DEBUG_ENV: &str = "CRUD_API_DEBUG";

pub fn from_json_str(s: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read the document from disk, then apply env overrides.
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading resource config");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let mut config = from_json_str(&raw)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn apply_env_overrides(config: &mut FullConfig) {
    if let Ok(prefix) = std::env::var(PREFIX_ENV) {
        config.settings.prefix = prefix;
    }
    if let Ok(debug) = std::env::var(DEBUG_ENV) {
        config.settings.debug = matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_settings() {
        let config = from_json_str("{}").unwrap();
        assert_eq!(config.settings.prefix, "api");
        assert_eq!(config.settings.pagination.per_page, 15);
        assert_eq!(config.settings.pagination.max_per_page, 100);
        assert_eq!(config.settings.permissions.format, "{action}-{resource}");
        assert!(config.settings.permissions.enabled);
        assert!(!config.settings.debug);
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(from_json_str("{"), Err(ConfigError::Load(_))));
    }
}
