//! Rewriter configuration shared by every pipeline stage.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pipeline::FailurePolicy;
use crate::pipeline::messages::MessageLevel;

/// Environment variable overriding [`RewriterConfig::log_level`].
pub const LOG_ENV: &str = "SANITREE_LOG";
/// Environment variable forcing fail-fast (`1`/`true`) or continue (`0`/`false`).
pub const FAIL_FAST_ENV: &str = "SANITREE_FAIL_FAST";

/// Identity of the code unit being rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginMeta {
    /// Class/namespace suffix applied to identifiers of this unit.
    pub id_class: Option<String>,
    /// URI relative references are resolved against.
    pub base_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriterConfig {
    pub failure_policy: FailurePolicy,
    /// A message at or above this level makes the run fail.
    pub failure_threshold: MessageLevel,
    /// Whether consolidated script is wrapped in a `Module` node.
    pub wrap_modules: bool,
    pub plugin: PluginMeta,
    pub log_level: Option<String>,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        RewriterConfig {
            failure_policy: FailurePolicy::Continue,
            failure_threshold: MessageLevel::Error,
            wrap_modules: true,
            plugin: PluginMeta::default(),
            log_level: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {variable}")]
    InvalidEnv { variable: &'static str, value: String },
}

impl RewriterConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a JSON configuration file and applies environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config = RewriterConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config.with_env_overrides()?)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up through `lookup`, which maps a variable
    /// name to its value.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(level) = lookup(LOG_ENV).filter(|level| !level.trim().is_empty()) {
            self.log_level = Some(level);
        }
        if let Some(value) = lookup(FAIL_FAST_ENV) {
            self.failure_policy = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => FailurePolicy::FailFast,
                "0" | "false" | "no" => FailurePolicy::Continue,
                _ => return Err(ConfigError::InvalidEnv { variable: FAIL_FAST_ENV, value }),
            };
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = RewriterConfig::from_json_str(r#"{ "wrap_modules": false }"#).unwrap();
        assert!(!config.wrap_modules);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.failure_threshold, MessageLevel::Error);
    }

    #[test]
    fn test_full_document() {
        let config = RewriterConfig::from_json_str(indoc! {r#"
            {
              "failure_policy": "fail_fast",
              "failure_threshold": "warning",
              "plugin": { "id_class": "g123___", "base_uri": "http://example.com/gadget/" },
              "log_level": "debug"
            }
        "#})
        .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.failure_threshold, MessageLevel::Warning);
        assert_eq!(config.plugin.id_class.as_deref(), Some("g123___"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        let again = RewriterConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = RewriterConfig::from_json_str(r#"{ "fail_fast": true }"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_overrides() {
        let config = RewriterConfig::default()
            .with_overrides_from(|name| match name {
                LOG_ENV => Some("trace".to_string()),
                FAIL_FAST_ENV => Some("TRUE".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.log_level.as_deref(), Some("trace"));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);

        let err = RewriterConfig::default()
            .with_overrides_from(|name| (name == FAIL_FAST_ENV).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { variable: FAIL_FAST_ENV, .. }));
    }
}
