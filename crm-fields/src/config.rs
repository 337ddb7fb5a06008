//! Layered configuration for the custom fields layer.
//!
//! Precedence, lowest to highest: built-in defaults → `crm-fields.toml` →
//! `crm-fields.yaml` → `crm-fields.json` → `CRM_FIELDS_*` environment
//! variables. Nested keys use `__` in variable names, e.g.
//! `CRM_FIELDS_VALUES__ENFORCE_VALIDATION=true`.

use std::path::Path;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File stem searched for in the configuration directory
pub const CONFIG_FILE_STEM: &str = "crm-fields";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CRM_FIELDS_";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub validation: ValidationConfig,
    pub values: ValuesConfig,
    pub display: DisplayConfig,
}

/// Limits applied when compiling author-supplied patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Upper bound on the compiled program size of a pattern, in bytes
    pub regex_size_limit: usize,
    /// Upper bound on the lazy DFA cache of a pattern, in bytes
    pub regex_dfa_size_limit: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            regex_size_limit: 256 * 1024,
            regex_dfa_size_limit: 1024 * 1024,
        }
    }
}

/// Value store behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesConfig {
    /// Run the validation engine inside `set`/`set_many`.
    ///
    /// Off by default: callers validate before writing.
    pub enforce_validation: bool,
}

/// Display formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub currency_symbol: String,
    /// chrono format string used for date fields
    pub date_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "$".to_string(),
            date_format: "%b %-d, %Y".to_string(),
        }
    }
}

impl FieldsConfig {
    /// Build the figment for a configuration directory without extracting it.
    pub fn figment(dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(FieldsConfig::default()))
            .merge(Toml::file(dir.join(format!("{CONFIG_FILE_STEM}.toml"))))
            .merge(Yaml::file(dir.join(format!("{CONFIG_FILE_STEM}.yaml"))))
            .merge(Json::file(dir.join(format!("{CONFIG_FILE_STEM}.json"))))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from `dir`, layering environment variables on top.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let config: FieldsConfig = Self::figment(dir).extract()?;
        tracing::debug!(
            dir = %dir.display(),
            enforce_validation = config.values.enforce_validation,
            "loaded custom fields configuration"
        );
        Ok(config)
    }

    /// Load configuration from the current working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
        Self::load_from(&cwd)
    }
}
