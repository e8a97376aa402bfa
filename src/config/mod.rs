//! Configuration for response validation.
//!
//! The plugin can be configured programmatically through
//! [`PluginOptions`](crate::PluginOptions), or from a TOML file with support
//! for environment variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! response_validation = true
//! response_status_code_validation = false
//!
//! [engine]
//! coerce_types = false
//! plugins = ["formats"]
//!
//! [logging]
//! level = "info"
//! ```

mod engine;
mod observability;

use std::path::Path;

pub use engine::*;
pub use observability::*;
use serde::{Deserialize, Serialize};

use crate::router::DEFAULT_MAX_PAYLOAD_BYTES;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseValidationConfig {
    /// Validate responses of routes that declare a response schema.
    /// Routes may override this with their own flag.
    #[serde(default = "default_true")]
    pub response_validation: bool,

    /// Reject responses whose status code has no schema at all.
    /// Routes may override this with their own flag.
    #[serde(default)]
    pub response_status_code_validation: bool,

    /// Largest response payload buffered for validation.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Schema engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ResponseValidationConfig {
    fn default() -> Self {
        Self {
            response_validation: true,
            response_status_code_validation: false,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

impl ResponseValidationConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Shape-check the plugin list before typed deserialization so a wrong
        // type is reported by name instead of as an untagged-enum mismatch.
        let raw: toml::Value = toml::from_str(&expanded)?;
        check_plugins_shape(raw.get("engine").and_then(|e| e.get("plugins")))?;

        let mut config: ResponseValidationConfig = toml::from_str(&expanded)?;
        config.validate()?;

        Ok(config)
    }

    /// Build configuration from an already-parsed JSON document.
    ///
    /// Unlike TOML, JSON can carry an explicit `null`; a `null` plugin list
    /// is rejected like any other non-array value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        if let Some(engine) = value.get("engine")
            && let Some(plugins) = engine.as_object().and_then(|e| e.get("plugins"))
        {
            check_json_plugins_shape(plugins)?;
        }

        let mut config: ResponseValidationConfig = serde_json::from_value(value)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_payload_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("engine.plugins option should be an array, instead got '{0}'")]
    PluginsNotArray(String),

    #[error(
        "engine.plugins[{index}] should be a plugin name or a [name, options] pair, instead got '{found}'"
    )]
    InvalidPluginEntry { index: usize, found: String },

    #[error("Unknown engine plugin '{0}'")]
    UnknownPlugin(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn check_plugins_shape(plugins: Option<&toml::Value>) -> Result<(), ConfigError> {
    let Some(plugins) = plugins else {
        return Ok(());
    };
    let entries = plugins
        .as_array()
        .ok_or_else(|| ConfigError::PluginsNotArray(plugins.type_str().to_string()))?;

    for (index, entry) in entries.iter().enumerate() {
        let valid = match entry {
            toml::Value::String(_) => true,
            toml::Value::Array(pair) => {
                pair.len() == 2 && pair[0].is_str() && pair[1].is_table()
            }
            _ => false,
        };
        if !valid {
            return Err(ConfigError::InvalidPluginEntry {
                index,
                found: entry.to_string(),
            });
        }
    }
    Ok(())
}

fn check_json_plugins_shape(plugins: &serde_json::Value) -> Result<(), ConfigError> {
    let entries = plugins
        .as_array()
        .ok_or_else(|| ConfigError::PluginsNotArray(json_type_name(plugins).to_string()))?;

    for (index, entry) in entries.iter().enumerate() {
        let valid = match entry {
            serde_json::Value::String(_) => true,
            serde_json::Value::Array(pair) => {
                pair.len() == 2 && pair[0].is_string() && pair[1].is_object()
            }
            _ => false,
        };
        if !valid {
            return Err(ConfigError::InvalidPluginEntry {
                index,
                found: entry.to_string(),
            });
        }
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Expand `${VAR_NAME}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
