use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::EngineOptions;

/// Schema engine configuration.
///
/// # Example
///
/// ```toml
/// [engine]
/// draft = "draft7"
/// coerce_types = false
/// plugins = ["formats", ["error-messages", { keyword = "errorMessage" }]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// JSON Schema draft used for schemas without `$schema`.
    #[serde(default)]
    pub draft: SchemaDraft,

    /// Coerce scalar payload values toward the declared `type`.
    #[serde(default)]
    pub coerce_types: bool,

    /// Fill in missing properties that declare a `default`.
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    /// Strip properties not declared where `additionalProperties` is `false`.
    #[serde(default = "default_true")]
    pub remove_additional: bool,

    /// Collect every violation instead of stopping at the first.
    #[serde(default = "default_true")]
    pub all_errors: bool,

    /// Engine plugins, by catalog name, applied in order.
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            draft: SchemaDraft::default(),
            coerce_types: false,
            use_defaults: true,
            remove_additional: true,
            all_errors: true,
            plugins: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            draft: self.draft,
            coerce_types: self.coerce_types,
            use_defaults: self.use_defaults,
            remove_additional: self.remove_additional,
            all_errors: self.all_errors,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A plugin reference: a bare name, or a name with options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginEntry {
    Name(String),
    WithOptions(String, Value),
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        match self {
            PluginEntry::Name(name) | PluginEntry::WithOptions(name, _) => name,
        }
    }

    pub fn options(&self) -> Option<&Value> {
        match self {
            PluginEntry::Name(_) => None,
            PluginEntry::WithOptions(_, options) => Some(options),
        }
    }
}

/// Supported JSON Schema drafts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaDraft {
    Draft4,
    Draft6,
    #[default]
    Draft7,
    Draft201909,
    Draft202012,
}

impl From<SchemaDraft> for jsonschema::Draft {
    fn from(draft: SchemaDraft) -> Self {
        match draft {
            SchemaDraft::Draft4 => jsonschema::Draft::Draft4,
            SchemaDraft::Draft6 => jsonschema::Draft::Draft6,
            SchemaDraft::Draft7 => jsonschema::Draft::Draft7,
            SchemaDraft::Draft201909 => jsonschema::Draft::Draft201909,
            SchemaDraft::Draft202012 => jsonschema::Draft::Draft202012,
        }
    }
}
