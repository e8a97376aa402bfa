//! Engine plugins.
//!
//! A plugin receives the [`EngineBuilder`] before the engine is built, plus
//! its optional configuration, and may register formats, shared schemas or
//! message handling. Plugins are looked up by name through a
//! [`PluginCatalog`] when configured from a file.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use super::engine::EngineBuilder;
use crate::config::{ConfigError, PluginEntry};

/// Extension point applied to an engine under construction.
pub trait EnginePlugin: Send + Sync {
    /// Catalog name, used in configuration and error messages.
    fn name(&self) -> &str;

    fn apply(&self, engine: &mut EngineBuilder, options: Option<&Value>) -> Result<(), String>;
}

/// A plugin paired with the options it was configured with.
#[derive(Clone)]
pub struct PluginSpec {
    plugin: Arc<dyn EnginePlugin>,
    options: Option<Value>,
}

impl fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSpec")
            .field("plugin", &self.plugin.name())
            .field("options", &self.options)
            .finish()
    }
}

impl PluginSpec {
    pub fn new(plugin: impl EnginePlugin + 'static) -> Self {
        Self {
            plugin: Arc::new(plugin),
            options: None,
        }
    }

    pub fn with_options(plugin: impl EnginePlugin + 'static, options: Value) -> Self {
        Self {
            plugin: Arc::new(plugin),
            options: Some(options),
        }
    }

    pub fn plugin(&self) -> &dyn EnginePlugin {
        self.plugin.as_ref()
    }

    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref()
    }
}

/// Named plugins available to configuration files.
#[derive(Clone)]
pub struct PluginCatalog {
    plugins: HashMap<String, Arc<dyn EnginePlugin>>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("PluginCatalog").field("plugins", &names).finish()
    }
}

impl Default for PluginCatalog {
    /// Catalog holding the built-in plugins.
    fn default() -> Self {
        let mut catalog = Self::empty();
        #[cfg(feature = "formats")]
        catalog.register(FormatsPlugin);
        catalog.register(ErrorMessagesPlugin);
        catalog
    }
}

impl PluginCatalog {
    pub fn empty() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Add a plugin, replacing any existing plugin with the same name.
    pub fn register(&mut self, plugin: impl EnginePlugin + 'static) -> &mut Self {
        self.plugins
            .insert(plugin.name().to_string(), Arc::new(plugin));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EnginePlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Turn configured entries into plugin specs, preserving order.
    pub fn resolve(&self, entries: &[PluginEntry]) -> Result<Vec<PluginSpec>, ConfigError> {
        entries
            .iter()
            .map(|entry| {
                let plugin = self
                    .get(entry.name())
                    .ok_or_else(|| ConfigError::UnknownPlugin(entry.name().to_string()))?;
                Ok(PluginSpec {
                    plugin,
                    options: entry.options().cloned(),
                })
            })
            .collect()
    }
}

/// Turns on `format` assertions and registers the OpenAPI formats.
///
/// Options: `{ "formats": ["int32", "byte"] }` limits which formats are added.
#[cfg(feature = "formats")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatsPlugin;

#[cfg(feature = "formats")]
impl FormatsPlugin {
    const FORMATS: &'static [&'static str] =
        &["int32", "int64", "float", "double", "byte", "binary", "password"];

    fn check(name: &str) -> Option<fn(&str) -> bool> {
        use base64::Engine as _;

        let check: fn(&str) -> bool = match name {
            "int32" => |s| s.parse::<i32>().is_ok(),
            "int64" => |s| s.parse::<i64>().is_ok(),
            "float" => |s| s.parse::<f32>().is_ok_and(f32::is_finite),
            "double" => |s| s.parse::<f64>().is_ok_and(f64::is_finite),
            "byte" => |s| base64::engine::general_purpose::STANDARD.decode(s).is_ok(),
            "binary" | "password" => |_| true,
            _ => return None,
        };
        Some(check)
    }
}

#[cfg(feature = "formats")]
impl EnginePlugin for FormatsPlugin {
    fn name(&self) -> &str {
        "formats"
    }

    fn apply(&self, engine: &mut EngineBuilder, options: Option<&Value>) -> Result<(), String> {
        let selected: Vec<&str> = match options.and_then(|o| o.get("formats")) {
            None => Self::FORMATS.to_vec(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| n.as_str().ok_or("format names must be strings"))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err("'formats' option must be an array".into()),
        };

        engine.validate_formats(true);
        for name in selected {
            let check = Self::check(name).ok_or_else(|| format!("unknown format '{name}'"))?;
            engine.add_format(name, check);
        }
        Ok(())
    }
}

/// Reports schema-authored messages in place of validator output.
///
/// Options: `{ "keyword": "x-message" }` changes the keyword read from
/// schemas (default `errorMessage`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorMessagesPlugin;

impl ErrorMessagesPlugin {
    pub const DEFAULT_KEYWORD: &'static str = "errorMessage";
}

impl EnginePlugin for ErrorMessagesPlugin {
    fn name(&self) -> &str {
        "error-messages"
    }

    fn apply(&self, engine: &mut EngineBuilder, options: Option<&Value>) -> Result<(), String> {
        let keyword = match options.and_then(|o| o.get("keyword")) {
            None => Self::DEFAULT_KEYWORD,
            Some(Value::String(k)) if !k.is_empty() => k.as_str(),
            Some(_) => return Err("'keyword' option must be a non-empty string".into()),
        };
        engine.custom_messages(keyword);
        Ok(())
    }
}
