//! Typed per-plugin configuration and its persisted store.
//!
//! Each plugin publishes a [`ConfigSchema`]. Persisted values are merged over
//! the schema defaults when plugins load; anything the schema does not
//! describe is dropped with a warning rather than silently kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Key every plugin has implicitly; `false` skips its handlers.
pub const ENABLED_KEY: &str = "enabled";

/// Errors from reading or updating plugin configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
    #[error("plugin '{plugin}' has no option '{key}'")]
    UnknownKey { plugin: String, key: String },
    #[error("option '{key}' of plugin '{plugin}' expects {expected}")]
    TypeMismatch {
        plugin: String,
        key: String,
        expected: &'static str,
    },
    #[error("plugin config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("plugin config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl ConfigValue {
    /// Human name of the value type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "a boolean",
            ConfigValue::Int(_) => "an integer",
            ConfigValue::Str(_) => "a string",
            ConfigValue::List(_) => "a list of strings",
        }
    }

    /// Convert a JSON value into the same variant as `self`.
    pub fn coerce_json(&self, value: &Value) -> Option<ConfigValue> {
        match (self, value) {
            (ConfigValue::Bool(_), Value::Bool(b)) => Some(ConfigValue::Bool(*b)),
            (ConfigValue::Int(_), Value::Number(n)) => n.as_i64().map(ConfigValue::Int),
            (ConfigValue::Str(_), Value::String(s)) => Some(ConfigValue::Str(s.clone())),
            (ConfigValue::List(_), Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(ConfigValue::List),
            _ => None,
        }
    }

    /// Parse command-line text into the same variant as `self`.
    ///
    /// Lists are comma separated; an empty string is an empty list.
    pub fn parse_like(&self, raw: &str) -> Option<ConfigValue> {
        let raw = raw.trim();
        match self {
            ConfigValue::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(ConfigValue::Bool(true)),
                "false" | "no" | "off" | "0" => Some(ConfigValue::Bool(false)),
                _ => None,
            },
            ConfigValue::Int(_) => raw.parse().ok().map(ConfigValue::Int),
            ConfigValue::Str(_) => Some(ConfigValue::Str(raw.to_string())),
            ConfigValue::List(_) => Some(ConfigValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Int(i) => Value::from(*i),
            ConfigValue::Str(s) => Value::String(s.clone()),
            ConfigValue::List(items) => Value::from(items.clone()),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Str(s) => write!(f, "{:?}", s),
            ConfigValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// One documented option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub key: String,
    pub default: ConfigValue,
    pub description: String,
}

/// The options a plugin accepts, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSchema {
    options: Vec<ConfigOption>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option.
    pub fn option(
        mut self,
        key: impl Into<String>,
        default: ConfigValue,
        description: impl Into<String>,
    ) -> Self {
        self.options.push(ConfigOption {
            key: key.into(),
            default,
            description: description.into(),
        });
        self
    }

    /// Declared options plus the implicit `enabled` switch, which comes first.
    pub fn options(&self) -> Vec<ConfigOption> {
        let mut all = Vec::with_capacity(self.options.len() + 1);
        if !self.options.iter().any(|o| o.key == ENABLED_KEY) {
            all.push(ConfigOption {
                key: ENABLED_KEY.to_string(),
                default: ConfigValue::Bool(true),
                description: "Run this plugin's handlers".to_string(),
            });
        }
        all.extend(self.options.iter().cloned());
        all
    }

    pub fn get(&self, key: &str) -> Option<ConfigOption> {
        self.options().into_iter().find(|o| o.key == key)
    }

    pub fn defaults(&self) -> PluginConfig {
        PluginConfig {
            values: self
                .options()
                .into_iter()
                .map(|o| (o.key, o.default))
                .collect(),
        }
    }

    /// Merge persisted values over the defaults.
    ///
    /// Unknown keys are dropped and mistyped values fall back to the
    /// default; both are logged.
    pub fn merge(&self, plugin: &str, stored: Option<&Map<String, Value>>) -> PluginConfig {
        let mut config = self.defaults();
        let Some(stored) = stored else {
            return config;
        };

        for (key, raw) in stored {
            let Some(option) = self.get(key) else {
                warn!(plugin, key = %key, "dropping unknown plugin option");
                continue;
            };
            match option.default.coerce_json(raw) {
                Some(value) => {
                    config.values.insert(key.clone(), value);
                }
                None => warn!(
                    plugin,
                    key = %key,
                    expected = option.default.type_name(),
                    "mistyped plugin option, using default"
                ),
            }
        }
        config
    }

    /// Validate one update, returning the typed value.
    pub fn check(&self, plugin: &str, key: &str, raw: &Value) -> Result<ConfigValue, ConfigError> {
        let option = self.get(key).ok_or_else(|| ConfigError::UnknownKey {
            plugin: plugin.to_string(),
            key: key.to_string(),
        })?;
        option
            .default
            .coerce_json(raw)
            .ok_or_else(|| ConfigError::TypeMismatch {
                plugin: plugin.to_string(),
                key: key.to_string(),
                expected: option.default.type_name(),
            })
    }
}

/// Effective configuration of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PluginConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl PluginConfig {
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(ConfigValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Whether the plugin's handlers run. Missing means enabled.
    pub fn is_enabled(&self) -> bool {
        self.get_bool(ENABLED_KEY).unwrap_or(true)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.values.iter()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// The persisted store: one JSON object keyed by plugin id.
///
/// Saves rewrite the whole file. A lock serializes writers in this process.
#[derive(Debug, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Map<String, Value>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store at `path`. A missing file is an empty store; a
    /// malformed one is reset to empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "plugin config is corrupt, resetting");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read plugin config, using defaults");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), plugins = entries.len(), "plugin config loaded");

        Self {
            path: Some(path),
            entries,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, plugin: &str) -> Option<&Map<String, Value>> {
        self.entries.get(plugin)
    }

    /// Replace one plugin's stored values, returning the previous ones.
    pub fn set(&mut self, plugin: &str, values: Map<String, Value>) -> Option<Map<String, Value>> {
        self.entries.insert(plugin.to_string(), values)
    }

    /// Put back what [`ConfigStore::set`] returned.
    pub fn restore(&mut self, plugin: &str, previous: Option<Map<String, Value>>) {
        match previous {
            Some(values) => {
                self.entries.insert(plugin.to_string(), values);
            }
            None => {
                self.entries.remove(plugin);
            }
        }
    }

    /// Write the whole store.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .option("max_depth", ConfigValue::Int(5), "Nesting limit")
            .option(
                "ignore",
                ConfigValue::List(vec!["**/vendor/**".to_string()]),
                "Skipped paths",
            )
    }

    #[test]
    fn test_defaults_include_enabled() {
        let config = schema().defaults();
        assert!(config.is_enabled());
        assert_eq!(config.get_int("max_depth"), Some(5));
        assert_eq!(config.get_list("ignore"), ["**/vendor/**".to_string()]);
        assert_eq!(schema().options()[0].key, ENABLED_KEY);
    }

    #[test]
    fn test_merge_drops_unknown_and_mistyped() {
        let stored = json!({"max_depth": "deep", "ignore": ["a"], "bogus": 1, "enabled": false});
        let config = schema().merge("p", stored.as_object());
        assert_eq!(config.get_int("max_depth"), Some(5));
        assert_eq!(config.get_list("ignore"), ["a".to_string()]);
        assert!(config.get("bogus").is_none());
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_check_rejects_bad_updates() {
        let s = schema();
        assert!(matches!(
            s.check("p", "nope", &json!(1)),
            Err(ConfigError::UnknownKey { .. })
        ));
        assert!(matches!(
            s.check("p", "max_depth", &json!(true)),
            Err(ConfigError::TypeMismatch { expected: "an integer", .. })
        ));
        assert_eq!(s.check("p", "max_depth", &json!(3)).unwrap(), ConfigValue::Int(3));
    }

    #[test]
    fn test_parse_like() {
        assert_eq!(ConfigValue::Bool(true).parse_like("off"), Some(ConfigValue::Bool(false)));
        assert_eq!(ConfigValue::Int(0).parse_like("x"), None);
        assert_eq!(
            ConfigValue::List(vec![]).parse_like("a, b,"),
            Some(ConfigValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_store_round_trip_and_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/plugin_config.json");

        let mut store = ConfigStore::load(&path);
        assert!(store.get("p").is_none());
        store.set("p", json!({"max_depth": 2}).as_object().unwrap().clone());
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path);
        assert_eq!(reloaded.get("p").unwrap()["max_depth"], 2);

        fs::write(&path, "{ not json").unwrap();
        let reset = ConfigStore::load(&path);
        assert!(reset.get("p").is_none());
    }
}
