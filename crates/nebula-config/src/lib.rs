//! Layered environment-then-file configuration loading.
//!
//! Both the server (`GlobalSettings` boot defaults) and the agent (its
//! `SERVER_URL`/`CLIENT_TOKEN`/... surface) load configuration the same way:
//! a [`ConfigSource::File`] provides defaults, a [`ConfigSource::Env`] layer
//! overrides individual keys. Env always wins over file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nebula_error::{NebulaError, Result};
use serde::de::DeserializeOwned;

/// Where a configuration value may come from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A single environment variable.
    Env(String),
    /// A TOML or YAML file on disk.
    File(PathBuf),
}

/// A layered key/value configuration, built by merging sources in order.
///
/// Later sources override earlier ones. This mirrors the common env-over-file
/// precedence used by the agent's `AgentConfig::load`.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Start an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge in a file (TOML or YAML, inferred from extension) as the
    /// lowest-precedence layer so far.
    pub fn merge_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let table: HashMap<String, String> = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            _ => toml::from_str(&contents)
                .map_err(|e| NebulaError::validation(format!("invalid config file: {e}")))?,
        };
        self.values.extend(table);
        Ok(self)
    }

    /// Merge in an optional file: missing files are silently skipped, since
    /// both the server and agent run fine on defaults alone.
    pub fn merge_file_if_exists(self, path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() { self.merge_file(path) } else { Ok(self) }
    }

    /// Override a single key from an environment variable, if it's set.
    #[must_use]
    pub fn merge_env(mut self, key: &str, env_var: &str) -> Self {
        if let Ok(value) = std::env::var(env_var) {
            self.values.insert(key.to_string(), value);
        }
        self
    }

    /// Look up a raw string value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a value and require it to be present.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| NebulaError::validation(format!("missing config key: {key}")))
    }

    /// Parse a value via `FromStr`, falling back to `default` if the key is
    /// absent.
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.values.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| NebulaError::validation(format!("invalid value for {key}: {e}"))),
            None => Ok(default),
        }
    }

    /// Deserialize the whole table into a typed struct via `serde`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let json = serde_json::to_value(&self.values)?;
        serde_json::from_value(json)
            .map_err(|e| NebulaError::validation(format!("config deserialization failed: {e}")))
    }
}
