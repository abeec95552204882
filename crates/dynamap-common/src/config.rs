//! Configuration management for dynamap

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration structure for dynamap
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Network client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Table naming configuration
    #[serde(default)]
    pub tables: TablesConfig,
}

impl Config {
    /// Load configuration from a TOML or JSON file, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            Self::from_toml_str(&content)
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Resolve the physical table name for a model's declared table name
    #[must_use]
    pub fn table_name(&self, base: &str) -> String {
        match &self.tables.prefix {
            Some(prefix) => format!("{}{}", prefix, base),
            None => base.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Region passed to whatever builds the network client
    pub region: Option<String>,
    /// Endpoint override (e.g. a local emulator)
    pub endpoint: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TablesConfig {
    /// Prefix prepended to every model's table name
    pub prefix: Option<String>,
}
