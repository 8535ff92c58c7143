//! TOML configuration file.
//!
//! # Configuration Format
//!
//! ```toml
//! # Tables whose row events are replicated. An empty list admits every
//! # table of the schema; omitting the section admits everything.
//! [schemas]
//! shop = ["users", "orders"]
//! audit = []
//!
//! # Column names per table, used when no MySQL connection is configured.
//! [columns.shop]
//! users = ["id", "name", "email"]
//! orders = ["id", "user_id", "total"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use mysql_binlog_source::{SchemaFilter, StaticColumnSource};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Schema name to replicated table names
    #[serde(default)]
    pub schemas: BTreeMap<String, Vec<String>>,

    /// Schema name to table name to ordered column names
    #[serde(default)]
    pub columns: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn schema_filter(&self) -> SchemaFilter {
        SchemaFilter::from(self.schemas.clone())
    }

    pub fn column_source(&self) -> StaticColumnSource {
        StaticColumnSource::new(self.columns.clone())
    }
}

/// Load the config file if provided, otherwise the empty configuration.
pub fn load_config_if_provided(path: &Option<PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => Ok(AppConfig::default()),
    }
}
