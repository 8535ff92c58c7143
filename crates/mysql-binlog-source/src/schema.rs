//! Table column metadata
//!
//! Row events carry positional values only. This module resolves
//! (schema, table) to the table's ordered column names, loading them once
//! from a `ColumnSource` and memoizing them for the lifetime of the cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::Pool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Ordered column names of a table.
pub const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

/// Source of table column names, ordered by ordinal position.
#[async_trait]
pub trait ColumnSource: Send + Sync {
    /// Load the column names of `schema`.`table`.
    ///
    /// Returns an empty list for unknown tables.
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<String>>;
}

/// Column source backed by MySQL's `INFORMATION_SCHEMA`.
pub struct MySqlColumnSource {
    pool: Pool,
}

impl MySqlColumnSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a source from a MySQL connection URI.
    pub fn from_url(uri: &str) -> Result<Self> {
        let pool = Pool::from_url(uri)
            .map_err(|e| anyhow::anyhow!("Failed to create MySQL pool from URI: {e}"))?;
        Ok(Self::new(pool))
    }

    /// Close all pooled connections.
    pub async fn disconnect(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .context("Failed to disconnect MySQL pool")
    }
}

#[async_trait]
impl ColumnSource for MySqlColumnSource {
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .context("Failed to get MySQL connection")?;
        let columns: Vec<String> = conn
            .exec(COLUMNS_QUERY, (schema, table))
            .await
            .with_context(|| format!("Failed to load columns of {schema}.{table}"))?;
        Ok(columns)
    }
}

/// Column source with fixed column lists, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticColumnSource {
    tables: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StaticColumnSource {
    pub fn new(tables: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        Self { tables }
    }

    pub fn with_table(
        mut self,
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.tables
            .entry(schema.into())
            .or_default()
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl ColumnSource for StaticColumnSource {
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .get(schema)
            .and_then(|tables| tables.get(table))
            .cloned()
            .unwrap_or_default())
    }
}

/// Which tables are replicated.
///
/// Maps schema name to table names. A schema with no tables listed admits all
/// of its tables; an empty filter admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaFilter(BTreeMap<String, BTreeSet<String>>);

impl SchemaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(
        mut self,
        schema: impl Into<String>,
        tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.0
            .entry(schema.into())
            .or_default()
            .extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether events for `schema`.`table` should be replicated.
    pub fn allows(&self, schema: &str, table: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        match self.0.get(schema) {
            Some(tables) => tables.is_empty() || tables.contains(table),
            None => false,
        }
    }

    /// Iterate over configured schemas and their listed tables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Vec<String>>> for SchemaFilter {
    fn from(schemas: BTreeMap<String, Vec<String>>) -> Self {
        Self(
            schemas
                .into_iter()
                .map(|(schema, tables)| (schema, tables.into_iter().collect()))
                .collect(),
        )
    }
}

#[derive(Debug, Error)]
pub enum SchemaCacheError {
    #[error("No column metadata for table {schema}.{table}")]
    TableMetadataUnavailable { schema: String, table: String },

    #[error("Failed to look up columns of {schema}.{table}")]
    Lookup {
        schema: String,
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

type TableColumns = HashMap<String, HashMap<String, Arc<[String]>>>;

/// Memoizing resolver from (schema, table) to ordered column names.
///
/// Entries are never invalidated: a table altered while the process runs keeps
/// its original column list until restart.
pub struct SchemaCache {
    source: Box<dyn ColumnSource>,
    schemas: RwLock<TableColumns>,
}

impl SchemaCache {
    pub fn new(source: impl ColumnSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the ordered column names of `schema`.`table`.
    ///
    /// The first successful resolution is memoized; later calls return the
    /// same list without querying the source again.
    pub async fn resolve_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Arc<[String]>, SchemaCacheError> {
        {
            let schemas = self.schemas.read().await;
            if let Some(columns) = schemas.get(schema).and_then(|tables| tables.get(table)) {
                return Ok(Arc::clone(columns));
            }
        }

        let columns = self.source.load_columns(schema, table).await.map_err(|e| {
            SchemaCacheError::Lookup {
                schema: schema.to_string(),
                table: table.to_string(),
                source: e.into(),
            }
        })?;
        if columns.is_empty() {
            return Err(SchemaCacheError::TableMetadataUnavailable {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }

        let mut schemas = self.schemas.write().await;
        let columns = schemas
            .entry(schema.to_string())
            .or_default()
            .entry(table.to_string())
            .or_insert_with(|| Arc::from(columns));
        debug!(schema, table, columns = ?columns, "Loaded table metadata");
        Ok(Arc::clone(columns))
    }

    /// Resolve every table listed in `filter`.
    ///
    /// Fails if a listed table has no metadata. Schemas listed without tables
    /// are resolved lazily.
    pub async fn preload(&self, filter: &SchemaFilter) -> Result<()> {
        for (schema, tables) in filter.iter() {
            for table in tables {
                self.resolve_columns(schema, table)
                    .await
                    .with_context(|| format!("Failed to preload metadata of {schema}.{table}"))?;
            }
        }
        info!(tables = self.cached_tables().await.len(), "Preloaded table metadata");
        Ok(())
    }

    /// Tables with memoized metadata, sorted.
    pub async fn cached_tables(&self) -> Vec<(String, String)> {
        let schemas = self.schemas.read().await;
        let mut tables: Vec<(String, String)> = schemas
            .iter()
            .flat_map(|(schema, tables)| {
                tables
                    .keys()
                    .map(move |table| (schema.clone(), table.clone()))
            })
            .collect();
        tables.sort();
        tables
    }
}
