//! Event pipeline
//!
//! Turns replication events into records and dispatches them, strictly in
//! arrival order:
//!
//! ```text
//! ReplicationEvent → column resolution → Record → JSON payload + position properties → DeliverySink
//! ```
//!
//! Position markers (rotate, GTID) only update the metadata attached to the
//! records that follow them.

use std::sync::Arc;

use anyhow::{Context, Result};
use checkpoint::{BinlogPosition, ReplicationMetadata};
use chrono::{DateTime, Utc};
use delivery_sink::{DeliverySink, MessageArguments};
use mysql_types::classify;
use sync_core::{Record, RowValue};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::event::{EventSource, ReplicationEvent, RowsKind, StreamError};
use crate::schema::{SchemaCache, SchemaCacheError, SchemaFilter};

/// Pipeline options
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Alias attached to every dispatched message
    pub alias: String,
    /// Tables whose row events are replicated
    pub filter: SchemaFilter,
    /// Drop statements the classifier does not recognise
    pub skip_unknown_statements: bool,
    /// Split insert/delete records whose estimated size exceeds this many bytes
    pub max_payload_bytes: Option<usize>,
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Messages handed to the sink
    pub dispatched: u64,
    /// Events skipped by the filter or for missing metadata
    pub skipped: u64,
    /// Rotate and GTID events
    pub markers: u64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
struct StreamState {
    log_file: String,
    sequence_number: i64,
    commit_timestamp: DateTime<Utc>,
}

pub struct Pipeline<S: DeliverySink> {
    cache: Arc<SchemaCache>,
    sink: S,
    config: PipelineConfig,
    state: StreamState,
    stats: PipelineStats,
}

impl<S: DeliverySink> Pipeline<S> {
    pub fn new(cache: Arc<SchemaCache>, sink: S, config: PipelineConfig) -> Self {
        Self {
            cache,
            sink,
            config,
            state: StreamState {
                log_file: String::new(),
                sequence_number: 0,
                commit_timestamp: DateTime::<Utc>::default(),
            },
            stats: PipelineStats::default(),
        }
    }

    /// Reset the current log file before streaming from `position`.
    pub fn begin(&mut self, position: &BinlogPosition) {
        self.state.log_file = position.log_file.clone();
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume `source` until it is exhausted or `cancel` fires.
    ///
    /// Cancellation is observed between events; an event being processed is
    /// always finished.
    pub async fn run<E>(
        &mut self,
        source: &mut E,
        cancel: &CancellationToken,
    ) -> Result<PipelineStats, PipelineError>
    where
        E: EventSource + ?Sized,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping pipeline");
                    break;
                }
                next = source.next_event() => next?,
            };
            let Some(event) = next else {
                info!("Replication stream exhausted");
                break;
            };
            self.process_event(event).await?;
        }
        Ok(self.stats)
    }

    /// Process a single event.
    pub async fn process_event(&mut self, event: ReplicationEvent) -> Result<()> {
        debug!(?event, "Read event");
        match event {
            ReplicationEvent::Rows {
                schema,
                table,
                kind,
                rows,
                log_position,
            } => {
                self.process_rows(schema, table, kind, rows, log_position)
                    .await
            }
            ReplicationEvent::Query {
                schema,
                query,
                log_position,
            } => self.process_query(schema, query, log_position).await,
            ReplicationEvent::Gtid {
                sequence_number,
                commit_timestamp,
            } => {
                self.state.sequence_number = sequence_number;
                self.state.commit_timestamp = commit_timestamp;
                self.stats.markers += 1;
                Ok(())
            }
            ReplicationEvent::Rotate { next_log_file } => {
                debug!(log_file = %next_log_file, "Rotated to log file");
                self.state.log_file = next_log_file;
                self.stats.markers += 1;
                Ok(())
            }
        }
    }

    async fn process_rows(
        &mut self,
        schema: String,
        table: String,
        kind: RowsKind,
        rows: Vec<Vec<RowValue>>,
        log_position: u32,
    ) -> Result<()> {
        if !self.config.filter.allows(&schema, &table) {
            trace!(%schema, %table, "Event skipped, table not configured");
            self.stats.skipped += 1;
            return Ok(());
        }

        let columns = match self.cache.resolve_columns(&schema, &table).await {
            Ok(columns) => columns,
            Err(SchemaCacheError::TableMetadataUnavailable { .. }) => {
                trace!(%schema, %table, "Event skipped");
                self.stats.skipped += 1;
                return Ok(());
            }
            Err(SchemaCacheError::Lookup { source, .. }) => {
                debug!(%schema, %table, error = %source, "Event skipped, column lookup failed");
                self.stats.skipped += 1;
                return Ok(());
            }
        };

        let context = self.failure_context(&schema, &table, log_position);
        let record = match kind {
            RowsKind::Insert => Record::insert(schema, table, &columns, rows),
            RowsKind::Update => Record::update(schema, table, &columns, rows),
            RowsKind::Delete => Record::delete(schema, table, &columns, rows),
        }
        .context(context)?;

        self.dispatch(record, log_position).await
    }

    async fn process_query(&mut self, schema: String, query: String, log_position: u32) -> Result<()> {
        let classification = classify(&query);
        if self.config.skip_unknown_statements && !classification.is_known() {
            trace!(%schema, %query, "Statement skipped");
            self.stats.skipped += 1;
            return Ok(());
        }

        let schema = if schema.is_empty() {
            classification.schema
        } else {
            schema
        };
        let record = Record::statement(schema, classification.table, query, classification.operation);
        self.dispatch(record, log_position).await
    }

    async fn dispatch(&mut self, record: Record, log_position: u32) -> Result<()> {
        let metadata = ReplicationMetadata {
            log_file: self.state.log_file.clone(),
            log_position,
            sequence_number: self.state.sequence_number,
            commit_timestamp: self.state.commit_timestamp,
        };

        let parts = match self.config.max_payload_bytes {
            Some(max) if record.size_bytes() > max => {
                let parts = record.split(max);
                debug!(
                    parts = parts.len(),
                    estimated = record.size_bytes(),
                    max,
                    "Split oversized record"
                );
                parts
            }
            _ => vec![record],
        };

        for part in parts {
            let header = part.header();
            let context = || self.failure_context(&header.schema, &header.table, log_position);
            let payload = part.to_json().with_context(context)?;
            let properties = metadata.properties(&header.schema, &header.table);
            self.sink
                .send(payload, MessageArguments::json(&self.config.alias, properties))
                .await
                .with_context(context)?;
            trace!(schema = %header.schema, table = %header.table, operation = %header.operation, "Message is sent to sink");
            self.stats.dispatched += 1;
        }
        Ok(())
    }

    fn failure_context(&self, schema: &str, table: &str, log_position: u32) -> String {
        format!(
            "Failed to process event for {schema}.{table} at {}:{log_position}",
            self.state.log_file
        )
    }
}
