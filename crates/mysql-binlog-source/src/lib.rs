//! MySQL binlog change capture for binlog-sync
//!
//! Turns replication events into delivery messages.
//!
//! # Architecture
//!
//! - `EventSource` - yields `ReplicationEvent`s from a start position
//! - `SchemaCache` - memoized (schema, table) to column names resolution
//! - `Pipeline` - builds records from events and dispatches them to a `DeliverySink`
//! - `run_with_recovery` - resumes from the tracked position and restarts once
//!   when the upstream rejects it
//!
//! ## Event Sources
//!
//! - `JsonlEventSource` - replays pre-decoded events from JSONL log files
//!
//! ## Column Sources
//!
//! - `MySqlColumnSource` - `INFORMATION_SCHEMA.COLUMNS`
//! - `StaticColumnSource` - fixed column lists

mod event;
mod jsonl;
mod pipeline;
mod runner;
mod schema;

pub use event::{EventSource, ReplicationEvent, RowsKind, StreamError};
pub use jsonl::JsonlEventSource;
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineStats};
pub use runner::run_with_recovery;
pub use schema::{
    ColumnSource, MySqlColumnSource, SchemaCache, SchemaCacheError, SchemaFilter,
    StaticColumnSource, COLUMNS_QUERY,
};
