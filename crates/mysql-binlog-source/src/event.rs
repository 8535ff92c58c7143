//! Upstream replication events and the source trait that yields them.

use async_trait::async_trait;
use checkpoint::{BinlogPosition, ServerError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sync_core::RowValue;
use thiserror::Error;

/// Kind of row mutation carried by a rows event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowsKind {
    Insert,
    Update,
    Delete,
}

/// One event read from the replication stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// Row mutations of one table. For updates, rows alternate before and
    /// after images.
    Rows {
        schema: String,
        table: String,
        kind: RowsKind,
        rows: Vec<Vec<RowValue>>,
        /// Offset just past this event in the current log file.
        log_position: u32,
    },
    /// A raw SQL statement.
    Query {
        schema: String,
        query: String,
        log_position: u32,
    },
    /// Start of a transaction.
    Gtid {
        sequence_number: i64,
        commit_timestamp: DateTime<Utc>,
    },
    /// Switch to another log file.
    Rotate { next_log_file: String },
}

#[derive(Debug, Error)]
pub enum StreamError {
    /// The server rejected the request, e.g. an unknown start position.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Anything else: I/O, decoding, connection loss.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Source of replication events.
#[async_trait]
pub trait EventSource: Send {
    /// Start (or restart) streaming from `position`.
    async fn start(&mut self, position: &BinlogPosition) -> Result<(), StreamError>;

    /// Get the next event. Returns None when the stream is exhausted.
    async fn next_event(&mut self) -> Result<Option<ReplicationEvent>, StreamError>;
}
