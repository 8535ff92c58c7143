//! Replay of pre-decoded replication events from JSONL log files.
//!
//! A directory holds one `<log name>.jsonl` file per binlog file. Log files
//! are read in name order, and offsets are byte offsets into them, so a
//! position recorded while replaying can be resumed exactly like a binlog
//! position. Each line is one event:
//!
//! ```text
//! {"type":"gtid","sequence_number":7,"commit_timestamp":"2024-06-15T10:30:00Z"}
//! {"type":"rows","schema":"shop","table":"users","kind":"insert","rows":[[1,"alice",null]]}
//! {"type":"query","schema":"shop","query":"TRUNCATE TABLE users"}
//! ```
//!
//! Row values are JSON scalars; `{"base64":"..."}` encodes raw bytes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use checkpoint::{
    BinlogPosition, ServerError, MISSING_LOG_FILE_MESSAGE, OFFSET_BEYOND_FILE_SIZE_MESSAGE,
    POSITION_NOT_FOUND_CODE,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sync_core::RowValue;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::debug;

use crate::event::{EventSource, ReplicationEvent, RowsKind, StreamError};

const LOG_EXTENSION: &str = "jsonl";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogEntry {
    Rows {
        schema: String,
        table: String,
        kind: RowsKind,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Query {
        #[serde(default)]
        schema: String,
        query: String,
    },
    Gtid {
        sequence_number: i64,
        commit_timestamp: DateTime<Utc>,
    },
}

impl LogEntry {
    fn into_event(self, log_position: u32) -> Result<ReplicationEvent> {
        Ok(match self {
            LogEntry::Rows {
                schema,
                table,
                kind,
                rows,
            } => ReplicationEvent::Rows {
                schema,
                table,
                kind,
                rows: rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(row_value_from_json)
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<_>>()?,
                log_position,
            },
            LogEntry::Query { schema, query } => ReplicationEvent::Query {
                schema,
                query,
                log_position,
            },
            LogEntry::Gtid {
                sequence_number,
                commit_timestamp,
            } => ReplicationEvent::Gtid {
                sequence_number,
                commit_timestamp,
            },
        })
    }
}

/// Convert a JSON scalar to a row value.
fn row_value_from_json(value: serde_json::Value) -> Result<RowValue> {
    use serde_json::Value;

    match value {
        Value::Null => Ok(RowValue::Null),
        Value::Bool(b) => Ok(RowValue::Int(i64::from(b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(RowValue::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(RowValue::UInt(u))
            } else {
                n.as_f64()
                    .map(RowValue::Float)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported number: {n}"))
            }
        }
        Value::String(s) => Ok(RowValue::String(s)),
        Value::Object(map) => match map.get("base64").and_then(Value::as_str) {
            Some(encoded) if map.len() == 1 => STANDARD
                .decode(encoded)
                .map(RowValue::Bytes)
                .context("Invalid base64 row value"),
            _ => anyhow::bail!(
                "Unsupported row value object with keys {:?}",
                map.keys().collect::<Vec<_>>()
            ),
        },
        Value::Array(items) => {
            anyhow::bail!("Unsupported array row value of {} items", items.len())
        }
    }
}

struct OpenLog {
    name: String,
    reader: BufReader<File>,
    offset: u64,
}

/// Event source replaying a directory of JSONL log files.
pub struct JsonlEventSource {
    dir: PathBuf,
    files: Vec<String>,
    next_file: usize,
    current: Option<OpenLog>,
    pending_rotate: Option<String>,
}

impl JsonlEventSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            next_file: 0,
            current: None,
            pending_rotate: None,
        }
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOG_EXTENSION}"))
    }

    async fn list_logs(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read log directory {}", self.dir.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open(&mut self, index: usize, offset: u64) -> Result<(), StreamError> {
        let name = self.files[index].clone();
        let path = self.log_path(&name);
        let mut file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let size = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat log file {}", path.display()))?
            .len();
        if offset > size {
            return Err(ServerError::new(
                POSITION_NOT_FOUND_CODE,
                format!(
                    "{OFFSET_BEYOND_FILE_SIZE_MESSAGE}; the first event '{name}' at {offset}"
                ),
            )
            .into());
        }
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .with_context(|| format!("Failed to seek {} to {offset}", path.display()))?;

        debug!(log_file = %name, offset, "Opened log file");
        self.current = Some(OpenLog {
            name: name.clone(),
            reader: BufReader::new(file),
            offset,
        });
        self.pending_rotate = Some(name);
        self.next_file = index + 1;
        Ok(())
    }
}

#[async_trait]
impl EventSource for JsonlEventSource {
    async fn start(&mut self, position: &BinlogPosition) -> Result<(), StreamError> {
        self.files = self.list_logs().await?;
        self.current = None;
        self.pending_rotate = None;
        self.next_file = self.files.len();

        if position.log_file.is_empty() {
            if self.files.is_empty() {
                return Ok(());
            }
            return self.open(0, u64::from(position.offset)).await;
        }

        let index = self
            .files
            .iter()
            .position(|f| *f == position.log_file)
            .ok_or_else(|| ServerError::new(POSITION_NOT_FOUND_CODE, MISSING_LOG_FILE_MESSAGE))?;
        self.open(index, u64::from(position.offset)).await
    }

    async fn next_event(&mut self) -> Result<Option<ReplicationEvent>, StreamError> {
        loop {
            if let Some(next_log_file) = self.pending_rotate.take() {
                return Ok(Some(ReplicationEvent::Rotate { next_log_file }));
            }
            let Some(log) = self.current.as_mut() else {
                return Ok(None);
            };

            let mut line = String::new();
            let read = log
                .reader
                .read_line(&mut line)
                .await
                .with_context(|| format!("Failed to read log file {}", log.name))?;
            if read == 0 {
                self.current = None;
                if self.next_file < self.files.len() {
                    self.open(self.next_file, 0).await?;
                }
                continue;
            }

            log.offset += read as u64;
            if line.trim().is_empty() {
                continue;
            }
            let log_position = u32::try_from(log.offset)
                .with_context(|| format!("Offset {} of {} exceeds u32", log.offset, log.name))?;
            let entry: LogEntry = serde_json::from_str(&line)
                .with_context(|| format!("Invalid event at {}:{}", log.name, log_position))?;
            let event = entry
                .into_event(log_position)
                .with_context(|| format!("Invalid event at {}:{}", log.name, log_position))?;
            return Ok(Some(event));
        }
    }
}
