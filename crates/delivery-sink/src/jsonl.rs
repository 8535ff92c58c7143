//! JSONL delivery sinks.
//!
//! Each delivered message becomes one JSON line carrying the stream identity,
//! the message arguments and the payload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::trace;

use crate::traits::{DeliverySink, Direction, MessageArguments};

/// One line of a delivery log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub book: String,
    pub group: String,
    pub alias: String,
    pub protocol: String,
    pub direction: Direction,
    pub properties: BTreeMap<String, String>,
    /// Payload text (a serialized record).
    pub payload: String,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveredMessage {
    fn new(book: &str, group: &str, payload: Vec<u8>, args: MessageArguments) -> Result<Self> {
        let payload = String::from_utf8(payload).context("Payload is not valid UTF-8")?;
        Ok(Self {
            book: book.to_string(),
            group: group.to_string(),
            alias: args.alias,
            protocol: args.protocol,
            direction: args.direction,
            properties: args.properties,
            payload,
            delivered_at: Utc::now(),
        })
    }

    fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).context("Failed to serialize message")?;
        line.push('\n');
        Ok(line)
    }
}

/// Appends messages to a JSONL file.
///
/// The file doubles as the delivery history read back by
/// [`crate::DeliveryLogPositionSource`].
pub struct JsonlFileSink {
    path: PathBuf,
    book: String,
    group: String,
    file: Mutex<File>,
}

impl JsonlFileSink {
    /// Open `path` for appending, creating it (and its parent directory) if needed.
    pub async fn open(
        path: impl AsRef<Path>,
        book: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open delivery log {}", path.display()))?;
        Ok(Self {
            path,
            book: book.into(),
            group: group.into(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl DeliverySink for JsonlFileSink {
    async fn send(&self, payload: Vec<u8>, args: MessageArguments) -> Result<()> {
        let line = DeliveredMessage::new(&self.book, &self.group, payload, args)?.to_line()?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        trace!(path = %self.path.display(), "Message is written to delivery log");
        Ok(())
    }
}

/// Prints messages to standard output, one JSON line each.
pub struct StdoutSink {
    book: String,
    group: String,
    stdout: Mutex<tokio::io::Stdout>,
}

impl StdoutSink {
    pub fn new(book: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            book: book.into(),
            group: group.into(),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait::async_trait]
impl DeliverySink for StdoutSink {
    async fn send(&self, payload: Vec<u8>, args: MessageArguments) -> Result<()> {
        let line = DeliveredMessage::new(&self.book, &self.group, payload, args)?.to_line()?;
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
        Ok(())
    }
}
