//! Delivery-log backed position source.
//!
//! Reads a JSONL delivery log written by [`crate::JsonlFileSink`] and returns
//! the properties of the last message delivered for a stream. The log is
//! scanned backwards from its end, so startup cost depends on how far back
//! the stream's last message is, not on the size of the log.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use checkpoint::{DeliveredProperties, PositionSource, StreamIdentity};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::jsonl::DeliveredMessage;

const READ_CHUNK_SIZE: u64 = 64 * 1024;

pub struct DeliveryLogPositionSource {
    path: PathBuf,
    chunk_size: u64,
}

impl DeliveryLogPositionSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            chunk_size: READ_CHUNK_SIZE,
        }
    }

    /// Returns the properties if `line` is a message of `identity`.
    fn match_line(
        &self,
        line: &[u8],
        offset: u64,
        identity: &StreamIdentity,
    ) -> Option<DeliveredProperties> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let message: DeliveredMessage = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %e,
                    "Skipping unreadable delivery log line"
                );
                return None;
            }
        };
        (message.book == identity.book
            && message.group == identity.group
            && message.alias == identity.alias)
            .then_some(message.properties)
    }
}

#[async_trait]
impl PositionSource for DeliveryLogPositionSource {
    async fn last_delivered(&self, identity: &StreamIdentity) -> Result<Option<DeliveredProperties>> {
        let read_context = || format!("Failed to read delivery log {}", self.path.display());
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(read_context),
        };
        let mut end = file.metadata().await.with_context(read_context)?.len();

        // Start of a line that began before the current chunk.
        let mut carry: Vec<u8> = Vec::new();
        while end > 0 {
            let start = end.saturating_sub(self.chunk_size);
            let mut chunk = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start))
                .await
                .with_context(read_context)?;
            file.read_exact(&mut chunk)
                .await
                .with_context(read_context)?;
            chunk.extend_from_slice(&carry);

            // Unless the chunk starts the file, its first line may be partial.
            let complete_from = if start == 0 {
                0
            } else {
                chunk
                    .iter()
                    .position(|b| *b == b'\n')
                    .map_or(chunk.len(), |newline| newline + 1)
            };

            let mut line_end = chunk.len();
            for line in chunk[complete_from..].split(|b| *b == b'\n').rev() {
                let line_start = line_end - line.len();
                if let Some(properties) = self.match_line(line, start + line_start as u64, identity)
                {
                    return Ok(Some(properties));
                }
                line_end = line_start.saturating_sub(1);
            }

            chunk.truncate(complete_from);
            carry = chunk;
            end = start;
        }
        Ok(None)
    }
}
