//! Stream position tracking and recovery.
//!
//! The tracker decides where the replication stream starts: from an explicit
//! override, or from the position recorded in the properties of the last
//! delivered record. When the upstream rejects a position it decides whether
//! and where the stream may restart.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::metadata::{LOG_NAME_PROPERTY, LOG_POSITION_PROPERTY};
use crate::position::BinlogPosition;
use crate::store::{DeliveredProperties, PositionSource, StreamIdentity};

/// Server error code for "requested position not found".
pub const POSITION_NOT_FOUND_CODE: u16 = 1236;

/// 1236 reason when the requested log file no longer exists.
pub const MISSING_LOG_FILE_MESSAGE: &str =
    "Could not find first log file name in binary log index file";

/// 1236 reason when the requested offset is past the end of the log file.
pub const OFFSET_BEYOND_FILE_SIZE_MESSAGE: &str =
    "Client requested source to start replication from position > file size";

/// Default bound on the last-delivered lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Protocol-level error reported by the replication server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u16,
    pub message: String,
}

impl ServerError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_position_not_found(&self) -> bool {
        self.code == POSITION_NOT_FOUND_CODE
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

/// Position to restart from after `error` rejected `failed`, if any.
///
/// Only "position not found" errors are recoverable:
/// - missing log file: restart from scratch
/// - offset beyond the file size: restart at the start of the same file
/// - any other reason: restart from scratch
pub fn recovery_position(failed: &BinlogPosition, error: &ServerError) -> Option<BinlogPosition> {
    if !error.is_position_not_found() {
        return None;
    }
    if error.message.contains(MISSING_LOG_FILE_MESSAGE) {
        Some(BinlogPosition::initial())
    } else if error.message.contains(OFFSET_BEYOND_FILE_SIZE_MESSAGE) {
        Some(BinlogPosition::start_of(failed.log_file.clone()))
    } else {
        Some(BinlogPosition::initial())
    }
}

/// Extract the resume position from delivered record properties.
///
/// A missing log name means the position cannot be trusted at all; a missing
/// or malformed offset falls back to the start of the named file.
pub fn position_from_properties(properties: &DeliveredProperties) -> BinlogPosition {
    let Some(log_file) = properties.get(LOG_NAME_PROPERTY) else {
        warn!(
            target_property = LOG_NAME_PROPERTY,
            ?properties,
            "Required property isn't found, starting from the beginning"
        );
        return BinlogPosition::initial();
    };

    match properties.get(LOG_POSITION_PROPERTY).map(|p| p.parse::<u32>()) {
        Some(Ok(offset)) => BinlogPosition::new(log_file.clone(), offset),
        Some(Err(e)) => {
            warn!(
                target_property = LOG_POSITION_PROPERTY,
                value = %properties[LOG_POSITION_PROPERTY],
                error = %e,
                "Log position has incorrect format, starting from the beginning of {log_file}"
            );
            BinlogPosition::start_of(log_file.clone())
        }
        None => {
            warn!(
                target_property = LOG_POSITION_PROPERTY,
                ?properties,
                "Required property isn't found, starting from the beginning of {log_file}"
            );
            BinlogPosition::start_of(log_file.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// No position decided yet.
    Resuming,
    /// Streaming from `position`.
    Streaming { position: BinlogPosition },
}

/// Decides the stream start position and applies recovery rules.
pub struct PositionTracker<P> {
    source: P,
    identity: StreamIdentity,
    lookup_timeout: Duration,
    start_override: Option<BinlogPosition>,
    state: TrackerState,
}

impl<P: PositionSource> PositionTracker<P> {
    pub fn new(source: P, identity: StreamIdentity) -> Self {
        Self {
            source,
            identity,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            start_override: None,
            state: TrackerState::Resuming,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Start from `position` instead of looking up the last delivered record.
    pub fn with_start_override(mut self, position: Option<BinlogPosition>) -> Self {
        self.start_override = position;
        self
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Resolve the position to start streaming from.
    ///
    /// A lookup that does not finish within the timeout is treated as "no
    /// previous delivery". A lookup that fails is an error.
    pub async fn resume(&mut self) -> Result<BinlogPosition> {
        let position = match self.start_override.take() {
            Some(position) => {
                info!(%position, "Starting from explicit position");
                position
            }
            None => self.lookup().await?,
        };
        self.state = TrackerState::Streaming {
            position: position.clone(),
        };
        Ok(position)
    }

    async fn lookup(&self) -> Result<BinlogPosition> {
        let lookup = self.source.last_delivered(&self.identity);
        let delivered = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result.with_context(|| {
                format!("Failed to load last delivered record for {}", self.identity)
            })?,
            Err(_) => {
                warn!(
                    stream = %self.identity,
                    timeout = ?self.lookup_timeout,
                    "Timed out loading last delivered record, starting from the beginning"
                );
                None
            }
        };

        match delivered {
            Some(properties) => {
                let position = position_from_properties(&properties);
                info!(stream = %self.identity, %position, "Loaded previous state");
                Ok(position)
            }
            None => {
                info!(stream = %self.identity, "No previous messages");
                Ok(BinlogPosition::initial())
            }
        }
    }

    /// Apply the recovery rules to a server error raised while streaming.
    ///
    /// Returns the position to restart from, or None if the error is not
    /// recoverable.
    pub fn recover(&mut self, error: &ServerError) -> Option<BinlogPosition> {
        let failed = match &self.state {
            TrackerState::Streaming { position } => position.clone(),
            TrackerState::Resuming => BinlogPosition::initial(),
        };
        let position = recovery_position(&failed, error)?;
        warn!(
            %failed,
            restart = %position,
            code = error.code,
            message = %error.message,
            "Upstream rejected stream position, restarting"
        );
        self.state = TrackerState::Streaming {
            position: position.clone(),
        };
        Some(position)
    }
}
