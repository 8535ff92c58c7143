//! Stream position management for binlog-sync
//!
//! Decides where the replication stream starts and how it restarts after the
//! upstream rejects a position.
//!
//! # Architecture
//!
//! - Defines the `Checkpoint` trait for CLI-friendly position types
//! - `BinlogPosition` - log file name plus byte offset
//! - `ReplicationMetadata` - position properties attached to every delivered record
//! - `PositionSource` - looks up the properties of the last delivered record
//! - `PositionTracker` - resume and recovery state machine
//!
//! ## Position Sources
//!
//! - `NullPositionSource` - no delivery history, always start from the beginning
//! - `DeliveryLogPositionSource` - reads a JSONL delivery log (in the delivery-sink crate)

mod metadata;
mod position;
pub mod store;
mod tracker;

pub use metadata::{
    ReplicationMetadata, COMMIT_TIMESTAMP_PROPERTY, LOG_NAME_PROPERTY, LOG_POSITION_PROPERTY,
    SCHEMA_PROPERTY, SEQUENCE_NUMBER_PROPERTY, TABLE_PROPERTY,
};
pub use position::BinlogPosition;
pub use store::{DeliveredProperties, NullPositionSource, PositionSource, StreamIdentity};
pub use tracker::{
    position_from_properties, recovery_position, PositionTracker, ServerError, TrackerState,
    DEFAULT_LOOKUP_TIMEOUT, MISSING_LOG_FILE_MESSAGE, OFFSET_BEYOND_FILE_SIZE_MESSAGE,
    POSITION_NOT_FOUND_CODE,
};

/// Trait that stream position types must implement.
///
/// Positions are passed on the command line (e.g. `--start-from`) and
/// printed in logs, so each type defines a round-trippable string form.
///
/// # Example
///
/// ```rust
/// use checkpoint::{BinlogPosition, Checkpoint};
///
/// let position = BinlogPosition::from_cli_string("mysql-bin.000003:4").unwrap();
/// assert_eq!(position.log_file, "mysql-bin.000003");
/// assert_eq!(position.offset, 4);
/// assert_eq!(position.to_cli_string(), "mysql-bin.000003:4");
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Database type identifier (e.g., "mysql-binlog").
    const DATABASE_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    ///
    /// Should parse the format produced by `to_cli_string()`.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
