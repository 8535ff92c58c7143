//! Replication metadata attached to every dispatched record.
//!
//! The metadata travels out-of-band as string properties. The same
//! properties are read back on restart to find where to resume.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Log file the record was read from.
pub const LOG_NAME_PROPERTY: &str = "name";
/// Byte offset of the end of the record's event in the log file.
pub const LOG_POSITION_PROPERTY: &str = "pos";
/// Sequence number of the enclosing transaction.
pub const SEQUENCE_NUMBER_PROPERTY: &str = "seq";
/// Commit time of the enclosing transaction, in Unix nanoseconds.
pub const COMMIT_TIMESTAMP_PROPERTY: &str = "timestamp";
pub const SCHEMA_PROPERTY: &str = "schema";
pub const TABLE_PROPERTY: &str = "table";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationMetadata {
    pub log_file: String,
    pub log_position: u32,
    pub sequence_number: i64,
    pub commit_timestamp: DateTime<Utc>,
}

impl ReplicationMetadata {
    /// Render as delivery properties for a record of `schema`.`table`.
    pub fn properties(&self, schema: &str, table: &str) -> BTreeMap<String, String> {
        let nanos = self.commit_timestamp.timestamp_nanos_opt().unwrap_or_default();
        BTreeMap::from([
            (LOG_NAME_PROPERTY.to_string(), self.log_file.clone()),
            (LOG_POSITION_PROPERTY.to_string(), self.log_position.to_string()),
            (SEQUENCE_NUMBER_PROPERTY.to_string(), self.sequence_number.to_string()),
            (COMMIT_TIMESTAMP_PROPERTY.to_string(), nanos.to_string()),
            (SCHEMA_PROPERTY.to_string(), schema.to_string()),
            (TABLE_PROPERTY.to_string(), table.to_string()),
        ])
    }
}
