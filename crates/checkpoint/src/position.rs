//! Binlog stream position.

use serde::{Deserialize, Serialize};

use crate::Checkpoint;

/// A position in the replication log: log file name plus byte offset.
///
/// An empty `log_file` means "from the beginning of the first available log".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogPosition {
    pub log_file: String,
    pub offset: u32,
}

impl BinlogPosition {
    pub fn new(log_file: impl Into<String>, offset: u32) -> Self {
        Self {
            log_file: log_file.into(),
            offset,
        }
    }

    /// Position that replays everything the upstream still has.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Start of the given log file.
    pub fn start_of(log_file: impl Into<String>) -> Self {
        Self::new(log_file, 0)
    }

    pub fn is_initial(&self) -> bool {
        self.log_file.is_empty() && self.offset == 0
    }
}

impl std::fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.log_file, self.offset)
    }
}

impl Checkpoint for BinlogPosition {
    const DATABASE_TYPE: &'static str = "mysql-binlog";

    fn to_cli_string(&self) -> String {
        self.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let (log_file, offset) = s.rsplit_once(':').ok_or_else(|| {
            anyhow::anyhow!("Invalid binlog position: expected 'file:offset', got '{s}'")
        })?;
        let offset = offset.parse::<u32>().map_err(|e| {
            anyhow::anyhow!("Invalid binlog position offset: expected number, got '{offset}': {e}")
        })?;
        Ok(Self::new(log_file, offset))
    }
}
