//! binlog-sync Library
//!
//! Streams MySQL replication events into delivery messages: one JSON record
//! per row event or statement, tagged with the binlog position it came from.
//!
//! # Features
//!
//! - Row events become Insert/Update/Delete records keyed by column name
//! - Table DDL statements are classified (CREATE/ALTER/DROP/TRUNCATE)
//! - Every message carries its log file, offset, sequence number and commit time
//! - Restarts resume after the last delivered message
//! - A rejected start position is recovered once (missing log file, offset past end)
//!
//! # Crates
//!
//! - `sync_core` - record model, size estimation and splitting
//! - `mysql_types` - statement classifier
//! - `checkpoint` - binlog positions, resume and recovery
//! - `delivery_sink` - outbound sinks and the delivery log
//! - `mysql_binlog_source` - event sources, schema cache and the event pipeline
//!
//! # CLI Usage
//!
//! ```bash
//! # Replay a directory of decoded binlog files into a delivery log
//! binlog-sync run --events-dir ./binlog --config binlog-sync.toml \
//!   --book prod --group mysql --alias orders
//!
//! # Classify a statement
//! binlog-sync classify "ALTER TABLE shop.users ADD COLUMN age INT"
//! ```

use std::path::PathBuf;

use clap::Parser;
use delivery_sink::SinkKind;

pub mod config;
mod run;

pub use run::{resume_position, run_sync};

/// Where replication events and table metadata come from
#[derive(Parser, Clone, Debug)]
pub struct SourceOpts {
    /// Directory of JSONL binlog files to replay
    #[arg(long, env = "BINLOG_SYNC_EVENTS_DIR")]
    pub events_dir: PathBuf,

    /// MySQL connection URI used to look up table columns.
    /// Without it, column lists come from the config file.
    #[arg(long, env = "MYSQL_URI")]
    pub mysql_uri: Option<String>,

    /// TOML config file with the schema filter and static column lists
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resolve the columns of every configured table before streaming
    #[arg(long)]
    pub preload_metadata: bool,
}

/// Which stream this is and where its messages go
#[derive(Parser, Clone, Debug)]
pub struct SinkOpts {
    /// Delivery sink: "file" or "stdout"
    #[arg(long, default_value_t = SinkKind::File, env = "BINLOG_SYNC_SINK")]
    pub sink: SinkKind,

    /// Delivery log written by the file sink and read back on restart
    #[arg(long, default_value = "binlog-sync-delivery.jsonl")]
    pub delivery_log: PathBuf,

    /// Book of the output stream
    #[arg(long, default_value = "default", env = "BINLOG_SYNC_BOOK")]
    pub book: String,

    /// Group of the output stream
    #[arg(long, default_value = "mysql", env = "BINLOG_SYNC_GROUP")]
    pub group: String,

    /// Alias of the output stream
    #[arg(long, default_value = "binlog", env = "BINLOG_SYNC_ALIAS")]
    pub alias: String,
}

/// Arguments of `binlog-sync run`
#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceOpts,

    #[command(flatten)]
    pub sink: SinkOpts,

    /// Start from this position instead of the last delivered one.
    /// Format: log_file:offset (e.g., "mysql-bin.000003:4")
    #[arg(long)]
    pub start_from: Option<String>,

    /// How long to wait for the last delivered position before starting from the beginning
    /// Format: duration in seconds or with units like "30s", "1m"
    #[arg(long, default_value = "60")]
    pub position_lookup_timeout: String,

    /// Split insert/delete records whose JSON would exceed this many bytes
    #[arg(long)]
    pub max_payload_bytes: Option<usize>,

    /// Drop statements that are not table DDL
    #[arg(long)]
    pub skip_unknown_statements: bool,
}
