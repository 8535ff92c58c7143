//! Configuration for binlog-sync runs.
//!
//! Command-line options live in the crate root; this module holds the
//! optional TOML file and the small parsers shared by the CLI.

mod duration;
mod file;

pub use duration::{parse_duration, parse_duration_to_secs};
pub use file::{load_config_if_provided, AppConfig};
