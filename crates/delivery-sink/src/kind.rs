//! Sink kind enumeration.
//!
//! Provides the `SinkKind` enum for selecting where dispatched records go.

/// Delivery sink selection.
///
/// The CLI entry point branches once based on this value, and all
/// subsequent code is monomorphized for that specific sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Append to a JSONL delivery log, which also records the resume position.
    #[default]
    File,
    /// Print to standard output. Nothing is remembered across restarts.
    Stdout,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Stdout => write!(f, "stdout"),
        }
    }
}

impl std::str::FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "jsonl" => Ok(Self::File),
            "stdout" | "-" => Ok(Self::Stdout),
            _ => Err(anyhow::anyhow!(
                "Invalid sink: '{s}'. Expected 'file' or 'stdout'"
            )),
        }
    }
}
