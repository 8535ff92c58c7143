//! Last-delivered position lookup.
//!
//! This module defines the PositionSource trait used on startup to find the
//! properties of the last record delivered for a stream, plus shared types.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Names one logical output stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamIdentity {
    pub book: String,
    pub group: String,
    pub alias: String,
}

impl StreamIdentity {
    pub fn new(
        book: impl Into<String>,
        group: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            book: book.into(),
            group: group.into(),
            alias: alias.into(),
        }
    }
}

impl std::fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.book, self.group, self.alias)
    }
}

/// Properties attached to a delivered record.
pub type DeliveredProperties = BTreeMap<String, String>;

/// Trait for looking up the last delivered record of a stream.
///
/// Implementations:
/// - `NullPositionSource` - nothing was ever delivered
/// - `DeliveryLogPositionSource` - reads a JSONL delivery log (delivery-sink crate)
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Get the properties of the last delivered record for `identity`.
    ///
    /// Returns None if nothing was delivered for the stream.
    async fn last_delivered(&self, identity: &StreamIdentity) -> Result<Option<DeliveredProperties>>;
}

/// Position source for streams with no delivery history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPositionSource;

#[async_trait]
impl PositionSource for NullPositionSource {
    async fn last_delivered(&self, _identity: &StreamIdentity) -> Result<Option<DeliveredProperties>> {
        Ok(None)
    }
}
