//! DeliverySink trait definition.
//!
//! This trait abstracts over the outbound transport, allowing the event
//! pipeline to be compiled against a single interface.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Protocol tag for JSON payloads.
pub const JSON_PROTOCOL: &str = "json";

/// Direction of a delivered message relative to the monitored system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

/// Routing and metadata sent alongside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageArguments {
    pub alias: String,
    pub protocol: String,
    pub direction: Direction,
    pub properties: BTreeMap<String, String>,
}

impl MessageArguments {
    /// Arguments for an inbound JSON payload.
    pub fn json(alias: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            alias: alias.into(),
            protocol: JSON_PROTOCOL.to_string(),
            direction: Direction::In,
            properties,
        }
    }
}

/// Trait for shipping serialized records downstream.
///
/// # Usage Pattern
///
/// The pipeline uses generics for zero-cost dispatch:
///
/// ```ignore
/// pub struct Pipeline<S: DeliverySink> { sink: S, .. }
///
/// // All calls are statically dispatched after monomorphization
/// self.sink.send(payload, MessageArguments::json(alias, properties)).await?;
/// ```
///
/// The CLI entry point branches once based on [`crate::SinkKind`], and after
/// that all code is monomorphized for the specific implementation.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    /// Send one payload.
    ///
    /// Batching and retries are the sink's own business; an error returned
    /// here is final.
    async fn send(&self, payload: Vec<u8>, args: MessageArguments) -> Result<()>;
}
