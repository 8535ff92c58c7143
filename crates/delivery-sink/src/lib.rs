//! Outbound delivery for binlog-sync.
//!
//! This crate defines the `DeliverySink` trait the event pipeline dispatches
//! serialized records to, plus the JSONL implementations the binary ships
//! with. The JSONL delivery log is also the delivery history the position
//! tracker reads on restart, via `DeliveryLogPositionSource`.

mod jsonl;
mod kind;
mod position;
mod traits;

pub use jsonl::{DeliveredMessage, JsonlFileSink, StdoutSink};
pub use kind::SinkKind;
pub use position::DeliveryLogPositionSource;
pub use traits::{DeliverySink, Direction, MessageArguments, JSON_PROTOCOL};
