//! Core types for binlog-sync.
//!
//! This crate provides the record model shared by every other crate of the
//! workspace:
//!
//! - [`RowValue`] / [`RowValues`] - Closed scalar set and per-row column mapping
//! - [`Record`] - Insert, delete, update and statement records with their JSON wire form
//! - [`Record::size_bytes`] - Serialized size estimate without serializing
//! - [`Record::split`] - Greedy splitting of oversized records
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mysql-types          (classifies statements)
//!    ├─── delivery-sink        (ships serialized records)
//!    └─── mysql-binlog-source  (builds records from replication events)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{Record, RowValue};
//!
//! let columns = vec!["id".to_string(), "name".to_string()];
//! let record = Record::insert(
//!     "shop",
//!     "users",
//!     &columns,
//!     vec![
//!         vec![RowValue::Int(1), RowValue::from("alice")],
//!         vec![RowValue::Int(2), RowValue::from("bob")],
//!     ],
//! )
//! .unwrap();
//!
//! assert!(record.splittable());
//! assert!(record.size_bytes() >= record.to_json().unwrap().len());
//! ```

pub mod record;
mod size;
mod split;
pub mod values;

// Re-exports for convenience
pub use record::{
    fields, Delete, Header, Insert, Operation, Record, RecordError, Statement, Update, UpdatePair,
};
pub use values::{RowValue, RowValues};
