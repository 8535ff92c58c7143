//! Row value representations for replicated data.
//!
//! This module defines the closed scalar set carried by replicated rows and
//! the per-row column mapping built from a raw positional tuple.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::record::RecordError;

/// A single scalar value of a replicated row.
///
/// The variant set is closed on purpose: the size estimator matches on it
/// exhaustively, so every value that can reach the serializer has a known
/// cost.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// SQL NULL
    Null,

    /// Signed integer (any width up to 64 bits)
    Int(i64),

    /// Unsigned integer (any width up to 64 bits)
    UInt(u64),

    /// Floating point value (FLOAT and DOUBLE columns)
    Float(f64),

    /// Text value
    String(String),

    /// Raw bytes, serialized as a base64 string
    Bytes(Vec<u8>),
}

impl RowValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Try to get this value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl Serialize for RowValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_str(&STANDARD.encode(b)),
        }
    }
}

impl From<i64> for RowValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for RowValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for RowValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RowValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RowValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for RowValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One physical row keyed by column name.
///
/// Keys are kept sorted so the serialized object is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowValues(BTreeMap<String, RowValue>);

impl RowValues {
    /// Build a row from a positional tuple and the table's ordered column names.
    ///
    /// The value at ordinal `i` is keyed by `columns[i]`. A tuple shorter than
    /// the column list leaves the trailing names unused; a tuple wider than the
    /// column list is rejected so no value is ever dropped.
    pub fn from_row(
        row_index: usize,
        columns: &[String],
        row: Vec<RowValue>,
    ) -> Result<Self, RecordError> {
        if row.len() > columns.len() {
            return Err(RecordError::RowWiderThanColumns {
                row: row_index,
                values: row.len(),
                columns: columns.len(),
            });
        }
        Ok(Self(columns.iter().cloned().zip(row).collect()))
    }

    /// Get the value of a column.
    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.0.get(column)
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(column, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RowValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, RowValue)> for RowValues {
    fn from_iter<I: IntoIterator<Item = (String, RowValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
