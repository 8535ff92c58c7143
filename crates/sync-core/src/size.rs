//! Serialized size estimation.
//!
//! Computes the byte length `serde_json::to_vec` produces for a record
//! without serializing it. Every cost below mirrors one decision the JSON
//! writer makes, so the estimate never undercounts.

use crate::record::{fields, Header, Record};
use crate::values::{RowValue, RowValues};

impl Record {
    /// Upper bound on the serialized length of a splittable record.
    ///
    /// Records that cannot be split report `0`; callers only consult the size
    /// to decide whether a split is needed.
    pub fn size_bytes(&self) -> usize {
        if !self.splittable() {
            return 0;
        }
        match self {
            Record::Insert(r) => rows_record_len(&r.header, fields::INSERTED, &r.rows),
            Record::Delete(r) => rows_record_len(&r.header, fields::DELETED, &r.rows),
            Record::Update(_) | Record::Statement(_) => 0,
        }
    }
}

impl RowValues {
    /// Serialized length of this row as a JSON object.
    pub fn size_bytes(&self) -> usize {
        let entries: usize = self
            .iter()
            .map(|(column, value)| field_len(column, value_len(value)))
            .sum();
        2 + self.len().saturating_sub(1) + entries
    }
}

/// Length of everything in a rows record except the rows themselves and the
/// commas between them: `{"Schema":..,"Table":..,"Operation":..,"<key>":[` + `]}`.
pub(crate) fn rows_overhead(header: &Header, rows_field: &str) -> usize {
    header_len(header) + str_len(rows_field) + 1 + 2 + 1
}

fn rows_record_len(header: &Header, rows_field: &str, rows: &[RowValues]) -> usize {
    let rows_len: usize = rows.iter().map(RowValues::size_bytes).sum();
    rows_overhead(header, rows_field) + rows.len().saturating_sub(1) + rows_len
}

/// `{` plus the three header fields, each followed by a comma.
fn header_len(header: &Header) -> usize {
    1 + field_len(fields::SCHEMA, str_len(&header.schema))
        + 1
        + field_len(fields::TABLE, str_len(&header.table))
        + 1
        + field_len(fields::OPERATION, header.operation.as_str().len() + 2)
        + 1
}

fn field_len(key: &str, value_len: usize) -> usize {
    str_len(key) + 1 + value_len
}

fn value_len(value: &RowValue) -> usize {
    match value {
        RowValue::Null => 4,
        RowValue::Int(i) => int_len(*i),
        RowValue::UInt(u) => uint_len(*u),
        RowValue::Float(f) => float_len(*f),
        RowValue::String(s) => str_len(s),
        RowValue::Bytes(b) => bytes_len(b.len()),
    }
}

/// Quoted, escaped length of a JSON string.
fn str_len(s: &str) -> usize {
    let escaped: usize = s
        .bytes()
        .map(|b| match b {
            b'"' | b'\\' => 2,
            0x08 | 0x0C | b'\n' | b'\r' | b'\t' => 2,
            0x00..=0x1F => 6,
            _ => 1,
        })
        .sum();
    escaped + 2
}

fn int_len(i: i64) -> usize {
    let sign = usize::from(i < 0);
    sign + uint_len(i.unsigned_abs())
}

fn uint_len(u: u64) -> usize {
    u.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn float_len(f: f64) -> usize {
    serde_json::Number::from_f64(f).map_or(4, |n| n.to_string().len())
}

/// Base64 with padding, quoted.
fn bytes_len(n: usize) -> usize {
    n.div_ceil(3) * 4 + 2
}
