//! Replication records.
//!
//! A [`Record`] is the structured form of one replication event: inserted,
//! deleted or updated rows of a table, or a raw SQL statement. Records are
//! immutable values serialized to JSON for delivery.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::values::{RowValue, RowValues};

/// Wire field names shared by the serializer and the size estimator.
///
/// The `#[serde(rename)]` attributes below must spell the same names; the
/// `test_wire_field_names` test keeps them in sync.
pub mod fields {
    pub const SCHEMA: &str = "Schema";
    pub const TABLE: &str = "Table";
    pub const OPERATION: &str = "Operation";
    pub const INSERTED: &str = "Inserted";
    pub const DELETED: &str = "Deleted";
    pub const UPDATED: &str = "Updated";
    pub const QUERY: &str = "Query";
    pub const BEFORE: &str = "Before";
    pub const AFTER: &str = "After";
}

/// Errors raised while building a record from raw rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A raw row carries more values than the table has known columns.
    #[error("row {row} has {values} values but only {columns} columns are known")]
    RowWiderThanColumns {
        row: usize,
        values: usize,
        columns: usize,
    },
}

/// Kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Truncate,
    CreateTable,
    DropTable,
    AlterTable,
    Unknown,
}

impl Operation {
    /// Get the wire representation of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Truncate => "TRUNCATE",
            Operation::CreateTable => "CREATE_TABLE",
            Operation::DropTable => "DROP_TABLE",
            Operation::AlterTable => "ALTER_TABLE",
            Operation::Unknown => "UNKNOWN",
        }
    }

    /// Whether this operation is a schema change recognised by the classifier.
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Operation::Truncate
                | Operation::CreateTable
                | Operation::DropTable
                | Operation::AlterTable
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields common to every record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    #[serde(rename = "Schema")]
    pub schema: String,
    #[serde(rename = "Table")]
    pub table: String,
    #[serde(rename = "Operation")]
    pub operation: Operation,
}

impl Header {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, operation: Operation) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            operation,
        }
    }
}

/// Rows written by an INSERT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insert {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "Inserted")]
    pub rows: Vec<RowValues>,
}

/// Rows removed by a DELETE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delete {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "Deleted")]
    pub rows: Vec<RowValues>,
}

/// Row images before and after an UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePair {
    #[serde(rename = "Before")]
    pub before: RowValues,
    #[serde(rename = "After")]
    pub after: RowValues,
}

/// Rows changed by an UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "Updated")]
    pub pairs: Vec<UpdatePair>,
}

/// A raw SQL statement replicated without row data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "Query")]
    pub query: String,
}

/// A replication record.
///
/// Serialized untagged: the variant is identified by its row field name
/// (`Inserted`, `Deleted`, `Updated` or `Query`) and by `Operation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Insert(Insert),
    Delete(Delete),
    Update(Update),
    Statement(Statement),
}

impl Record {
    /// Build an insert record from raw positional rows.
    pub fn insert(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: &[String],
        rows: Vec<Vec<RowValue>>,
    ) -> Result<Self, RecordError> {
        Ok(Record::Insert(Insert {
            header: Header::new(schema, table, Operation::Insert),
            rows: build_rows(columns, rows)?,
        }))
    }

    /// Build a delete record from raw positional rows.
    pub fn delete(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: &[String],
        rows: Vec<Vec<RowValue>>,
    ) -> Result<Self, RecordError> {
        Ok(Record::Delete(Delete {
            header: Header::new(schema, table, Operation::Delete),
            rows: build_rows(columns, rows)?,
        }))
    }

    /// Build an update record from raw positional rows.
    ///
    /// Rows are paired in order: row `2i` is the before image and row `2i + 1`
    /// the after image. A trailing unpaired row is dropped and logged.
    pub fn update(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: &[String],
        rows: Vec<Vec<RowValue>>,
    ) -> Result<Self, RecordError> {
        let header = Header::new(schema, table, Operation::Update);
        if rows.len() % 2 == 1 {
            debug!(
                schema = %header.schema,
                table = %header.table,
                rows = rows.len(),
                "Dropping trailing unpaired row of update event"
            );
        }

        let mut pairs = Vec::with_capacity(rows.len() / 2);
        let mut rows = rows.into_iter().enumerate();
        while let (Some((i, before)), Some((j, after))) = (rows.next(), rows.next()) {
            pairs.push(UpdatePair {
                before: RowValues::from_row(i, columns, before)?,
                after: RowValues::from_row(j, columns, after)?,
            });
        }

        Ok(Record::Update(Update { header, pairs }))
    }

    /// Build a statement record.
    pub fn statement(
        schema: impl Into<String>,
        table: impl Into<String>,
        query: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Record::Statement(Statement {
            header: Header::new(schema, table, operation),
            query: query.into(),
        })
    }

    /// Get the common header.
    pub fn header(&self) -> &Header {
        match self {
            Record::Insert(r) => &r.header,
            Record::Delete(r) => &r.header,
            Record::Update(r) => &r.header,
            Record::Statement(r) => &r.header,
        }
    }

    pub fn operation(&self) -> Operation {
        self.header().operation
    }

    /// Number of rows (or update pairs) carried by the record.
    pub fn row_count(&self) -> usize {
        match self {
            Record::Insert(r) => r.rows.len(),
            Record::Delete(r) => r.rows.len(),
            Record::Update(r) => r.pairs.len(),
            Record::Statement(_) => 0,
        }
    }

    /// Whether [`Record::split`] can break this record into smaller parts.
    ///
    /// Only inserts and deletes with more than one row are splittable.
    pub fn splittable(&self) -> bool {
        match self {
            Record::Insert(r) => r.rows.len() > 1,
            Record::Delete(r) => r.rows.len() > 1,
            Record::Update(_) | Record::Statement(_) => false,
        }
    }

    /// Serialize the record to its JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn build_rows(columns: &[String], rows: Vec<Vec<RowValue>>) -> Result<Vec<RowValues>, RecordError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| RowValues::from_row(i, columns, row))
        .collect()
}
