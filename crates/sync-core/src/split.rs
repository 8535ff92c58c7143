//! Splitting oversized records into size-bounded parts.

use crate::record::{fields, Delete, Insert, Record};
use crate::size::rows_overhead;
use crate::values::RowValues;

impl Record {
    /// Split the record into the fewest parts whose estimated size does not
    /// exceed `max_size_bytes`.
    ///
    /// Rows are packed greedily in their original order. A single row that
    /// alone exceeds the budget still forms its own part. Records that are not
    /// splittable come back unchanged as a one-element vector.
    pub fn split(&self, max_size_bytes: usize) -> Vec<Record> {
        match self {
            Record::Insert(r) if r.rows.len() > 1 => {
                let base = rows_overhead(&r.header, fields::INSERTED);
                split_rows(&r.rows, base, max_size_bytes)
                    .into_iter()
                    .map(|rows| {
                        Record::Insert(Insert {
                            header: r.header.clone(),
                            rows,
                        })
                    })
                    .collect()
            }
            Record::Delete(r) if r.rows.len() > 1 => {
                let base = rows_overhead(&r.header, fields::DELETED);
                split_rows(&r.rows, base, max_size_bytes)
                    .into_iter()
                    .map(|rows| {
                        Record::Delete(Delete {
                            header: r.header.clone(),
                            rows,
                        })
                    })
                    .collect()
            }
            _ => vec![self.clone()],
        }
    }
}

fn split_rows(rows: &[RowValues], base: usize, max_size_bytes: usize) -> Vec<Vec<RowValues>> {
    let mut parts = Vec::new();
    let mut iter = rows.iter();
    let Some(first) = iter.next() else {
        return parts;
    };

    let mut current = vec![first.clone()];
    let mut running = base + first.size_bytes();
    for row in iter {
        let row_len = row.size_bytes();
        if running + row_len + 1 > max_size_bytes {
            parts.push(std::mem::take(&mut current));
            running = base + row_len;
        } else {
            running += row_len + 1;
        }
        current.push(row.clone());
    }
    parts.push(current);
    parts
}
