//! Pattern-based classification of raw SQL statements.
//!
//! Statements replicated outside row events carry no structured table
//! information. [`classify`] recognises the common table DDL forms and
//! extracts the affected schema and table; everything else is reported as
//! [`Operation::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use sync_core::Operation;

/// Optional back-ticked `schema.` qualifier followed by the table name.
const QUALIFIED_TABLE: &str = r"(?:`?(?P<schema>\w+)`?\.)?`?(?P<table>\w+)`?";

// Compiled once, tried in order. The first match wins.
static PATTERNS: Lazy<Vec<(Regex, Operation)>> = Lazy::new(|| {
    let q = QUALIFIED_TABLE;
    vec![
        (
            Regex::new(&format!(
                r"(?is)^\s*TRUNCATE\s+TABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?{q}\s*;?\s*$"
            ))
            .unwrap(),
            Operation::Truncate,
        ),
        (
            Regex::new(&format!(
                r"(?is)^\s*CREATE\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?{q}\s*\(.*\).*;?\s*$"
            ))
            .unwrap(),
            Operation::CreateTable,
        ),
        (
            Regex::new(&format!(
                r"(?is)^\s*DROP\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+EXISTS\s+)?{q}\s*;?\s*$"
            ))
            .unwrap(),
            Operation::DropTable,
        ),
        (
            Regex::new(&format!(r"(?is)^\s*ALTER\s+TABLE\s+{q}\s+.+$")).unwrap(),
            Operation::AlterTable,
        ),
    ]
});

/// Result of classifying one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Schema qualifier, empty when the statement names an unqualified table.
    pub schema: String,
    /// Table name, empty for unknown statements.
    pub table: String,
    pub operation: Operation,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            schema: String::new(),
            table: String::new(),
            operation: Operation::Unknown,
        }
    }

    /// Whether a pattern matched.
    pub fn is_known(&self) -> bool {
        self.operation != Operation::Unknown
    }
}

/// Classify a raw SQL statement.
pub fn classify(sql: &str) -> Classification {
    for (regex, operation) in PATTERNS.iter() {
        if let Some(captures) = regex.captures(sql) {
            let group = |name: &str| {
                captures
                    .name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            };
            return Classification {
                schema: group("schema"),
                table: group("table"),
                operation: *operation,
            };
        }
    }
    Classification::unknown()
}
