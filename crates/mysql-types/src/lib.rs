//! MySQL statement classification for binlog-sync.
//!
//! Classifies raw SQL statements from the replication log into table DDL
//! operations.
//!
//! # Example
//!
//! ```rust
//! use mysql_types::classify;
//! use sync_core::Operation;
//!
//! let c = classify("DROP TABLE IF EXISTS `db1`.`users`;");
//! assert_eq!(c.operation, Operation::DropTable);
//! assert_eq!(c.schema, "db1");
//! assert_eq!(c.table, "users");
//! ```

pub mod statement;

pub use statement::{classify, Classification};
