//! SQLite adapter for sqlshift.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `Connection` trait from sqlshift-core on top
//! of the bundled libsqlite3 (through `libsqlite3-sys`).
//!
//! # Features
//!
//! - Full Connection trait implementation
//! - Nested transactions through savepoints
//! - Transactional DDL, so a failed migration leaves no partial schema
//! - In-memory and file-based databases
//! - Disconnect / reconnect for pool health checks
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlshift_core::{Connection, Value};
//! use sqlshift_sqlite::SqliteConnection;
//!
//! let mut conn = SqliteConnection::open_memory()?;
//! conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])?;
//! let rows = conn.query("SELECT name FROM users", &[])?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), sqlshift_core::Error>(())
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{ADAPTER_NAME, OpenFlags, SqliteConfig, SqliteConnection};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// The SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
