//! Core types and traits for sqlshift.
//!
//! This crate provides the foundations shared by the adapter, pool and
//! migration crates:
//!
//! - `Error` taxonomy and the `Result` alias
//! - `Value` and `Row` for exchanging data with a database
//! - `Connection` trait for a single database session, plus the
//!   `transaction` helper
//! - `Dialect` for identifier quoting
//! - `DatabaseConfig` / `DatabaseConfigurations` for connection settings

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod row;
pub mod value;

pub use config::{DatabaseConfig, DatabaseConfigurations, PRIMARY};
pub use connection::{Connection, transaction};
pub use dialect::{Dialect, quote_ident, quote_ident_mysql};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, EnvironmentError, EnvironmentErrorKind,
    Error, MigrationError, MigrationErrorKind, PoolError, PoolErrorKind, QueryError,
    QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
