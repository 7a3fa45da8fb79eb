//! SQL dialects and identifier quoting.
//!
//! Schema statements are rendered per dialect. Only identifier quoting and
//! a handful of capability flags differ between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL dialect spoken by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Resolve a dialect from an adapter name (`"sqlite3"`, `"postgresql"`, ...).
    pub fn from_adapter(adapter: &str) -> Option<Self> {
        match adapter.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" | "postgis" => Some(Dialect::Postgres),
            "mysql" | "mysql2" | "trilogy" => Some(Dialect::Mysql),
            _ => None,
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled, so any input is safe.
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Dialect::Sqlite | Dialect::Postgres => quote_ident(name),
            Dialect::Mysql => quote_ident_mysql(name),
        }
    }

    /// Whether schema changes can be rolled back inside a transaction.
    pub const fn supports_ddl_transactions(self) -> bool {
        match self {
            Dialect::Sqlite | Dialect::Postgres => true,
            Dialect::Mysql => false,
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite | Dialect::Mysql => "?".to_string(),
        }
    }

    /// Whether `ALTER TABLE ... DROP COLUMN` may carry `IF EXISTS`.
    pub const fn supports_if_exists_on_columns(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
        };
        f.write_str(name)
    }
}

/// Quote a SQL identifier using ANSI double-quoting.
///
/// ```
/// use sqlshift_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
