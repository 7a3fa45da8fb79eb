//! sqlshift - schema migrations and connection pooling for relational databases.
//!
//! sqlshift provides:
//!
//! - Versioned migrations, defined in code or as `.sql` files, recorded in a
//!   `schema_migrations` table
//! - Reversible schema statements rendered for SQLite, PostgreSQL and MySQL
//! - A thread-safe connection pool with checkout timeouts and a reaper
//! - A handler that keeps one pool per logical connection name
//! - Environment protection for destructive tasks
//!
//! # Quick Start
//!
//! ```no_run
//! use sqlshift::prelude::*;
//!
//! let db = Database::builder()
//!     .environment("development")
//!     .migration(Migration::new(20240101000000, "create_users").change(vec![
//!         SchemaStatement::create_table(
//!             TableDef::new("users").column(ColumnDef::new("email", "TEXT").not_null()),
//!         ),
//!     ]))
//!     .build();
//!
//! db.establish(PRIMARY, DatabaseConfig::new("sqlite3", "db/development.sqlite3"))?;
//! db.migrate(PRIMARY, &MigrateOptions::new())?;
//!
//! for status in db.migrations_status(PRIMARY)? {
//!     println!("{:>6}  {}  {}", status.status, status.version, status.name);
//! }
//! # Ok::<(), sqlshift::Error>(())
//! ```

pub mod database;
pub mod options;

pub use database::{Database, DatabaseBuilder, register_default_adapters};
pub use options::{MigrateOptions, parse_target_version};

// Re-export all public types from sub-crates
pub use sqlshift_core::{
    ColumnInfo, ConfigError, Connection, ConnectionError, ConnectionErrorKind, DatabaseConfig,
    DatabaseConfigurations, Dialect, EnvironmentError, EnvironmentErrorKind, Error, FromValue,
    MigrationError, MigrationErrorKind, PRIMARY, PoolError, PoolErrorKind, QueryError,
    QueryErrorKind, Result, Row, TransactionError, TransactionErrorKind, TypeError, Value,
    transaction,
};
pub use sqlshift_pool::{
    AdapterFn, AdapterRegistry, ConnectionFactory, ConnectionHandler, ConnectionPool, PoolConfig,
    PoolStats, PooledConnection,
};
pub use sqlshift_schema::{
    ColumnDef, DEFAULT_ENVIRONMENT, DEFAULT_MIGRATIONS_PATH, DISABLE_ENVIRONMENT_CHECK_VAR,
    Direction, IndexDef, InternalMetadata, Migration, MigrationBody, MigrationContext,
    MigrationProxy, MigrationStatus, Migrator, NO_FILE, SchemaMigration, SchemaStatement,
    TableDef,
};
pub use sqlshift_sqlite::{SqliteConfig, SqliteConnection};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlshift::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Configuration
        ColumnDef,
        Connection,
        // Context
        Database,
        DatabaseConfig,
        DatabaseConfigurations,
        Direction,
        Error,
        IndexDef,
        MigrateOptions,
        // Migrations
        Migration,
        MigrationContext,
        MigrationStatus,
        PRIMARY,
        // Pool
        PoolConfig,
        Result,
        Row,
        SchemaStatement,
        TableDef,
        Value,
        transaction,
    };
}
