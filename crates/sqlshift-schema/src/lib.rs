//! Schema migrations for sqlshift.
//!
//! This crate provides:
//! - Reversible schema statements rendered per dialect
//! - Migrations defined in code or loaded lazily from `.sql` files
//! - The `schema_migrations` ledger and `ar_internal_metadata` store
//! - [`Migrator`], which runs migrations one transaction at a time
//! - [`MigrationContext`], which discovers migrations and answers
//!   status and pending questions
//!
//! # Example
//!
//! ```no_run
//! use sqlshift_schema::{ColumnDef, Migration, MigrationContext, SchemaStatement, TableDef};
//! use sqlshift_sqlite::SqliteConnection;
//!
//! let mut conn = SqliteConnection::open_file("app.sqlite3")?;
//! let context = MigrationContext::new(["db/migrate"]).register(
//!     Migration::new(20240101000000, "create_users").change(vec![SchemaStatement::create_table(
//!         TableDef::new("users").column(ColumnDef::new("email", "TEXT").not_null()),
//!     )]),
//! );
//! context.migrate(&mut conn, None)?;
//! # Ok::<(), sqlshift_core::Error>(())
//! ```

pub mod context;
pub mod ledger;
pub mod metadata;
pub mod migration;
pub mod migrator;
pub mod proxy;
pub mod statement;

pub use context::{
    DEFAULT_MIGRATIONS_PATH, DISABLE_ENVIRONMENT_CHECK_VAR, MigrationContext, MigrationStatus,
    NO_FILE,
};
pub use ledger::{SCHEMA_MIGRATIONS_TABLE, SchemaMigration, normalize_migration_number};
pub use metadata::{ENVIRONMENT_KEY, INTERNAL_METADATA_TABLE, InternalMetadata};
pub use migration::{Direction, Migration, MigrationBody, MigrationFn, camelize, humanize};
pub use migrator::{DEFAULT_ENVIRONMENT, Migrator, validate_migrations};
pub use proxy::{
    MIGRATION_FILENAME_PATTERN, MigrationFilename, MigrationProxy, migration_filename_regex,
    parse_migration_filename,
};
pub use statement::{ColumnDef, IndexDef, SchemaStatement, TableDef, index_name};
