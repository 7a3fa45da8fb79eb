//! Error types for sqlshift operations.

use std::fmt;

/// The primary error type for all sqlshift operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect, reconnect)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Pool errors (checkout timeout, closed pool)
    Pool(PoolError),
    /// Migration loading and execution errors
    Migration(MigrationError),
    /// Environment protection errors
    Environment(EnvironmentError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// No adapter registered for the configured adapter name
    AdapterNotFound,
    /// No pool has been established under the requested name
    NotEstablished,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database is locked or busy
    Busy,
    /// Statement interrupted
    Interrupted,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback issued with no open transaction
    NotActive,
    /// Savepoint not found
    SavepointNotFound,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// No connection became available within the checkout timeout
    Timeout,
    /// Pool has been disconnected
    Closed,
    /// The connection does not belong to this pool
    ForeignConnection,
    /// Connections were still checked out when a closing pool gave up waiting
    DrainTimeout,
    /// Configuration error
    Config,
}

#[derive(Debug)]
pub struct MigrationError {
    pub kind: MigrationErrorKind,
    pub version: Option<u64>,
    pub name: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationErrorKind {
    /// Two migrations share a version
    DuplicateVersion,
    /// Two migrations share a normalized name
    DuplicateName,
    /// Target version does not match any migration
    UnknownVersion,
    /// Migration cannot be reverted
    Irreversible,
    /// Migration file name does not follow `<version>_<name>.sql`
    IllegalName,
    /// There are migrations that have not been applied
    Pending,
    /// A migration raised while running; later migrations were cancelled
    Failed,
}

#[derive(Debug)]
pub struct EnvironmentError {
    pub kind: EnvironmentErrorKind,
    pub current: Option<String>,
    pub stored: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentErrorKind {
    /// The stored environment is a protected one
    Protected,
    /// The stored environment differs from the current one
    Mismatch,
    /// No environment is recorded in the schema
    NoEnvironmentInSchema,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Checkout timed out waiting for a pooled connection.
    pub fn connection_timeout(message: impl Into<String>) -> Self {
        Error::Pool(PoolError {
            kind: PoolErrorKind::Timeout,
            message: message.into(),
            source: None,
        })
    }

    pub fn connection_not_established(name: &str) -> Self {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::NotEstablished,
            message: format!("No connection pool for '{}' found.", name),
            source: None,
        })
    }

    pub fn pool_closed(pool: &str) -> Self {
        Error::Pool(PoolError {
            kind: PoolErrorKind::Closed,
            message: format!("connection pool '{}' has been disconnected", pool),
            source: None,
        })
    }

    /// A closing pool still had `in_use` connections checked out.
    pub fn pool_drain_timeout(pool: &str, in_use: usize, detail: &str) -> Self {
        Error::Pool(PoolError {
            kind: PoolErrorKind::DrainTimeout,
            message: format!(
                "could not drain connection pool '{}': {} connection(s) still checked out ({})",
                pool, in_use, detail
            ),
            source: None,
        })
    }

    pub fn duplicate_migration_version(version: u64) -> Self {
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::DuplicateVersion,
            version: Some(version),
            name: None,
            message: format!("Multiple migrations have the version number {}.", version),
            source: None,
        })
    }

    pub fn duplicate_migration_name(name: &str) -> Self {
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::DuplicateName,
            version: None,
            name: Some(name.to_string()),
            message: format!(
                "Multiple migrations have the name {}. Migration names must be unique.",
                name
            ),
            source: None,
        })
    }

    pub fn unknown_migration_version(version: u64) -> Self {
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::UnknownVersion,
            version: Some(version),
            name: None,
            message: format!("No migration with version number {}.", version),
            source: None,
        })
    }

    pub fn irreversible_migration(version: u64, name: &str, detail: impl Into<String>) -> Self {
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::Irreversible,
            version: Some(version),
            name: Some(name.to_string()),
            message: format!(
                "Migration {} ({}) cannot be reverted: {}",
                version,
                name,
                detail.into()
            ),
            source: None,
        })
    }

    pub fn illegal_migration_name(file: &str) -> Self {
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::IllegalName,
            version: None,
            name: Some(file.to_string()),
            message: format!(
                "Illegal name for migration file: {}\n\t(only lower case letters, numbers, and '_' allowed).",
                file
            ),
            source: None,
        })
    }

    pub fn pending_migrations(pending: &[u64]) -> Self {
        let versions: Vec<String> = pending.iter().map(u64::to_string).collect();
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::Pending,
            version: pending.first().copied(),
            name: None,
            message: format!(
                "Migrations are pending ({}). Run the migrator to resolve this issue.",
                versions.join(", ")
            ),
            source: None,
        })
    }

    /// Wrap the cause of a failed migration.
    ///
    /// `rolled_back` says whether the failing migration ran inside a
    /// transaction, i.e. whether its own partial changes were undone.
    pub fn migration_failed(version: u64, name: &str, rolled_back: bool, cause: Error) -> Self {
        let canceled = if rolled_back {
            "this and all later migrations canceled"
        } else {
            "all later migrations canceled"
        };
        Error::Migration(MigrationError {
            kind: MigrationErrorKind::Failed,
            version: Some(version),
            name: Some(name.to_string()),
            message: format!(
                "An error has occurred in migration {} ({}), {}:\n\n{}",
                version, name, canceled, cause
            ),
            source: Some(Box::new(cause)),
        })
    }

    pub fn protected_environment(stored: &str) -> Self {
        Error::Environment(EnvironmentError {
            kind: EnvironmentErrorKind::Protected,
            current: None,
            stored: Some(stored.to_string()),
            message: format!(
                "You are attempting to run a destructive action against your '{}' database.\n\
                 If you are sure you want to continue, set DISABLE_DATABASE_ENVIRONMENT_CHECK=1.",
                stored
            ),
        })
    }

    pub fn environment_mismatch(current: &str, stored: &str) -> Self {
        Error::Environment(EnvironmentError {
            kind: EnvironmentErrorKind::Mismatch,
            current: Some(current.to_string()),
            stored: Some(stored.to_string()),
            message: format!(
                "You are attempting to modify a database that was last run in `{}` environment.\n\
                 You are running in `{}` environment.",
                stored, current
            ),
        })
    }

    pub fn no_environment_in_schema() -> Self {
        Error::Environment(EnvironmentError {
            kind: EnvironmentErrorKind::NoEnvironmentInSchema,
            current: None,
            stored: None,
            message: "Environment data not found in the schema. Run the migrator to record it."
                .to_string(),
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Is this a retryable error (busy database, checkout timeout)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Busy),
            Error::Pool(p) => matches!(p.kind, PoolErrorKind::Timeout),
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect | ConnectionErrorKind::Disconnected
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Did a pool checkout time out?
    pub fn is_connection_timeout(&self) -> bool {
        matches!(self, Error::Pool(p) if p.kind == PoolErrorKind::Timeout)
    }

    /// The migration error kind, if this is a migration error.
    pub fn migration_kind(&self) -> Option<MigrationErrorKind> {
        match self {
            Error::Migration(m) => Some(m.kind),
            _ => None,
        }
    }

    /// The environment error kind, if this is an environment error.
    pub fn environment_kind(&self) -> Option<EnvironmentErrorKind> {
        match self {
            Error::Environment(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Migration(e) => write!(f, "{}", e.message),
            Error::Environment(e) => write!(f, "{}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Pool(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Migration(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<MigrationError> for Error {
    fn from(err: MigrationError) -> Self {
        Error::Migration(err)
    }
}

impl From<EnvironmentError> for Error {
    fn from(err: EnvironmentError) -> Self {
        Error::Environment(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlshift operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_connection_flags() {
        let busy = Error::Query(QueryError {
            kind: QueryErrorKind::Busy,
            sql: None,
            message: "database is locked".to_string(),
            source: None,
        });
        let timeout = Error::connection_timeout("could not obtain a connection");

        assert!(busy.is_retryable());
        assert!(timeout.is_retryable());
        assert!(timeout.is_connection_timeout());
        assert!(!busy.is_connection_timeout());

        let lost = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "lost connection".to_string(),
            source: None,
        });
        assert!(lost.is_connection_error());
        assert!(!Error::pool_closed("primary").is_connection_error());
    }

    #[test]
    fn duplicate_name_message() {
        let err = Error::duplicate_migration_name("Chunky");
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::DuplicateName));
        assert!(
            err.to_string()
                .contains("Multiple migrations have the name Chunky")
        );
    }

    #[test]
    fn migration_failed_keeps_cause() {
        let cause = Error::Custom("boom".to_string());
        let err = Error::migration_failed(3, "AddIndex", true, cause);
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::Failed));
        assert!(err.to_string().contains("this and all later migrations canceled"));

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn environment_errors() {
        let err = Error::environment_mismatch("test", "production");
        assert_eq!(err.environment_kind(), Some(EnvironmentErrorKind::Mismatch));
        assert!(err.to_string().contains("last run in `production`"));

        let err = Error::protected_environment("production");
        assert_eq!(err.environment_kind(), Some(EnvironmentErrorKind::Protected));
    }
}
