//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the `Connection` trait from sqlshift-core.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)] // Clearer for error handling

use crate::ffi;
use crate::types;
use sqlshift_core::{
    ColumnInfo, Connection, DatabaseConfig, Dialect, Error, Result, Row, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Adapter name SQLite connections register under.
pub const ADAPTER_NAME: &str = "sqlite3";

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

impl From<&DatabaseConfig> for SqliteConfig {
    fn from(config: &DatabaseConfig) -> Self {
        if config.database.is_empty() {
            Self::memory()
        } else {
            Self::file(config.database.clone())
        }
    }
}

/// A connection to a SQLite database.
///
/// Owns one `sqlite3` handle. The handle is null while disconnected;
/// `reconnect` reopens it with the original configuration.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    config: SqliteConfig,
    depth: usize,
}

// SAFETY: the handle is only touched through `&mut self`, so it is never
// used from two threads at once; SQLite allows moving a connection between
// threads in its default threading mode.
unsafe impl Send for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.config.path)
            .field("connected", &!self.db.is_null())
            .field("transaction_depth", &self.depth)
            .finish()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let db = open_handle(config)?;
        tracing::debug!(path = %config.path, "opened sqlite connection");
        Ok(Self {
            db,
            config: config.clone(),
            depth: 0,
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.config.path
    }

    fn handle(&self) -> Result<*mut ffi::sqlite3> {
        if self.db.is_null() {
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: format!("connection to '{}' is closed", self.config.path),
                source: None,
            }))
        } else {
            Ok(self.db)
        }
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    pub fn execute_raw(&mut self, sql: &str) -> Result<()> {
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let msg = if !errmsg.is_null() {
                // SAFETY: errmsg was allocated by sqlite3_exec
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message: msg,
                source: None,
            }));
        }

        Ok(())
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> Result<u64> {
        let db = self.handle()?;
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(db) };
        Ok(changes.max(0) as u64)
    }

    /// Prepare and execute a query, returning all rows.
    fn query_rows(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let db = self.handle()?;
        let stmt = Statement::prepare(db, sql)?;
        stmt.bind_all(db, sql, params)?;

        let col_count = stmt.column_count();
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name = unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            match stmt.step() {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        let value = unsafe { types::read_column(stmt.raw, i) };
                        values.push(value);
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(db, sql)),
            }
        }

        tracing::trace!(sql, rows = rows.len(), "sqlite query");
        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    fn execute_stmt(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let db = self.handle()?;
        let stmt = Statement::prepare(db, sql)?;
        stmt.bind_all(db, sql, params)?;

        match stmt.step() {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                drop(stmt);
                let changes = self.changes()?;
                tracing::trace!(sql, changes, "sqlite execute");
                Ok(changes)
            }
            _ => Err(step_error(db, sql)),
        }
    }

    fn savepoint_name(level: usize) -> String {
        format!("sqlshift_{}", level)
    }

    fn close_handle(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and no statements outlive their calls
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
        }
        self.depth = 0;
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close_handle();
    }
}

impl Connection for SqliteConnection {
    fn adapter_name(&self) -> &str {
        ADAPTER_NAME
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query_rows(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute_stmt(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.execute_raw(sql)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.execute_raw("BEGIN")?;
        } else {
            let name = Self::savepoint_name(self.depth);
            self.execute_raw(&format!("SAVEPOINT {}", name))?;
        }
        self.depth += 1;
        tracing::trace!(depth = self.depth, "begin transaction");
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        match self.depth {
            0 => Err(not_in_transaction("commit")),
            1 => {
                self.execute_raw("COMMIT")?;
                self.depth = 0;
                Ok(())
            }
            depth => {
                let name = Self::savepoint_name(depth - 1);
                self.execute_raw(&format!("RELEASE SAVEPOINT {}", name))?;
                self.depth -= 1;
                Ok(())
            }
        }
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        match self.depth {
            0 => Err(not_in_transaction("rollback")),
            1 => {
                self.depth = 0;
                // SQLite may already have rolled back on its own (e.g. after SQLITE_FULL)
                if self.in_autocommit() {
                    return Ok(());
                }
                self.execute_raw("ROLLBACK")
            }
            depth => {
                self.depth -= 1;
                let name = Self::savepoint_name(depth - 1);
                self.execute_raw(&format!(
                    "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
                ))
            }
        }
    }

    fn transaction_depth(&self) -> usize {
        self.depth
    }

    fn is_active(&self) -> bool {
        !self.db.is_null()
    }

    fn reconnect(&mut self) -> Result<()> {
        self.close_handle();
        self.db = open_handle(&self.config)?;
        tracing::debug!(path = %self.config.path, "reconnected sqlite connection");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.close_handle();
        tracing::debug!(path = %self.config.path, "disconnected sqlite connection");
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let rows = self.query_rows(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::Text(name.to_string())],
        )?;
        Ok(!rows.is_empty())
    }

    fn tables(&mut self) -> Result<Vec<String>> {
        let rows = self.query_rows(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        rows.iter().map(|row| row.get_as::<String>(0)).collect()
    }
}

impl SqliteConnection {
    fn in_autocommit(&self) -> bool {
        if self.db.is_null() {
            return true;
        }
        // SAFETY: db is valid
        let autocommit = unsafe { ffi::sqlite3_get_autocommit(self.db) };
        autocommit != 0
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(prepare_error(db, sql));
        }
        if stmt.is_null() {
            // Empty statement (only whitespace or comments)
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: "empty statement".to_string(),
                source: None,
            }));
        }
        Ok(Self { raw: stmt })
    }

    fn bind_all(&self, db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(db, sql, i + 1));
            }
        }
        Ok(())
    }

    fn column_count(&self) -> c_int {
        // SAFETY: stmt is valid
        unsafe {
            ffi::sqlite3_column_count(self.raw)
        }
    }

    fn step(&self) -> c_int {
        // SAFETY: stmt is valid
        unsafe {
            ffi::sqlite3_step(self.raw)
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

fn open_handle(config: &SqliteConfig) -> Result<*mut ffi::sqlite3> {
    let c_path = CString::new(config.path.as_str()).map_err(|_| {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: "Invalid path: contains null byte".to_string(),
            source: None,
        })
    })?;

    let mut db: *mut ffi::sqlite3 = ptr::null_mut();
    let flags = config.flags.to_sqlite_flags();

    // SAFETY: We pass valid pointers and check the return value
    let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

    if rc != ffi::SQLITE_OK {
        let msg = if !db.is_null() {
            // SAFETY: db is valid, errmsg returns a valid C string
            unsafe {
                let msg = errmsg(db);
                ffi::sqlite3_close_v2(db);
                msg
            }
        } else {
            ffi::error_string(rc).to_string()
        };

        return Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: format!("Failed to open database '{}': {}", config.path, msg),
            source: None,
        }));
    }

    if config.busy_timeout_ms > 0 {
        // SAFETY: db is valid
        unsafe {
            ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms.min(i32::MAX as u32) as c_int);
        }
    }

    Ok(db)
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: caller guarantees db is valid
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn not_in_transaction(action: &str) -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::NotActive,
        message: format!("cannot {}: not in a transaction", action),
    })
}

fn prepare_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
        source: None,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };

    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        message: format!("Failed to bind parameter {}: {}", param_index, msg),
        source: None,
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended result codes carry the primary code in the low byte
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Interrupted,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlshift_core::transaction;

    /// A database file path, removed on drop.
    struct TempPath(String);

    impl TempPath {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "sqlshift_sqlite_{}_{}.db",
                name,
                std::process::id()
            ));
            let _ = std::fs::remove_file(&path);
            Self(path.to_string_lossy().into_owned())
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(conn.is_active());
        assert_eq!(conn.adapter_name(), "sqlite3");
    }

    #[test]
    fn test_execute_and_query() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();

        let changed = conn
            .execute(
                "INSERT INTO users (name, score) VALUES (?, ?)",
                &[Value::Text("Alice".into()), Value::Double(9.5)],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let rows = conn
            .query("SELECT id, name, score FROM users WHERE name = ?", &[Value::from("Alice")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get_named::<f64>("score").unwrap(), 9.5);
    }

    #[test]
    fn test_syntax_error() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute("SELEKT 1", &[]).unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.sql.as_deref() == Some("SELEKT 1")));
    }

    #[test]
    fn test_constraint_error_kind() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();
        let err = conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Constraint));
    }

    #[test]
    fn test_transaction_rollback_discards_ddl() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let result: Result<()> = transaction(&mut conn, |c| {
            c.execute_batch("CREATE TABLE scratch (id INTEGER)")?;
            Err(Error::Custom("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(!conn.table_exists("scratch").unwrap());
        assert_eq!(conn.transaction_depth(), 0);
    }

    #[test]
    fn test_nested_transactions_use_savepoints() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        transaction(&mut conn, |outer| {
            outer.execute("INSERT INTO t (v) VALUES (1)", &[])?;
            assert_eq!(outer.transaction_depth(), 1);
            let inner: Result<()> = transaction(outer, |inner| {
                assert_eq!(inner.transaction_depth(), 2);
                inner.execute("INSERT INTO t (v) VALUES (2)", &[])?;
                Err(Error::Custom("inner".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        let rows = conn.query("SELECT v FROM t ORDER BY v", &[]).unwrap();
        let values: Vec<i64> = rows.iter().map(|r| r.get_as(0).unwrap()).collect();
        assert_eq!(values, [1]);
    }

    #[test]
    fn test_commit_without_transaction() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        assert!(matches!(
            conn.commit_transaction(),
            Err(Error::Transaction(ref t)) if t.kind == TransactionErrorKind::NotActive
        ));
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let path = TempPath::new("reconnect");
        let mut conn = SqliteConnection::open_file(&path.0).unwrap();
        conn.execute_batch("CREATE TABLE kept (id INTEGER)").unwrap();

        conn.disconnect().unwrap();
        assert!(!conn.is_active());
        assert!(!conn.verify());
        let err = conn.query("SELECT 1", &[]).unwrap_err();
        assert!(err.is_connection_error());

        conn.reconnect().unwrap();
        assert!(conn.verify());
        assert!(conn.table_exists("kept").unwrap());
    }

    #[test]
    fn test_tables_lists_user_tables() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE b (id INTEGER); CREATE TABLE a (id INTEGER);")
            .unwrap();
        assert_eq!(conn.tables().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_config_from_database_config() {
        let config = SqliteConfig::from(&DatabaseConfig::new("sqlite3", "db/test.sqlite3"));
        assert_eq!(config.path, "db/test.sqlite3");
        let memory = SqliteConfig::from(&DatabaseConfig::new("sqlite3", ""));
        assert_eq!(memory.path, ":memory:");
    }

    #[test]
    fn test_open_failure() {
        let config = SqliteConfig::file("/nonexistent-dir/sub/x.db").flags(OpenFlags::read_write());
        let err = SqliteConnection::open(&config).unwrap_err();
        assert!(matches!(err, Error::Connection(ref c) if c.kind == ConnectionErrorKind::Connect));
    }
}
