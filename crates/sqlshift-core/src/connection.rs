//! Database connection traits.
//!
//! A [`Connection`] owns exactly one database session. It is `Send` so the
//! pool can hand it between threads, and every operation takes `&mut self`,
//! so a checked-out connection is never used by two threads at once.

use crate::Result;
use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;

/// A single stateful database session.
///
/// Transactions nest: the outermost `begin_transaction` opens a real
/// transaction and inner calls open savepoints, so `transaction_depth`
/// counts both.
pub trait Connection: Send {
    /// Adapter name this connection was built by (`"sqlite3"`, ...).
    fn adapter_name(&self) -> &str;

    /// Dialect used to render schema statements.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute one or more `;`-separated statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Execute a query and return the first row, if any.
    fn query_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Open a transaction, or a savepoint when one is already open.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the innermost transaction or release its savepoint.
    fn commit_transaction(&mut self) -> Result<()>;

    /// Roll back the innermost transaction or savepoint.
    fn rollback_transaction(&mut self) -> Result<()>;

    /// Number of open transaction levels (0 when idle).
    fn transaction_depth(&self) -> usize;

    /// Create a named savepoint.
    fn create_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = format!("SAVEPOINT {}", self.dialect().quote_ident(name));
        self.execute_batch(&sql)
    }

    /// Roll back to a named savepoint.
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", self.dialect().quote_ident(name));
        self.execute_batch(&sql)
    }

    /// Release a named savepoint.
    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = format!("RELEASE SAVEPOINT {}", self.dialect().quote_ident(name));
        self.execute_batch(&sql)
    }

    /// Whether schema changes participate in transactions.
    fn supports_ddl_transactions(&self) -> bool {
        self.dialect().supports_ddl_transactions()
    }

    /// Whether the underlying session handle is open.
    fn is_active(&self) -> bool;

    /// Check the session with a round trip to the database.
    fn verify(&mut self) -> bool {
        self.is_active() && self.query("SELECT 1", &[]).is_ok()
    }

    /// Close and reopen the session. Open transactions are lost.
    fn reconnect(&mut self) -> Result<()>;

    /// Close the session. Further statements fail until `reconnect`.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether a table with this name exists.
    fn table_exists(&mut self, name: &str) -> Result<bool>;

    /// Names of all user tables.
    fn tables(&mut self) -> Result<Vec<String>>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn adapter_name(&self) -> &str {
        (**self).adapter_name()
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        (**self).begin_transaction()
    }

    fn commit_transaction(&mut self) -> Result<()> {
        (**self).commit_transaction()
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        (**self).rollback_transaction()
    }

    fn transaction_depth(&self) -> usize {
        (**self).transaction_depth()
    }

    fn supports_ddl_transactions(&self) -> bool {
        (**self).supports_ddl_transactions()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn verify(&mut self) -> bool {
        (**self).verify()
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        (**self).table_exists(name)
    }

    fn tables(&mut self) -> Result<Vec<String>> {
        (**self).tables()
    }
}

/// Run `f` inside a transaction.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. Inside
/// an open transaction this uses a savepoint, so an inner failure only
/// discards the inner work.
pub fn transaction<T, F>(conn: &mut dyn Connection, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn Connection) -> Result<T>,
{
    conn.begin_transaction()?;
    match f(conn) {
        Ok(value) => {
            conn.commit_transaction()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback_transaction() {
                tracing::warn!(
                    error = %rollback_err,
                    depth = conn.transaction_depth(),
                    "rollback after failed transaction also failed"
                );
            }
            Err(err)
        }
    }
}
