use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use sqlshift_core::{Connection, DatabaseConfig, Value};
use sqlshift_pool::{AdapterRegistry, ConnectionHandler, ConnectionPool, PoolConfig};
use sqlshift_sqlite::{SqliteConfig, SqliteConnection};

/// A database file under the temp dir, removed on drop.
struct TempDb {
    path: String,
}

impl TempDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "sqlshift_pool_{}_{}.sqlite3",
            name,
            std::process::id()
        ));
            Self {
            path: path.to_string_lossy().into_owned(),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn sqlite_pool(path: &str, size: usize, timeout_ms: u64) -> ConnectionPool {
    let config = SqliteConfig::file(path);
    ConnectionPool::new(
        "primary",
        PoolConfig::new(size)
            .checkout_timeout(timeout_ms)
            .reaping_frequency(None),
        move || {
            SqliteConnection::open(&config).map(|c| Box::new(c) as Box<dyn Connection>)
        },
    )
    .expect("create pool")
}

#[test]
fn sequential_threads_share_a_single_connection() {
    let db = TempDb::new("sequential");
    let pool = Arc::new(sqlite_pool(db.path(), 1, 1_000));

    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            pool.with_connection(|conn| {
                conn.query("SELECT 1", &[])?;
                Ok(())
            })
            .expect("checkout");
        })
        .join()
        .expect("thread");
    }

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.idle_connections, 1);
}

#[test]
fn checkout_beyond_size_times_out_until_checkin() {
    let db = TempDb::new("timeout");
    let pool = Arc::new(sqlite_pool(db.path(), 2, 100));

    let a = pool.checkout_default().expect("first");
    let b = pool.checkout_default().expect("second");

    let contender = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.checkout(Duration::from_millis(50)).map(|c| c.id()))
    };
    let err = contender.join().expect("thread").unwrap_err();
    assert!(err.is_connection_timeout());
    assert!(err.is_retryable());

    drop(a);
    let c = pool.checkout(Duration::from_millis(50)).expect("after checkin");
    drop((b, c));
}

#[test]
fn connections_see_each_others_commits() {
    let db = TempDb::new("shared");
    let pool = sqlite_pool(db.path(), 2, 1_000);

    let mut writer = pool.checkout_default().expect("writer");
    writer
        .execute_batch("CREATE TABLE events (name TEXT)")
        .expect("create");
    writer
        .execute("INSERT INTO events (name) VALUES (?)", &[Value::from("boot")])
        .expect("insert");

    let mut reader = pool.checkout_default().expect("reader");
    assert_ne!(writer.id(), reader.id());
    let rows = reader.query("SELECT name FROM events", &[]).expect("select");
    assert_eq!(rows.len(), 1);
    drop((writer, reader));
}

#[test]
fn disconnected_sqlite_connection_is_replaced_transparently() {
    let db = TempDb::new("revive");
    let pool = sqlite_pool(db.path(), 1, 1_000);

    let mut conn = pool.checkout_default().expect("checkout");
    conn.disconnect().expect("disconnect");
    drop(conn);

    let mut conn = pool.checkout_default().expect("checkout after disconnect");
    assert!(conn.is_active());
    assert!(conn.verify());
    drop(conn);
}

#[test]
fn handler_builds_pools_through_registered_adapter() {
    let db = TempDb::new("handler");
    let registry = Arc::new(AdapterRegistry::new());
    registry.register("sqlite3", |config: &DatabaseConfig| {
        SqliteConnection::open(&SqliteConfig::from(config))
            .map(|c| Box::new(c) as Box<dyn Connection>)
    });
    let handler = ConnectionHandler::new(registry);

    let config = DatabaseConfig::new("sqlite3", db.path())
        .pool(1)
        .reaping_frequency(None);
    let pool = handler.establish_connection("primary", config).expect("establish");
    pool.with_connection(|conn| conn.execute_batch("CREATE TABLE t (id INTEGER)"))
        .expect("create");

    let removed = handler
        .remove_connection("primary")
        .expect("drained")
        .expect("removed");
    assert_eq!(removed.database, db.path());
}

#[test]
fn replacing_a_pool_closes_sessions_held_from_the_old_one() {
    let db = TempDb::new("replace");
    let registry = Arc::new(AdapterRegistry::new());
    registry.register("sqlite3", |config: &DatabaseConfig| {
        SqliteConnection::open(&SqliteConfig::from(config))
            .map(|c| Box::new(c) as Box<dyn Connection>)
    });
    let handler = ConnectionHandler::new(registry);
    let config = DatabaseConfig::new("sqlite3", db.path())
        .pool(1)
        .checkout_timeout(5.0)
        .reaping_frequency(None);
    let old = handler
        .establish_connection("primary", config.clone())
        .expect("establish");

    let (checked_out, ready) = mpsc::channel();
    let holder = {
        let old = Arc::clone(&old);
        thread::spawn(move || {
            let held = old.checkout_default().expect("checkout");
            checked_out.send(()).expect("signal");
            thread::sleep(Duration::from_millis(50));
            drop(held);
        })
    };
    ready.recv().expect("holder checked out");

    let new = handler
        .establish_connection("primary", config)
        .expect("replace after drain");
    holder.join().expect("thread");

    // the old session was returned and closed before the new pool appeared
    assert!(old.is_closed());
    assert_eq!(old.stats().total_connections, 0);
    assert!(!Arc::ptr_eq(&old, &new));
    new.with_connection(|conn| conn.query("SELECT 1", &[]).map(|_| ()))
        .expect("new pool works");
}
