//! The connection pool.
//!
//! A [`ConnectionPool`] owns at most `size` connections. Each one is idle in
//! the pool, checked out to exactly one thread through a
//! [`PooledConnection`] guard, or briefly held by the reaper while it is
//! health-checked. Checkout blocks on a condition variable until a
//! connection is returned, a slot frees up, or the timeout elapses.

use crate::config::{PoolConfig, PoolStats};
use crate::reaper::Reaper;
use sqlshift_core::{Connection, Error, PoolError, PoolErrorKind, Result};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Creates new connections for a pool.
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection.
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Result<Box<dyn Connection>> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn Connection>> {
        self()
    }
}

struct IdleConnection {
    id: u64,
    conn: Box<dyn Connection>,
    idle_since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    /// Checked-out connection id -> owning thread
    owners: HashMap<u64, ThreadId>,
    /// Idle + checked out + being opened or reaped
    total: usize,
    waiting: usize,
    generation: u64,
    closed: bool,
    next_id: u64,
}

pub(crate) struct Shared {
    name: String,
    config: PoolConfig,
    factory: Box<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // State is updated in single steps, so a poisoned lock still holds consistent data
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(self: &Arc<Self>, timeout: Duration) -> Result<PooledConnection> {
        let start = Instant::now();
        let deadline = start + timeout;
        let owner = thread::current().id();
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(Error::pool_closed(&self.name));
            }

            if let Some(idle) = state.idle.pop_back() {
                state.owners.insert(idle.id, owner);
                let generation = state.generation;
                drop(state);
                return self.prepare(idle.id, idle.conn, generation);
            }

            if state.total < self.config.size {
                state.total += 1;
                let id = state.next_id;
                state.next_id += 1;
                let generation = state.generation;
                drop(state);
                return self.open_new(id, generation, owner);
            }

            let now = Instant::now();
            if now >= deadline {
                let busy = state.owners.len();
                tracing::warn!(
                    pool = %self.name,
                    size = self.config.size,
                    busy,
                    waiting = state.waiting,
                    "connection checkout timed out"
                );
                return Err(Error::connection_timeout(format!(
                    "could not obtain a connection from the pool '{}' within {:.3} seconds \
                     (waited {:.3} seconds); all pooled connections were in use",
                    self.name,
                    timeout.as_secs_f64(),
                    start.elapsed().as_secs_f64()
                )));
            }

            state.waiting += 1;
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            state.waiting -= 1;
        }
    }

    /// Open a connection for a slot already reserved in `total`.
    fn open_new(self: &Arc<Self>, id: u64, generation: u64, owner: ThreadId) -> Result<PooledConnection> {
        match self.factory.connect() {
            Ok(conn) => {
                let mut state = self.lock();
                state.owners.insert(id, owner);
                drop(state);
                tracing::debug!(pool = %self.name, id, "opened new pooled connection");
                Ok(PooledConnection {
                    conn: Some(conn),
                    id,
                    generation,
                    shared: Arc::clone(self),
                })
            }
            Err(err) => {
                self.release_slot(None);
                tracing::warn!(pool = %self.name, error = %err, "failed to open connection");
                Err(err)
            }
        }
    }

    /// Verify an idle connection before handing it out, reconnecting if it died.
    fn prepare(
        self: &Arc<Self>,
        id: u64,
        mut conn: Box<dyn Connection>,
        generation: u64,
    ) -> Result<PooledConnection> {
        if self.config.test_on_checkout && !conn.verify() {
            tracing::info!(pool = %self.name, id, "replacing dead connection on checkout");
            let revived = conn.reconnect().and_then(|()| {
                if conn.verify() {
                    Ok(())
                } else {
                    Err(Error::Connection(sqlshift_core::ConnectionError {
                        kind: sqlshift_core::ConnectionErrorKind::Disconnected,
                        message: "connection failed verification after reconnect".to_string(),
                        source: None,
                    }))
                }
            });
            if let Err(err) = revived {
                self.release_slot(Some(id));
                return Err(err);
            }
        }
        Ok(PooledConnection {
            conn: Some(conn),
            id,
            generation,
            shared: Arc::clone(self),
        })
    }

    /// Give back a slot whose connection is gone, and wake a waiter.
    fn release_slot(&self, id: Option<u64>) {
        let mut state = self.lock();
        if let Some(id) = id {
            state.owners.remove(&id);
        }
        state.total = state.total.saturating_sub(1);
        let closed = state.closed;
        drop(state);
        self.wake(closed);
    }

    /// A draining closer waits on the same condvar as checkout, so a closed
    /// pool must wake every waiter.
    fn wake(&self, closed: bool) {
        if closed {
            self.available.notify_all();
        } else {
            self.available.notify_one();
        }
    }

    fn checkin(&self, id: u64, generation: u64, mut conn: Box<dyn Connection>) {
        let mut healthy = true;
        while conn.transaction_depth() > 0 {
            if let Err(err) = conn.rollback_transaction() {
                tracing::warn!(pool = %self.name, id, error = %err, "discarding connection with a stuck transaction");
                healthy = false;
                break;
            }
        }

        let mut state = self.lock();
        state.owners.remove(&id);
        if !healthy || state.closed || generation != state.generation {
            state.total = state.total.saturating_sub(1);
            let closed = state.closed;
            drop(state);
            self.wake(closed);
            discard(&self.name, id, conn);
            return;
        }

        state.idle.push_back(IdleConnection {
            id,
            conn,
            idle_since: Instant::now(),
        });
        drop(state);
        tracing::trace!(pool = %self.name, id, "checked in connection");
        self.available.notify_one();
    }

    fn flush_idle(&self, min_idle: Option<Duration>) -> usize {
        let mut state = self.lock();
        let mut flushed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.idle.len());
        for idle in state.idle.drain(..) {
            let expired = min_idle.is_none_or(|min| idle.idle_since.elapsed() >= min);
            if expired {
                flushed.push(idle);
            } else {
                kept.push_back(idle);
            }
        }
        state.idle = kept;
        state.total = state.total.saturating_sub(flushed.len());
        drop(state);

        let count = flushed.len();
        if count > 0 {
            self.available.notify_all();
            for idle in flushed {
                discard(&self.name, idle.id, idle.conn);
            }
            tracing::debug!(pool = %self.name, count, "flushed idle connections");
        }
        count
    }

    pub(crate) fn reap(&self) -> usize {
        let (candidates, generation) = {
            let mut state = self.lock();
            // Still counted in `total` while they are checked
            let drained: Vec<IdleConnection> = state.idle.drain(..).collect();
            (drained, state.generation)
        };
        if candidates.is_empty() {
            return 0;
        }

        let mut alive = Vec::with_capacity(candidates.len());
        let mut dead = Vec::new();
        for mut idle in candidates {
            if idle.conn.is_active() && idle.conn.verify() {
                alive.push(idle);
            } else {
                dead.push(idle);
            }
        }

        let mut state = self.lock();
        let mut stale = Vec::new();
        if state.closed || state.generation != generation {
            stale.append(&mut alive);
        }
        for idle in alive {
            state.idle.push_front(idle);
        }
        let removed = dead.len() + stale.len();
        state.total = state.total.saturating_sub(removed);
        drop(state);

        self.available.notify_all();
        for idle in dead.into_iter().chain(stale) {
            discard(&self.name, idle.id, idle.conn);
        }
        if removed > 0 {
            tracing::info!(pool = %self.name, removed, "reaped dead connections");
        }
        removed
    }

    pub(crate) fn flush_expired(&self) -> usize {
        match self.config.idle_timeout_duration() {
            Some(idle_timeout) => self.flush_idle(Some(idle_timeout)),
            None => 0,
        }
    }

    fn disconnect(&self, close: bool) {
        let mut state = self.lock();
        state.generation += 1;
        if close {
            state.closed = true;
        }
        let drained: Vec<IdleConnection> = state.idle.drain(..).collect();
        state.total = state.total.saturating_sub(drained.len());
        let in_use = state.owners.len();
        drop(state);

        self.available.notify_all();
        for idle in drained {
            discard(&self.name, idle.id, idle.conn);
        }
        tracing::info!(pool = %self.name, closed = close, in_use, "disconnected pool");
    }

    /// Close the pool, then wait until every connection it handed out has
    /// been returned and closed.
    fn drain(&self, timeout: Duration) -> Result<()> {
        self.disconnect(true);
        let deadline = Instant::now() + timeout;
        let me = thread::current().id();
        let mut state = self.lock();

        loop {
            if state.total == 0 {
                drop(state);
                tracing::info!(pool = %self.name, "drained pool");
                return Ok(());
            }
            let in_use = state.total;
            if state.owners.values().any(|owner| *owner == me) {
                return Err(Error::pool_drain_timeout(
                    &self.name,
                    in_use,
                    "the calling thread holds one of them",
                ));
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(pool = %self.name, in_use, "gave up draining pool");
                return Err(Error::pool_drain_timeout(
                    &self.name,
                    in_use,
                    &format!("waited {:.3} seconds", timeout.as_secs_f64()),
                ));
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

fn discard(pool: &str, id: u64, mut conn: Box<dyn Connection>) {
    if let Err(err) = conn.disconnect() {
        tracing::warn!(pool, id, error = %err, "error while disconnecting pooled connection");
    }
}

/// A bounded, thread-safe pool of database connections.
pub struct ConnectionPool {
    shared: Arc<Shared>,
    reaper: Option<Reaper>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionPool {
    /// Create a pool. Connections are opened lazily on checkout.
    ///
    /// Starts a reaper thread when `reaping_frequency_ms` is set.
    pub fn new(
        name: impl Into<String>,
        config: PoolConfig,
        factory: impl ConnectionFactory + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            name: name.into(),
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                owners: HashMap::new(),
                total: 0,
                waiting: 0,
                generation: 0,
                closed: false,
                next_id: 1,
            }),
            available: Condvar::new(),
            config,
        });
        let reaper = shared
            .config
            .reaping_frequency_duration()
            .map(|frequency| Reaper::spawn(Arc::downgrade(&shared), frequency));
        tracing::debug!(pool = %shared.name, size = shared.config.size, "created connection pool");
        Ok(Self { shared, reaper })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Maximum number of connections.
    pub fn size(&self) -> usize {
        self.shared.config.size
    }

    /// Check out a connection, waiting up to `timeout` for one to free up.
    ///
    /// Fails with a connection timeout error when none became available.
    pub fn checkout(&self, timeout: Duration) -> Result<PooledConnection> {
        self.shared.checkout(timeout)
    }

    /// Check out a connection with the configured checkout timeout.
    pub fn checkout_default(&self) -> Result<PooledConnection> {
        self.checkout(self.shared.config.checkout_timeout_duration())
    }

    /// Return a connection to the pool. Dropping the guard does the same.
    pub fn checkin(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Check out a connection for the duration of `f`.
    ///
    /// The connection is checked back in however `f` exits, including by
    /// panic.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T>,
    {
        let mut conn = self.checkout_default()?;
        f(&mut *conn)
    }

    /// Evict a checked-out connection; its slot can be refilled.
    pub fn remove(&self, mut conn: PooledConnection) -> Result<()> {
        if !Arc::ptr_eq(&conn.shared, &self.shared) {
            return Err(Error::Pool(PoolError {
                kind: PoolErrorKind::ForeignConnection,
                message: format!(
                    "connection belongs to pool '{}', not '{}'",
                    conn.shared.name, self.shared.name
                ),
                source: None,
            }));
        }
        if let Some(inner) = conn.conn.take() {
            self.shared.release_slot(Some(conn.id));
            discard(&self.shared.name, conn.id, inner);
            tracing::debug!(pool = %self.shared.name, id = conn.id, "removed connection from pool");
        }
        Ok(())
    }

    /// Whether the calling thread holds a connection from this pool.
    pub fn active_connection(&self) -> bool {
        let me = thread::current().id();
        self.shared.lock().owners.values().any(|owner| *owner == me)
    }

    /// Disconnect and discard every idle connection.
    pub fn flush_idle_connections(&self) -> usize {
        self.shared.flush_idle(None)
    }

    /// Disconnect idle connections that have been idle for at least `min_idle`.
    pub fn flush(&self, min_idle: Duration) -> usize {
        self.shared.flush_idle(Some(min_idle))
    }

    /// Remove idle connections that fail a liveness check.
    pub fn reap(&self) -> usize {
        self.shared.reap()
    }

    /// Disconnect all connections. Idle ones close now, checked-out ones
    /// close when returned. The pool stays usable.
    pub fn disconnect(&self) {
        self.shared.disconnect(false);
    }

    /// Disconnect all connections and refuse further checkouts.
    pub fn close(&self) {
        self.shared.disconnect(true);
    }

    /// Close the pool and wait up to `timeout` for checked-out connections
    /// to come back; each one is closed on return.
    ///
    /// Fails with `DrainTimeout` if connections are still out when the
    /// timeout elapses, or at once if the calling thread holds one. The pool
    /// stays closed either way.
    pub fn drain(&self, timeout: Duration) -> Result<()> {
        self.shared.drain(timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.owners.len(),
            waiting: state.waiting,
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        // Stop the reaper before closing so it never sees a half-closed pool
        self.reaper.take();
        self.shared.disconnect(true);
    }
}

/// A connection checked out of a pool.
///
/// Dereferences to the connection. Dropping the guard checks the connection
/// back in; connections whose pool was disconnected meanwhile are closed
/// instead.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    id: u64,
    generation: u64,
    shared: Arc<Shared>,
}

impl PooledConnection {
    /// Pool-unique id of the underlying connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the pool this connection belongs to.
    pub fn pool_name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.shared.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn.as_ref(),
            None => unreachable!("pooled connection used after checkin"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn.as_mut(),
            None => unreachable!("pooled connection used after checkin"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.checkin(self.id, self.generation, conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFactory;
    use std::sync::atomic::Ordering;

    fn pool(size: usize, factory: FakeFactory) -> ConnectionPool {
        let config = PoolConfig::new(size)
            .checkout_timeout(200)
            .reaping_frequency(None);
        ConnectionPool::new("test", config, factory).unwrap()
    }

    #[test]
    fn test_checkout_reuses_returned_connection() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = pool(1, factory);

        let first = pool.checkout_default().unwrap();
        let id = first.id();
        pool.checkin(first);

        let second = pool.checkout_default().unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(control.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_checkout_times_out_at_capacity() {
        let pool = pool(2, FakeFactory::default());
        let _a = pool.checkout_default().unwrap();
        let _b = pool.checkout_default().unwrap();

        let start = Instant::now();
        let err = pool.checkout(Duration::from_millis(50)).unwrap_err();
        assert!(err.is_connection_timeout());
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(pool.stats().total_connections, 2);
    }

    #[test]
    fn test_failed_connect_releases_slot() {
        let factory = FakeFactory::default();
        factory.control().fail_connects.store(1, Ordering::SeqCst);
        let pool = pool(1, factory);

        assert!(pool.checkout_default().is_err());
        assert_eq!(pool.stats().total_connections, 0);
        assert!(pool.checkout_default().is_ok());
    }

    #[test]
    fn test_remove_frees_capacity() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = pool(1, factory);

        let conn = pool.checkout_default().unwrap();
        let id = conn.id();
        pool.remove(conn).unwrap();
        assert_eq!(pool.stats().total_connections, 0);

        let replacement = pool.checkout_default().unwrap();
        assert_ne!(replacement.id(), id);
        assert_eq!(control.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_rejects_foreign_connection() {
        let a = pool(1, FakeFactory::default());
        let b = pool(1, FakeFactory::default());
        let conn = b.checkout_default().unwrap();
        let err = a.remove(conn).unwrap_err();
        assert!(matches!(err, Error::Pool(ref p) if p.kind == PoolErrorKind::ForeignConnection));
        // the guard went back to its own pool
        assert_eq!(b.stats().idle_connections, 1);
    }

    #[test]
    fn test_dead_connection_is_reconnected_on_checkout() {
        let factory = FakeFactory::default();
        let pool = pool(1, factory);

        let mut conn = pool.checkout_default().unwrap();
        conn.disconnect().unwrap();
        let id = conn.id();
        drop(conn);

        let conn = pool.checkout_default().unwrap();
        assert_eq!(conn.id(), id);
        assert!(conn.is_active());
    }

    #[test]
    fn test_failed_reconnect_surfaces_and_frees_slot() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = pool(1, factory);

        let mut conn = pool.checkout_default().unwrap();
        conn.disconnect().unwrap();
        drop(conn);
        control.fail_reconnects.store(true, Ordering::SeqCst);

        assert!(pool.checkout_default().is_err());
        assert_eq!(pool.stats().total_connections, 0);
        control.fail_reconnects.store(false, Ordering::SeqCst);
        assert!(pool.checkout_default().is_ok());
    }

    #[test]
    fn test_active_connection_tracks_calling_thread() {
        let pool = Arc::new(pool(2, FakeFactory::default()));
        assert!(!pool.active_connection());
        let conn = pool.checkout_default().unwrap();
        assert!(pool.active_connection());

        let other = Arc::clone(&pool);
        let seen = thread::spawn(move || other.active_connection()).join().unwrap();
        assert!(!seen);

        drop(conn);
        assert!(!pool.active_connection());
    }

    #[test]
    fn test_with_connection_checks_in_after_error_and_panic() {
        let pool = pool(1, FakeFactory::default());

        let result: Result<()> =
            pool.with_connection(|_| Err(Error::Custom("boom".to_string())));
        assert!(result.is_err());
        assert_eq!(pool.stats().idle_connections, 1);

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = pool.with_connection(|_| panic!("inside block"));
        }));
        assert!(panicked.is_err());
        assert_eq!(pool.stats().idle_connections, 1);
        assert_eq!(pool.stats().active_connections, 0);
    }

    #[test]
    fn test_checkin_rolls_back_open_transaction() {
        let pool = pool(1, FakeFactory::default());
        let mut conn = pool.checkout_default().unwrap();
        conn.begin_transaction().unwrap();
        drop(conn);

        let conn = pool.checkout_default().unwrap();
        assert_eq!(conn.transaction_depth(), 0);
    }

    #[test]
    fn test_flush_idle_connections() {
        let pool = pool(2, FakeFactory::default());
        let a = pool.checkout_default().unwrap();
        let b = pool.checkout_default().unwrap();
        drop(a);

        assert_eq!(pool.flush_idle_connections(), 1);
        let stats = pool.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.idle_connections, 0);
        drop(b);
        assert_eq!(pool.stats().idle_connections, 1);
    }

    #[test]
    fn test_flush_respects_min_idle() {
        let pool = pool(1, FakeFactory::default());
        drop(pool.checkout_default().unwrap());

        assert_eq!(pool.flush(Duration::from_secs(60)), 0);
        assert_eq!(pool.flush(Duration::ZERO), 1);
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[test]
    fn test_reap_removes_dead_idle_connections() {
        let pool = pool(2, FakeFactory::default());
        let mut a = pool.checkout_default().unwrap();
        let b = pool.checkout_default().unwrap();
        a.disconnect().unwrap();
        drop(a);
        drop(b);

        assert_eq!(pool.reap(), 1);
        let stats = pool.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.idle_connections, 1);
    }

    #[test]
    fn test_disconnect_closes_checked_out_connections_on_checkin() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = pool(2, factory);

        let held = pool.checkout_default().unwrap();
        drop(pool.checkout_default().unwrap());
        pool.disconnect();
        assert_eq!(control.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().total_connections, 1);

        drop(held);
        assert_eq!(control.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().total_connections, 0);

        // still usable
        assert!(pool.checkout_default().is_ok());
    }

    #[test]
    fn test_closed_pool_refuses_checkout() {
        let pool = pool(1, FakeFactory::default());
        pool.close();
        assert!(pool.is_closed());
        let err = pool.checkout_default().unwrap_err();
        assert!(matches!(err, Error::Pool(ref p) if p.kind == PoolErrorKind::Closed));
    }

    #[test]
    fn test_drain_waits_for_checked_out_connections() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = pool(2, factory);
        drop(pool.checkout_default().unwrap());

        let held = pool.checkout_default().unwrap();
        let returner = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(held);
        });

        pool.drain(Duration::from_secs(5)).unwrap();
        returner.join().unwrap();
        assert!(pool.is_closed());
        assert_eq!(pool.stats().total_connections, 0);
        assert_eq!(control.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drain_times_out_while_connections_are_out() {
        let pool = Arc::new(pool(1, FakeFactory::default()));
        let (taken_tx, taken_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let conn = pool.checkout_default().unwrap();
                taken_tx.send(()).unwrap();
                let _ = release_rx.recv();
                drop(conn);
            })
        };
        taken_rx.recv().unwrap();

        let err = pool.drain(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, Error::Pool(ref p) if p.kind == PoolErrorKind::DrainTimeout));
        assert!(pool.is_closed());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[test]
    fn test_drain_fails_fast_when_caller_holds_a_connection() {
        let pool = pool(1, FakeFactory::default());
        let held = pool.checkout_default().unwrap();
        let started = Instant::now();
        let err = pool.drain(Duration::from_secs(5)).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(err.to_string().contains("calling thread"));
        drop(held);
        assert_eq!(pool.stats().total_connections, 0);
    }

    #[test]
    fn test_waiter_is_woken_by_checkin() {
        let pool = Arc::new(pool(1, FakeFactory::default()));
        let held = pool.checkout_default().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.checkout(Duration::from_secs(5)).map(|c| c.id()))
        };
        while pool.stats().waiting == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let id = held.id();
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), id);
    }

    #[test]
    fn test_concurrent_checkouts_never_exceed_size() {
        let factory = FakeFactory::default();
        let control = factory.control();
        let pool = Arc::new(ConnectionPool::new(
            "stress",
            PoolConfig::new(3).checkout_timeout(5_000).reaping_frequency(None),
            factory,
        )
        .unwrap());

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..20 {
                        pool.with_connection(|conn| {
                            conn.execute("work", &[])?;
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(control.peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.stats().total_connections <= 3);
    }
}
