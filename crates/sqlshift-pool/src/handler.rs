//! Registry of connection pools by logical name.

use crate::config::PoolConfig;
use crate::pool::ConnectionPool;
use sqlshift_core::{
    Connection, ConnectionError, ConnectionErrorKind, DatabaseConfig, Error, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Opens a connection for a database configuration.
pub type AdapterFn = dyn Fn(&DatabaseConfig) -> Result<Box<dyn Connection>> + Send + Sync;

/// Maps adapter names (`"sqlite3"`) to the functions that open connections.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<AdapterFn>>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an adapter.
    pub fn register<F>(&self, name: impl Into<String>, open: F)
    where
        F: Fn(&DatabaseConfig) -> Result<Box<dyn Connection>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(adapter = %name, "registered adapter");
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(open));
    }

    /// Look up an adapter by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<AdapterFn>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::AdapterNotFound,
                    message: format!(
                        "database configuration specifies nonexistent '{}' adapter",
                        name
                    ),
                    source: None,
                })
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

struct PoolEntry {
    config: DatabaseConfig,
    pool: Arc<ConnectionPool>,
}

/// Owns one connection pool per logical connection name.
///
/// Establishing a name that already has a pool drains the old pool before
/// the new one is published: the old pool is unlisted and closed, and every
/// connection checked out from it is closed as it comes back. While that
/// happens the name has no pool.
pub struct ConnectionHandler {
    adapters: Arc<AdapterRegistry>,
    pools: RwLock<HashMap<String, PoolEntry>>,
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("adapters", &self.adapters)
            .field("pools", &self.connection_pool_names())
            .finish()
    }
}

impl ConnectionHandler {
    pub fn new(adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            adapters,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PoolEntry>> {
        self.pools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PoolEntry>> {
        self.pools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the pool for `name`, replacing any existing one.
    #[tracing::instrument(level = "info", skip(self, config), fields(adapter = %config.adapter))]
    pub fn establish_connection(
        &self,
        name: &str,
        config: DatabaseConfig,
    ) -> Result<Arc<ConnectionPool>> {
        config.validate()?;
        let open = self.adapters.resolve(&config.adapter)?;
        let factory_config = config.clone();
        let factory = move || open(&factory_config);
        let pool = Arc::new(ConnectionPool::new(name, PoolConfig::from(&config), factory)?);

        let previous = self.write().remove(name);
        if let Some(previous) = previous {
            drain(name, &previous)?;
            tracing::info!(pool = name, "replaced existing connection pool");
        }
        self.write().insert(
            name.to_string(),
            PoolEntry {
                config,
                pool: Arc::clone(&pool),
            },
        );
        Ok(pool)
    }

    /// The pool for `name`, if one has been established.
    pub fn retrieve_connection_pool(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        self.read().get(name).map(|entry| Arc::clone(&entry.pool))
    }

    /// The configuration `name` was established with.
    pub fn connection_config(&self, name: &str) -> Option<DatabaseConfig> {
        self.read().get(name).map(|entry| entry.config.clone())
    }

    /// Whether `name` has an established pool.
    pub fn connected(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// All established pools, ordered by name.
    pub fn connection_pool_list(&self) -> Vec<Arc<ConnectionPool>> {
        let pools = self.read();
        let mut entries: Vec<(&String, &PoolEntry)> = pools.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, entry)| Arc::clone(&entry.pool))
            .collect()
    }

    pub fn connection_pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drain and forget the pool for `name`, returning its configuration.
    ///
    /// The name is unlisted even when draining times out.
    pub fn remove_connection(&self, name: &str) -> Result<Option<DatabaseConfig>> {
        let Some(entry) = self.write().remove(name) else {
            return Ok(None);
        };
        drain(name, &entry)?;
        tracing::info!(pool = name, "removed connection pool");
        Ok(Some(entry.config))
    }

    /// Disconnect every connection in every pool. Pools stay usable.
    pub fn clear_all_connections(&self) {
        for pool in self.connection_pool_list() {
            pool.disconnect();
        }
    }

    /// Disconnect idle connections in every pool.
    pub fn flush_idle_connections(&self) -> usize {
        self.connection_pool_list()
            .iter()
            .map(|pool| pool.flush_idle_connections())
            .sum()
    }

    /// Whether the calling thread holds a connection from any pool.
    pub fn active_connections(&self) -> bool {
        self.connection_pool_list()
            .iter()
            .any(|pool| pool.active_connection())
    }
}

/// Wait up to the pool's checkout timeout for its connections to come back.
fn drain(name: &str, entry: &PoolEntry) -> Result<()> {
    let timeout = entry.pool.config().checkout_timeout_duration();
    entry.pool.drain(timeout).inspect_err(|err| {
        tracing::warn!(pool = name, error = %err, "previous connection pool did not drain");
    })
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        for (_, entry) in self.write().drain() {
            entry.pool.close();
        }
    }
}
