//! The database context handle.
//!
//! A [`Database`] owns the [`ConnectionHandler`] for one process together
//! with the current environment name and the migrations registered in
//! code. Everything that needs a connection checks one out from the named
//! pool and returns it before the call completes.
//!
//! # Example
//!
//! ```no_run
//! use sqlshift::prelude::*;
//!
//! let db = Database::builder().environment("development").build();
//! db.establish(PRIMARY, DatabaseConfig::new("sqlite3", "db/development.sqlite3"))?;
//! db.migrate(PRIMARY, &MigrateOptions::from_env()?)?;
//! # Ok::<(), sqlshift::Error>(())
//! ```

use crate::options::MigrateOptions;
use sqlshift_core::{Connection, DatabaseConfig, DatabaseConfigurations, Error, Result};
use sqlshift_pool::{AdapterRegistry, ConnectionHandler, ConnectionPool};
use sqlshift_schema::{
    DEFAULT_ENVIRONMENT, DEFAULT_MIGRATIONS_PATH, Migration, MigrationContext, MigrationProxy,
    MigrationStatus,
};
use sqlshift_sqlite::{SqliteConfig, SqliteConnection};
use std::path::PathBuf;
use std::sync::Arc;

/// Register the adapters compiled into this crate (`sqlite3`, `sqlite`).
pub fn register_default_adapters(registry: &AdapterRegistry) {
    for name in [sqlshift_sqlite::ADAPTER_NAME, "sqlite"] {
        registry.register(name, |config: &DatabaseConfig| {
            let conn = SqliteConnection::open(&SqliteConfig::from(config))?;
            Ok(Box::new(conn) as Box<dyn Connection>)
        });
    }
}

/// Connection pools, environment and registered migrations for one process.
#[derive(Debug)]
pub struct Database {
    handler: Arc<ConnectionHandler>,
    environment: String,
    migrations: Vec<Arc<Migration>>,
    protected_environments: Option<Vec<String>>,
    environment_check: Option<bool>,
}

impl Default for Database {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Database {
    /// A database in the default environment with the built-in adapters.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn handler(&self) -> &Arc<ConnectionHandler> {
        &self.handler
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        self.handler.adapters()
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Create (or replace) the pool for `name`.
    pub fn establish(&self, name: &str, config: DatabaseConfig) -> Result<Arc<ConnectionPool>> {
        self.handler.establish_connection(name, config)
    }

    /// Establish every configuration of the current environment.
    ///
    /// Returns the established names, `primary` first.
    pub fn establish_all(&self, configs: &DatabaseConfigurations) -> Result<Vec<String>> {
        let entries = configs.configs_for(&self.environment);
        if entries.is_empty() {
            return Err(Error::config(format!(
                "no database configuration for environment '{}'",
                self.environment
            )));
        }
        let mut names = Vec::with_capacity(entries.len());
        for (name, config) in entries {
            self.establish(name, config.clone())?;
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// The pool for `name`.
    pub fn pool(&self, name: &str) -> Result<Arc<ConnectionPool>> {
        self.handler
            .retrieve_connection_pool(name)
            .ok_or_else(|| Error::connection_not_established(name))
    }

    pub fn connected(&self, name: &str) -> bool {
        self.handler.connected(name)
    }

    /// Check out a connection from `name` for the duration of `f`.
    pub fn with_connection<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T>,
    {
        self.pool(name)?.with_connection(f)
    }

    /// Drain and forget the pool for `name`, returning its configuration.
    pub fn remove_connection(&self, name: &str) -> Result<Option<DatabaseConfig>> {
        self.handler.remove_connection(name)
    }

    pub fn clear_all_connections(&self) {
        self.handler.clear_all_connections();
    }

    pub fn flush_idle_connections(&self) -> usize {
        self.handler.flush_idle_connections()
    }

    // ------------------------------------------------------------------
    // Migrations
    // ------------------------------------------------------------------

    /// A migration context for the database behind `name`.
    ///
    /// Paths come from the connection's `migrations_paths`, defaulting to
    /// `db/migrate`.
    pub fn migration_context(&self, name: &str) -> Result<MigrationContext> {
        let config = self
            .handler
            .connection_config(name)
            .ok_or_else(|| Error::connection_not_established(name))?;
        let paths: Vec<PathBuf> = if config.migrations_paths.is_empty() {
            vec![PathBuf::from(DEFAULT_MIGRATIONS_PATH)]
        } else {
            config.migrations_paths
        };
        let mut context = MigrationContext::new(paths)
            .environment(self.environment.clone())
            .register_all(self.migrations.iter().cloned());
        if let Some(envs) = &self.protected_environments {
            context = context.protected_environments(envs.iter().cloned());
        }
        if let Some(enabled) = self.environment_check {
            context = context.environment_check(enabled);
        }
        Ok(context)
    }

    fn options_context(&self, name: &str, options: &MigrateOptions) -> Result<MigrationContext> {
        let mut context = self.migration_context(name)?.verbose(options.verbose);
        if let Some(scope) = &options.scope {
            context = context.scope(scope.clone());
        }
        Ok(context)
    }

    /// Migrate `name` to `options.version`, or to the latest migration.
    #[tracing::instrument(level = "info", skip(self, options), fields(environment = %self.environment))]
    pub fn migrate(&self, name: &str, options: &MigrateOptions) -> Result<Vec<MigrationProxy>> {
        let context = self.options_context(name, options)?;
        self.with_connection(name, |conn| context.migrate(conn, options.version))
    }

    /// Revert `options.steps()` migrations.
    pub fn rollback(&self, name: &str, options: &MigrateOptions) -> Result<Vec<MigrationProxy>> {
        let context = self.options_context(name, options)?;
        self.with_connection(name, |conn| context.rollback(conn, options.steps()))
    }

    /// Apply the next `options.steps()` migrations.
    pub fn forward(&self, name: &str, options: &MigrateOptions) -> Result<Vec<MigrationProxy>> {
        let context = self.options_context(name, options)?;
        self.with_connection(name, |conn| context.forward(conn, options.steps()))
    }

    pub fn migrations_status(&self, name: &str) -> Result<Vec<MigrationStatus>> {
        let context = self.migration_context(name)?;
        self.with_connection(name, |conn| context.migrations_status(conn))
    }

    pub fn current_version(&self, name: &str) -> Result<u64> {
        let context = self.migration_context(name)?;
        self.with_connection(name, |conn| context.current_version(conn))
    }

    /// Fail with a pending-migrations error if anything is left to run.
    pub fn check_pending(&self, name: &str) -> Result<()> {
        let context = self.migration_context(name)?;
        self.with_connection(name, |conn| context.check_pending(conn))
    }

    /// Drop every table in `name`, refusing protected or foreign databases.
    pub fn purge(&self, name: &str) -> Result<Vec<String>> {
        let context = self.migration_context(name)?;
        self.with_connection(name, |conn| context.purge(conn))
    }
}

/// Builder for [`Database`].
///
/// ```rust,ignore
/// let db = Database::builder()
///     .environment("test")
///     .migration(Migration::new(1, "create_users").change(statements))
///     .build();
/// ```
#[derive(Debug)]
pub struct DatabaseBuilder {
    environment: String,
    adapters: Option<Arc<AdapterRegistry>>,
    migrations: Vec<Arc<Migration>>,
    protected_environments: Option<Vec<String>>,
    environment_check: Option<bool>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            adapters: None,
            migrations: Vec::new(),
            protected_environments: None,
            environment_check: None,
        }
    }

    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Use `adapters` instead of a registry holding the built-in adapters.
    #[must_use]
    pub fn adapters(mut self, adapters: Arc<AdapterRegistry>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Register a migration defined in code.
    #[must_use]
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    #[must_use]
    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn protected_environments<S: Into<String>>(
        mut self,
        envs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.protected_environments = Some(envs.into_iter().map(Into::into).collect());
        self
    }

    /// Force the environment check on or off, ignoring
    /// `DISABLE_DATABASE_ENVIRONMENT_CHECK`.
    #[must_use]
    pub fn environment_check(mut self, enabled: bool) -> Self {
        self.environment_check = Some(enabled);
        self
    }

    pub fn build(self) -> Database {
        let adapters = self.adapters.unwrap_or_else(|| {
            let registry = AdapterRegistry::new();
            register_default_adapters(&registry);
            Arc::new(registry)
        });
        tracing::debug!(environment = %self.environment, adapters = ?adapters.names(), "built database context");
        Database {
            handler: Arc::new(ConnectionHandler::new(adapters)),
            environment: self.environment,
            migrations: self.migrations,
            protected_environments: self.protected_environments,
            environment_check: self.environment_check,
        }
    }
}
