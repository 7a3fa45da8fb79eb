//! Migration discovery and high-level migrate/rollback operations.

use crate::ledger::{SchemaMigration, normalize_migration_number};
use crate::metadata::InternalMetadata;
use crate::migration::{Direction, Migration};
use crate::migrator::{DEFAULT_ENVIRONMENT, Migrator, validate_migrations};
use crate::proxy::MigrationProxy;
use serde::{Deserialize, Serialize};
use sqlshift_core::{Connection, Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable that disables the protected-environment check.
pub const DISABLE_ENVIRONMENT_CHECK_VAR: &str = "DISABLE_DATABASE_ENVIRONMENT_CHECK";

/// Name reported for ledger versions with no matching migration.
pub const NO_FILE: &str = "********** NO FILE **********";

/// Default migration directory.
pub const DEFAULT_MIGRATIONS_PATH: &str = "db/migrate";

/// One line of [`MigrationContext::migrations_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// `"up"` or `"down"`.
    pub status: String,
    /// Version with at least three digits.
    pub version: String,
    pub name: String,
}

impl MigrationStatus {
    pub fn new(status: &str, version: &str, name: &str) -> Self {
        Self {
            status: status.to_string(),
            version: version.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Discovers migrations under a set of paths (plus any registered in code)
/// and runs them against a connection.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    paths: Vec<PathBuf>,
    registered: Vec<Arc<Migration>>,
    scope: Option<String>,
    environment: String,
    protected_environments: Vec<String>,
    environment_check: Option<bool>,
    verbose: bool,
    ledger: SchemaMigration,
    metadata: InternalMetadata,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self::new([DEFAULT_MIGRATIONS_PATH])
    }
}

impl MigrationContext {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            registered: Vec::new(),
            scope: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            protected_environments: vec!["production".to_string()],
            environment_check: None,
            verbose: true,
            ledger: SchemaMigration::default(),
            metadata: InternalMetadata::default(),
        }
    }

    /// Add a migration defined in code.
    pub fn register(mut self, migration: Migration) -> Self {
        self.registered.push(Arc::new(migration));
        self
    }

    pub fn register_all(mut self, migrations: impl IntoIterator<Item = Arc<Migration>>) -> Self {
        self.registered.extend(migrations);
        self
    }

    /// Only run migrations with this scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        self.scope = (!scope.is_empty()).then_some(scope);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn protected_environments<S: Into<String>>(mut self, envs: impl IntoIterator<Item = S>) -> Self {
        self.protected_environments = envs.into_iter().map(Into::into).collect();
        self
    }

    /// Force the protected-environment check on or off. When unset, the
    /// check runs unless `DISABLE_DATABASE_ENVIRONMENT_CHECK` is set.
    pub fn environment_check(mut self, enabled: bool) -> Self {
        self.environment_check = Some(enabled);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn ledger(mut self, ledger: SchemaMigration) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn metadata(mut self, metadata: InternalMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn schema_migration(&self) -> &SchemaMigration {
        &self.ledger
    }

    pub fn internal_metadata(&self) -> &InternalMetadata {
        &self.metadata
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Migration files under every path, recursively.
    ///
    /// Missing directories contribute nothing.
    pub fn migration_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            collect_migration_files(path, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    /// All known migrations, ascending by version.
    pub fn migrations(&self) -> Result<Vec<MigrationProxy>> {
        let mut migrations = self
            .migration_files()?
            .into_iter()
            .map(MigrationProxy::from_file)
            .collect::<Result<Vec<_>>>()?;
        migrations.extend(self.registered.iter().cloned().map(MigrationProxy::from_arc));
        migrations.sort_by_key(MigrationProxy::version);
        validate_migrations(&migrations)?;
        Ok(migrations)
    }

    fn selected_migrations(&self) -> Result<Vec<MigrationProxy>> {
        let mut migrations = self.migrations()?;
        if let Some(scope) = &self.scope {
            migrations.retain(|m| m.scope() == Some(scope.as_str()));
        }
        Ok(migrations)
    }

    pub fn any_migrations(&self) -> Result<bool> {
        Ok(!self.migrations()?.is_empty())
    }

    pub fn last_migration(&self) -> Result<Option<MigrationProxy>> {
        Ok(self.migrations()?.pop())
    }

    // ------------------------------------------------------------------
    // Ledger queries
    // ------------------------------------------------------------------

    /// Applied versions, ascending. Empty when the ledger does not exist.
    pub fn get_all_versions(&self, conn: &mut dyn Connection) -> Result<Vec<u64>> {
        self.ledger.all_versions(conn)
    }

    /// Highest applied version, or 0. Creates the ledger if missing.
    pub fn current_version(&self, conn: &mut dyn Connection) -> Result<u64> {
        self.ledger.create_table(conn)?;
        Ok(self.get_all_versions(conn)?.last().copied().unwrap_or(0))
    }

    /// Whether any known migration is missing from the ledger.
    pub fn needs_migration(&self, conn: &mut dyn Connection) -> Result<bool> {
        Ok(!self.pending_migrations(conn)?.is_empty())
    }

    pub fn pending_migrations(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationProxy>> {
        let applied: BTreeSet<u64> = self.get_all_versions(conn)?.into_iter().collect();
        Ok(self
            .migrations()?
            .into_iter()
            .filter(|m| !applied.contains(&m.version()))
            .collect())
    }

    /// Fail with `Pending` if any migration has not been applied.
    pub fn check_pending(&self, conn: &mut dyn Connection) -> Result<()> {
        let pending: Vec<u64> = self
            .pending_migrations(conn)?
            .iter()
            .map(MigrationProxy::version)
            .collect();
        if pending.is_empty() {
            Ok(())
        } else {
            Err(Error::pending_migrations(&pending))
        }
    }

    /// Up/down state of every version known on disk or in the ledger.
    pub fn migrations_status(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationStatus>> {
        let mut applied: BTreeSet<u64> = self.get_all_versions(conn)?.into_iter().collect();
        let mut lines: Vec<(u64, MigrationStatus)> = Vec::new();

        for migration in self.migrations()? {
            let status = if applied.remove(&migration.version()) { "up" } else { "down" };
            lines.push((
                migration.version(),
                MigrationStatus::new(
                    status,
                    &normalize_migration_number(migration.version()),
                    migration.display_name(),
                ),
            ));
        }
        for version in applied {
            lines.push((
                version,
                MigrationStatus::new("up", &normalize_migration_number(version), NO_FILE),
            ));
        }

        lines.sort_by_key(|(version, _)| *version);
        Ok(lines.into_iter().map(|(_, line)| line).collect())
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    fn migrator(
        &self,
        direction: Direction,
        migrations: Vec<MigrationProxy>,
        target: Option<u64>,
    ) -> Result<Migrator> {
        Ok(Migrator::new(direction, migrations, target)?
            .verbose(self.verbose)
            .environment(self.environment.clone())
            .ledger(self.ledger.clone())
            .metadata(self.metadata.clone()))
    }

    /// A migrator over every migration, going up.
    pub fn open(&self) -> Result<Migrator> {
        self.migrator(Direction::Up, self.migrations()?, None)
    }

    /// Migrate to `target`: up to the latest when `None`, down when the
    /// target is below the current version, up otherwise.
    pub fn migrate(&self, conn: &mut dyn Connection, target: Option<u64>) -> Result<Vec<MigrationProxy>> {
        let Some(target) = target else {
            return self.up(conn, None);
        };
        let current = self.current_version(conn)?;
        if current == 0 && target == 0 {
            Ok(Vec::new())
        } else if current > target {
            self.down(conn, Some(target))
        } else {
            self.up(conn, Some(target))
        }
    }

    pub fn up(&self, conn: &mut dyn Connection, target: Option<u64>) -> Result<Vec<MigrationProxy>> {
        self.migrator(Direction::Up, self.selected_migrations()?, target)?
            .migrate(conn)
    }

    pub fn down(&self, conn: &mut dyn Connection, target: Option<u64>) -> Result<Vec<MigrationProxy>> {
        self.migrator(Direction::Down, self.selected_migrations()?, target)?
            .migrate(conn)
    }

    /// Run the single migration at `version` in `direction`.
    pub fn run(
        &self,
        conn: &mut dyn Connection,
        direction: Direction,
        version: u64,
    ) -> Result<Option<MigrationProxy>> {
        self.migrator(direction, self.migrations()?, Some(version))?
            .run(conn)
    }

    /// Revert the last `steps` applied migrations.
    pub fn rollback(&self, conn: &mut dyn Connection, steps: usize) -> Result<Vec<MigrationProxy>> {
        self.move_steps(conn, Direction::Down, steps)
    }

    /// Apply the next `steps` migrations.
    pub fn forward(&self, conn: &mut dyn Connection, steps: usize) -> Result<Vec<MigrationProxy>> {
        self.move_steps(conn, Direction::Up, steps)
    }

    fn move_steps(
        &self,
        conn: &mut dyn Connection,
        direction: Direction,
        steps: usize,
    ) -> Result<Vec<MigrationProxy>> {
        let migrator = self.migrator(direction, self.selected_migrations()?, None)?;
        let current = self.current_version(conn)?;
        let ordered = migrator.migrations();

        let finish = if current == 0 {
            if direction.is_down() || steps == 0 {
                return Ok(Vec::new());
            }
            ordered.get(steps - 1)
        } else {
            let start = ordered
                .iter()
                .position(|m| m.version() == current)
                .ok_or_else(|| Error::unknown_migration_version(current))?;
            ordered.get(start + steps)
        };

        match (direction, finish) {
            (Direction::Up, Some(finish)) => self.up(conn, Some(finish.version())),
            (Direction::Up, None) => self.up(conn, None),
            (Direction::Down, Some(finish)) => self.down(conn, Some(finish.version())),
            (Direction::Down, None) => self.down(conn, Some(0)),
        }
    }

    // ------------------------------------------------------------------
    // Environment protection
    // ------------------------------------------------------------------

    pub fn current_environment(&self) -> &str {
        &self.environment
    }

    /// Environment recorded by the last migration run, or `None` when no
    /// migration has been applied.
    ///
    /// Fails with `NoEnvironmentInSchema` when migrations were applied but
    /// no environment was recorded.
    pub fn last_stored_environment(&self, conn: &mut dyn Connection) -> Result<Option<String>> {
        if self.get_all_versions(conn)?.is_empty() {
            return Ok(None);
        }
        if !self.metadata.table_exists(conn)? {
            return Err(Error::no_environment_in_schema());
        }
        match self.metadata.environment(conn)? {
            Some(env) => Ok(Some(env)),
            None => Err(Error::no_environment_in_schema()),
        }
    }

    /// Whether the stored environment is one of the protected ones.
    pub fn protected_environment(&self, conn: &mut dyn Connection) -> Result<bool> {
        Ok(self
            .last_stored_environment(conn)?
            .is_some_and(|env| self.protected_environments.contains(&env)))
    }

    fn environment_check_enabled(&self) -> bool {
        self.environment_check
            .unwrap_or_else(|| std::env::var_os(DISABLE_ENVIRONMENT_CHECK_VAR).is_none())
    }

    /// Refuse destructive work against a protected or foreign database.
    pub fn check_protected_environments(&self, conn: &mut dyn Connection) -> Result<()> {
        if !self.environment_check_enabled() {
            tracing::debug!("environment check disabled");
            return Ok(());
        }
        let Some(stored) = self.last_stored_environment(conn)? else {
            return Ok(());
        };
        if self.protected_environments.contains(&stored) {
            return Err(Error::protected_environment(&stored));
        }
        if stored != self.environment {
            return Err(Error::environment_mismatch(&self.environment, &stored));
        }
        Ok(())
    }

    /// Drop every table after passing the environment check.
    ///
    /// Returns the dropped table names.
    #[tracing::instrument(level = "info", skip(self, conn), fields(environment = %self.environment))]
    pub fn purge(&self, conn: &mut dyn Connection) -> Result<Vec<String>> {
        self.check_protected_environments(conn)?;
        let tables = conn.tables()?;
        let dialect = conn.dialect();
        for table in &tables {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", dialect.quote_ident(table)))?;
        }
        tracing::info!(count = tables.len(), "purged database");
        Ok(tables)
    }
}

fn collect_migration_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %dir.display(), "migrations path does not exist");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_migration_files(&path, out)?;
        } else if looks_like_migration(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// `[0-9]*_*.sql`: candidates that are then parsed strictly.
fn looks_like_migration(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(|c: char| c.is_ascii_digit())
        && name.contains('_')
        && path.extension().is_some_and(|ext| ext == "sql")
}
