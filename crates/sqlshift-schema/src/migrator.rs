//! Runs an ordered list of migrations in one direction.
//!
//! Each migration runs in its own transaction together with its ledger
//! update, so the ledger always matches the schema. A failure rolls back
//! the failing migration and cancels the rest of the batch; migrations that
//! already committed stay committed.

use crate::ledger::SchemaMigration;
use crate::metadata::InternalMetadata;
use crate::migration::Direction;
use crate::proxy::MigrationProxy;
use sqlshift_core::{Connection, Error, Result, transaction};
use std::collections::{BTreeSet, HashSet};

/// Environment recorded when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Check a migration list for duplicate names and versions.
pub fn validate_migrations(migrations: &[MigrationProxy]) -> Result<()> {
    let mut names = HashSet::new();
    for migration in migrations {
        if !names.insert(migration.name()) {
            return Err(Error::duplicate_migration_name(migration.name()));
        }
    }
    let mut versions = HashSet::new();
    for migration in migrations {
        if !versions.insert(migration.version()) {
            return Err(Error::duplicate_migration_version(migration.version()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Migrator {
    direction: Direction,
    /// Ascending by version.
    migrations: Vec<MigrationProxy>,
    target: Option<u64>,
    verbose: bool,
    environment: String,
    ledger: SchemaMigration,
    metadata: InternalMetadata,
}

impl Migrator {
    /// Fails with `DuplicateName` / `DuplicateVersion` before touching the database.
    pub fn new(
        direction: Direction,
        mut migrations: Vec<MigrationProxy>,
        target: Option<u64>,
    ) -> Result<Self> {
        validate_migrations(&migrations)?;
        migrations.sort_by_key(MigrationProxy::version);
        Ok(Self {
            direction,
            migrations,
            target,
            verbose: true,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            ledger: SchemaMigration::default(),
            metadata: InternalMetadata::default(),
        })
    }

    /// Announce progress at `info` (default) or only at `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Environment recorded in the metadata table after migrating up.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
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

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target(&self) -> Option<u64> {
        self.target
    }

    /// Migrations in the order this migrator walks them: ascending going
    /// up, descending going down.
    pub fn migrations(&self) -> Vec<&MigrationProxy> {
        let mut ordered: Vec<&MigrationProxy> = self.migrations.iter().collect();
        if self.direction.is_down() {
            ordered.reverse();
        }
        ordered
    }

    /// Highest applied version, or 0. Creates the ledger if missing.
    pub fn current_version(&self, conn: &mut dyn Connection) -> Result<u64> {
        Ok(self.load_migrated(conn)?.last().copied().unwrap_or(0))
    }

    /// The migration matching the current version, if it is known.
    pub fn current_migration(&self, conn: &mut dyn Connection) -> Result<Option<MigrationProxy>> {
        let current = self.current_version(conn)?;
        Ok(self.find(current).cloned())
    }

    /// Known migrations that are not in the ledger, ascending.
    pub fn pending_migrations(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationProxy>> {
        let migrated = self.load_migrated(conn)?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| !migrated.contains(&m.version()))
            .cloned()
            .collect())
    }

    /// Run every runnable migration up to the target.
    ///
    /// Returns the migrations that actually ran.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(direction = %self.direction, target = ?self.target))]
    pub fn migrate(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationProxy>> {
        if let Some(target) = self.target.filter(|_| self.invalid_target()) {
            return Err(Error::unknown_migration_version(target));
        }

        let mut migrated = self.load_migrated(conn)?;
        let runnable = self.runnable(&migrated);
        let mut executed = Vec::with_capacity(runnable.len());
        for migration in runnable {
            if self.execute_migration_in_transaction(conn, migration, &mut migrated)? {
                executed.push(migration.clone());
            }
        }

        self.record_environment(conn)?;
        if !executed.is_empty() {
            tracing::info!(
                direction = %self.direction,
                count = executed.len(),
                "migrations complete"
            );
        }
        Ok(executed)
    }

    /// Run exactly the migration at the target version.
    ///
    /// Returns `None` when it was already in the requested state.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(direction = %self.direction, target = ?self.target))]
    pub fn run(&self, conn: &mut dyn Connection) -> Result<Option<MigrationProxy>> {
        let migration = self
            .target
            .and_then(|target| self.find(target))
            .ok_or_else(|| Error::unknown_migration_version(self.target.unwrap_or(0)))?;

        let mut migrated = self.load_migrated(conn)?;
        let ran = self.execute_migration_in_transaction(conn, migration, &mut migrated)?;
        self.record_environment(conn)?;
        Ok(ran.then(|| migration.clone()))
    }

    fn find(&self, version: u64) -> Option<&MigrationProxy> {
        self.migrations.iter().find(|m| m.version() == version)
    }

    fn invalid_target(&self) -> bool {
        match self.target {
            None | Some(0) => false,
            Some(target) => self.find(target).is_none(),
        }
    }

    fn load_migrated(&self, conn: &mut dyn Connection) -> Result<BTreeSet<u64>> {
        self.ledger.create_table(conn)?;
        Ok(self.ledger.all_versions(conn)?.into_iter().collect())
    }

    /// The slice of migrations between the current position and the
    /// target, minus those already in the state the direction produces.
    fn runnable<'a>(&'a self, migrated: &BTreeSet<u64>) -> Vec<&'a MigrationProxy> {
        let ordered = self.migrations();
        if ordered.is_empty() {
            return Vec::new();
        }
        let current = migrated.last().copied().unwrap_or(0);
        let position = |version: u64| ordered.iter().position(|m| m.version() == version);

        let start = if self.direction.is_up() {
            0
        } else {
            position(current).unwrap_or(0)
        };
        let target_index = self.target.and_then(position);
        let finish = target_index.unwrap_or(ordered.len() - 1);
        if start > finish {
            return Vec::new();
        }

        let mut slice: Vec<&MigrationProxy> = ordered[start..=finish].to_vec();
        if self.direction.is_up() {
            slice.retain(|m| !migrated.contains(&m.version()));
        } else {
            // Going down to a target leaves the target itself applied.
            if target_index.is_some() {
                slice.pop();
            }
            slice.retain(|m| migrated.contains(&m.version()));
        }
        slice
    }

    fn execute_migration_in_transaction(
        &self,
        conn: &mut dyn Connection,
        proxy: &MigrationProxy,
        migrated: &mut BTreeSet<u64>,
    ) -> Result<bool> {
        let version = proxy.version();
        if self.direction.is_down() && !migrated.contains(&version) {
            return Ok(false);
        }
        if self.direction.is_up() && migrated.contains(&version) {
            return Ok(false);
        }

        tracing::info!(version, name = proxy.name(), "Migrating to {} ({})", proxy.name(), version);

        let migration = proxy.load()?;
        migration.check_reversible(self.direction)?;

        let use_transaction = !migration.ddl_transaction_disabled() && conn.supports_ddl_transactions();
        let direction = self.direction;
        let verbose = self.verbose;
        let ledger = &self.ledger;
        let body = |conn: &mut dyn Connection| -> Result<()> {
            migration.migrate(conn, direction, verbose)?;
            match direction {
                Direction::Up => ledger.insert(conn, version),
                Direction::Down => ledger.delete(conn, version).map(|_| ()),
            }
        };

        let result = if use_transaction {
            transaction(conn, body)
        } else {
            body(conn)
        };
        if let Err(cause) = result {
            tracing::warn!(version, name = proxy.name(), error = %cause, "migration failed");
            return Err(Error::migration_failed(version, proxy.name(), use_transaction, cause));
        }

        match direction {
            Direction::Up => migrated.insert(version),
            Direction::Down => migrated.remove(&version),
        };
        Ok(true)
    }

    fn record_environment(&self, conn: &mut dyn Connection) -> Result<()> {
        if self.direction.is_down() {
            return Ok(());
        }
        self.metadata.set_environment(conn, &self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Migration;
    use sqlshift_core::MigrationErrorKind;
    use sqlshift_sqlite::SqliteConnection;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<(Direction, u64)>>>;

    /// Migrations 1..=n that record when they run.
    fn sensors(n: u64) -> (Calls, Vec<MigrationProxy>) {
        let calls: Calls = Arc::default();
        let migrations = (1..=n)
            .map(|version| sensor(&calls, version, &format!("sensor_{}", version)))
            .collect();
        (calls, migrations)
    }

    fn sensor(calls: &Calls, version: u64, name: &str) -> MigrationProxy {
        let up_calls = Arc::clone(calls);
        let down_calls = Arc::clone(calls);
        MigrationProxy::registered(
            Migration::new(version, name)
                .up(move |_| {
                    up_calls.lock().unwrap().push((Direction::Up, version));
                    Ok(())
                })
                .down(move |_| {
                    down_calls.lock().unwrap().push((Direction::Down, version));
                    Ok(())
                }),
        )
    }

    fn take(calls: &Calls) -> Vec<(Direction, u64)> {
        std::mem::take(&mut *calls.lock().unwrap())
    }

    fn migrator(direction: Direction, migrations: &[MigrationProxy], target: Option<u64>) -> Migrator {
        Migrator::new(direction, migrations.to_vec(), target)
            .unwrap()
            .verbose(false)
    }

    #[test]
    fn test_duplicate_names() {
        let list = vec![
            MigrationProxy::registered(Migration::new(1, "Chunky")),
            MigrationProxy::registered(Migration::new(2, "Chunky")),
        ];
        let err = Migrator::new(Direction::Up, list, None).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::DuplicateName));
        assert!(err.to_string().contains("Multiple migrations have the name Chunky"));
    }

    #[test]
    fn test_duplicate_versions() {
        let list = vec![
            MigrationProxy::registered(Migration::new(1, "foo")),
            MigrationProxy::registered(Migration::new(1, "bar")),
        ];
        let err = Migrator::new(Direction::Up, list, None).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::DuplicateVersion));
    }

    #[test]
    fn test_missing_target_versions() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (_, list) = sensors(2);

        let err = migrator(Direction::Up, &list, Some(3)).run(&mut conn).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::UnknownVersion));

        let err = migrator(Direction::Up, &list, Some(0)).run(&mut conn).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::UnknownVersion));

        let err = migrator(Direction::Up, &list, Some(3)).migrate(&mut conn).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::UnknownVersion));
        assert!(!conn.table_exists("ar_internal_metadata").unwrap());
    }

    #[test]
    fn test_up_then_idempotent_then_rollback() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (calls, list) = sensors(3);

        let up = migrator(Direction::Up, &list, None);
        let executed = up.migrate(&mut conn).unwrap();
        assert_eq!(executed.len(), 3);
        assert_eq!(up.current_version(&mut conn).unwrap(), 3);

        assert!(up.migrate(&mut conn).unwrap().is_empty());
        assert_eq!(take(&calls).len(), 3);

        let down = migrator(Direction::Down, &list, Some(2));
        let executed = down.migrate(&mut conn).unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(take(&calls), vec![(Direction::Down, 3)]);
        assert_eq!(down.current_version(&mut conn).unwrap(), 2);
    }

    #[test]
    fn test_one_up_at_a_time() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (calls, list) = sensors(3);

        migrator(Direction::Up, &list, Some(1)).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Up, 1)]);

        migrator(Direction::Up, &list, Some(2)).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Up, 2)]);

        let rest = migrator(Direction::Up, &list, None).migrate(&mut conn).unwrap();
        assert_eq!(rest.iter().map(MigrationProxy::version).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_down_to_target_keeps_target() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (calls, list) = sensors(3);

        migrator(Direction::Up, &list, None).migrate(&mut conn).unwrap();
        take(&calls);

        migrator(Direction::Down, &list, Some(1)).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Down, 3), (Direction::Down, 2)]);
    }

    #[test]
    fn test_down_to_zero_runs_once() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (calls, list) = sensors(1);

        migrator(Direction::Up, &list, None).migrate(&mut conn).unwrap();
        take(&calls);

        migrator(Direction::Down, &list, Some(0)).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Down, 1)]);

        migrator(Direction::Down, &list, Some(0)).migrate(&mut conn).unwrap();
        assert!(take(&calls).is_empty());
    }

    #[test]
    fn test_interleaved_migrations() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let calls: Calls = Arc::default();

        let pass_one = vec![sensor(&calls, 1, "one")];
        migrator(Direction::Up, &pass_one, None).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Up, 1)]);

        let pass_two = vec![sensor(&calls, 1, "one"), sensor(&calls, 3, "three")];
        migrator(Direction::Up, &pass_two, None).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Up, 3)]);

        let pass_three = vec![
            sensor(&calls, 1, "one"),
            sensor(&calls, 2, "two"),
            sensor(&calls, 3, "three"),
        ];
        migrator(Direction::Down, &pass_three, None).migrate(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Down, 3), (Direction::Down, 1)]);
    }

    #[test]
    fn test_pending_and_current_migration() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (_, list) = sensors(3);
        let m = migrator(Direction::Up, &list, None);
        assert!(m.current_migration(&mut conn).unwrap().is_none());

        SchemaMigration::default().insert(&mut conn, 1).unwrap();
        let pending: Vec<u64> = m
            .pending_migrations(&mut conn)
            .unwrap()
            .iter()
            .map(MigrationProxy::version)
            .collect();
        assert_eq!(pending, vec![2, 3]);
        assert_eq!(m.current_migration(&mut conn).unwrap().map(|p| p.version()), Some(1));
    }

    #[test]
    fn test_run_single_migration() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (calls, list) = sensors(3);

        let ran = migrator(Direction::Up, &list, Some(2)).run(&mut conn).unwrap();
        assert_eq!(ran.map(|m| m.version()), Some(2));
        assert!(migrator(Direction::Up, &list, Some(2)).run(&mut conn).unwrap().is_none());
        assert_eq!(take(&calls), vec![(Direction::Up, 2)]);

        migrator(Direction::Down, &list, Some(2)).run(&mut conn).unwrap();
        assert_eq!(take(&calls), vec![(Direction::Down, 2)]);
        assert!(SchemaMigration::default().all_versions(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn test_failure_keeps_earlier_migrations() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let list = vec![
            MigrationProxy::registered(
                Migration::new(1, "create_a").sql("CREATE TABLE a (id INTEGER)", None),
            ),
            MigrationProxy::registered(Migration::new(2, "create_b_then_fail").sql(
                "CREATE TABLE b (id INTEGER); INSERT INTO missing VALUES (1);",
                None,
            )),
            MigrationProxy::registered(
                Migration::new(3, "create_c").sql("CREATE TABLE c (id INTEGER)", None),
            ),
        ];

        let err = migrator(Direction::Up, &list, None).migrate(&mut conn).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::Failed));
        assert!(err.to_string().contains("this and all later migrations canceled"));

        assert!(conn.table_exists("a").unwrap());
        assert!(!conn.table_exists("b").unwrap());
        assert!(!conn.table_exists("c").unwrap());
        assert_eq!(SchemaMigration::default().all_versions(&mut conn).unwrap(), vec![1]);
    }

    #[test]
    fn test_records_environment_going_up() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let (_, list) = sensors(1);
        migrator(Direction::Up, &list, None)
            .environment("test")
            .migrate(&mut conn)
            .unwrap();
        assert_eq!(
            InternalMetadata::default().environment(&mut conn).unwrap().as_deref(),
            Some("test")
        );
    }

    #[test]
    fn test_irreversible_down_is_not_wrapped() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let list = vec![MigrationProxy::registered(
            Migration::new(1, "one_way").sql("CREATE TABLE one_way (id INTEGER)", None),
        )];
        migrator(Direction::Up, &list, None).migrate(&mut conn).unwrap();

        let err = migrator(Direction::Down, &list, None).migrate(&mut conn).unwrap_err();
        assert_eq!(err.migration_kind(), Some(MigrationErrorKind::Irreversible));
        assert!(conn.table_exists("one_way").unwrap());
        assert_eq!(SchemaMigration::default().all_versions(&mut conn).unwrap(), vec![1]);
    }
}
