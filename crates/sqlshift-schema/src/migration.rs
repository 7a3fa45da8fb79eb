//! Migration definitions.

use crate::statement::{SchemaStatement, invert_all};
use sqlshift_core::{Connection, Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Which way a migration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn is_up(self) -> bool {
        self == Direction::Up
    }

    pub fn is_down(self) -> bool {
        self == Direction::Down
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

/// A migration step written in Rust.
pub type MigrationFn = dyn Fn(&mut dyn Connection) -> Result<()> + Send + Sync;

/// What a migration does.
#[derive(Clone)]
pub enum MigrationBody {
    /// Reversible statements; `down` runs their inverses in reverse order.
    Change(Vec<SchemaStatement>),
    /// Explicit steps. A missing `down` makes the migration irreversible.
    UpDown {
        up: Arc<MigrationFn>,
        down: Option<Arc<MigrationFn>>,
    },
    /// Raw SQL batches, as loaded from migration files.
    Sql { up: String, down: Option<String> },
}

impl fmt::Debug for MigrationBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationBody::Change(statements) => f.debug_tuple("Change").field(statements).finish(),
            MigrationBody::UpDown { down, .. } => f
                .debug_struct("UpDown")
                .field("reversible", &down.is_some())
                .finish_non_exhaustive(),
            MigrationBody::Sql { up, down } => f
                .debug_struct("Sql")
                .field("up", up)
                .field("down", down)
                .finish(),
        }
    }
}

/// A versioned schema transformation.
///
/// ```
/// use sqlshift_schema::{ColumnDef, Migration, SchemaStatement, TableDef};
///
/// let migration = Migration::new(20240101000000, "create_users").change(vec![
///     SchemaStatement::create_table(
///         TableDef::new("users").column(ColumnDef::new("name", "TEXT").not_null()),
///     ),
/// ]);
/// assert_eq!(migration.name(), "CreateUsers");
/// ```
#[derive(Debug, Clone)]
pub struct Migration {
    version: u64,
    name: String,
    scope: Option<String>,
    body: MigrationBody,
    disable_ddl_transaction: bool,
}

impl Migration {
    /// A migration with an empty body. `name` is normalized to CamelCase.
    pub fn new(version: u64, name: &str) -> Self {
        Self {
            version,
            name: camelize(name),
            scope: None,
            body: MigrationBody::Change(Vec::new()),
            disable_ddl_transaction: false,
        }
    }

    pub fn change(mut self, statements: Vec<SchemaStatement>) -> Self {
        self.body = MigrationBody::Change(statements);
        self
    }

    /// Use explicit steps. Call [`Migration::down`] to make it reversible.
    pub fn up<F>(mut self, up: F) -> Self
    where
        F: Fn(&mut dyn Connection) -> Result<()> + Send + Sync + 'static,
    {
        let down = match self.body {
            MigrationBody::UpDown { down, .. } => down,
            _ => None,
        };
        self.body = MigrationBody::UpDown {
            up: Arc::new(up),
            down,
        };
        self
    }

    pub fn down<F>(mut self, down: F) -> Self
    where
        F: Fn(&mut dyn Connection) -> Result<()> + Send + Sync + 'static,
    {
        let up: Arc<MigrationFn> = match self.body {
            MigrationBody::UpDown { up, .. } => up,
            _ => Arc::new(|_: &mut dyn Connection| -> Result<()> { Ok(()) }),
        };
        self.body = MigrationBody::UpDown {
            up,
            down: Some(Arc::new(down)),
        };
        self
    }

    pub fn sql(mut self, up: impl Into<String>, down: Option<String>) -> Self {
        self.body = MigrationBody::Sql {
            up: up.into(),
            down,
        };
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        self.scope = (!scope.is_empty()).then_some(scope);
        self
    }

    /// Run outside a transaction, for statements that cannot run inside one.
    pub fn disable_ddl_transaction(mut self) -> Self {
        self.disable_ddl_transaction = true;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_name(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn body(&self) -> &MigrationBody {
        &self.body
    }

    pub fn ddl_transaction_disabled(&self) -> bool {
        self.disable_ddl_transaction
    }

    /// Fail with `Irreversible` if this migration cannot run `direction`.
    pub fn check_reversible(&self, direction: Direction) -> Result<()> {
        if direction.is_up() {
            return Ok(());
        }
        match &self.body {
            MigrationBody::Change(statements) => invert_all(statements).map(|_| ()).map_err(|s| {
                Error::irreversible_migration(
                    self.version,
                    &self.name,
                    format!("{} has no inverse", s.describe()),
                )
            }),
            MigrationBody::UpDown { down: None, .. } | MigrationBody::Sql { down: None, .. } => {
                Err(Error::irreversible_migration(
                    self.version,
                    &self.name,
                    "no down step is defined",
                ))
            }
            MigrationBody::UpDown { .. } | MigrationBody::Sql { .. } => Ok(()),
        }
    }

    /// Run the body in `direction`, announcing start and finish.
    ///
    /// Ledger bookkeeping and transactions belong to the migrator.
    pub fn migrate(&self, conn: &mut dyn Connection, direction: Direction, verbose: bool) -> Result<()> {
        self.check_reversible(direction)?;
        let verb = if direction.is_up() { "migrating" } else { "reverting" };
        self.announce(verbose, verb);

        let started = Instant::now();
        self.exec(conn, direction)?;

        let done = if direction.is_up() { "migrated" } else { "reverted" };
        let elapsed = started.elapsed().as_secs_f64();
        self.announce(verbose, &format!("{} ({:.4}s)", done, elapsed));
        Ok(())
    }

    fn exec(&self, conn: &mut dyn Connection, direction: Direction) -> Result<()> {
        match (&self.body, direction) {
            (MigrationBody::Change(statements), Direction::Up) => run_statements(conn, statements),
            (MigrationBody::Change(statements), Direction::Down) => {
                let inverses = invert_all(statements).map_err(|s| {
                    Error::irreversible_migration(
                        self.version,
                        &self.name,
                        format!("{} has no inverse", s.describe()),
                    )
                })?;
                run_statements(conn, &inverses)
            }
            (MigrationBody::UpDown { up, .. }, Direction::Up) => up(conn),
            (MigrationBody::UpDown { down, .. }, Direction::Down) => match down {
                Some(down) => down(conn),
                None => Err(Error::irreversible_migration(
                    self.version,
                    &self.name,
                    "no down step is defined",
                )),
            },
            (MigrationBody::Sql { up, .. }, Direction::Up) => run_sql(conn, up),
            (MigrationBody::Sql { down, .. }, Direction::Down) => match down {
                Some(down) => run_sql(conn, down),
                None => Err(Error::irreversible_migration(
                    self.version,
                    &self.name,
                    "no down step is defined",
                )),
            },
        }
    }

    fn announce(&self, verbose: bool, message: &str) {
        let text = format!("{} {}: {}", self.version, self.name, message);
        let rule = "=".repeat(75_usize.saturating_sub(text.len()));
        if verbose {
            tracing::info!(version = self.version, "== {} {}", text, rule);
        } else {
            tracing::debug!(version = self.version, "== {} {}", text, rule);
        }
    }
}

fn run_statements(conn: &mut dyn Connection, statements: &[SchemaStatement]) -> Result<()> {
    let dialect = conn.dialect();
    for statement in statements {
        tracing::debug!(statement = %statement.describe(), "-- running");
        conn.execute_batch(&statement.to_sql(dialect))?;
    }
    Ok(())
}

fn run_sql(conn: &mut dyn Connection, sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Ok(());
    }
    conn.execute_batch(sql)
}

/// `create_users` -> `CreateUsers`. Already-camelized names are unchanged.
pub fn camelize(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `CreateUsers` -> `create_users`.
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

/// `create_users` -> `Create users`.
pub fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ").trim().to_lowercase();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
