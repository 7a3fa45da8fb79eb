//! The `schema_migrations` ledger.
//!
//! One row per applied migration, keyed by the version stored as a string.

use sqlshift_core::{Connection, Result, Value};

/// Default ledger table name.
pub const SCHEMA_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Format a version for display: at least three digits (`10` -> `"010"`).
pub fn normalize_migration_number(version: u64) -> String {
    format!("{:03}", version)
}

/// Access to the applied-versions ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMigration {
    table: String,
}

impl Default for SchemaMigration {
    fn default() -> Self {
        Self::new(SCHEMA_MIGRATIONS_TABLE)
    }
}

impl SchemaMigration {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn table_exists(&self, conn: &mut dyn Connection) -> Result<bool> {
        conn.table_exists(&self.table)
    }

    /// Create the ledger table if it does not exist.
    pub fn create_table(&self, conn: &mut dyn Connection) -> Result<()> {
        if self.table_exists(conn)? {
            return Ok(());
        }
        let q = conn.dialect().quote_ident(&self.table);
        let version = conn.dialect().quote_ident("version");
        tracing::debug!(table = %self.table, "creating migration ledger");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} VARCHAR(255) NOT NULL PRIMARY KEY)",
            q, version
        ))
    }

    pub fn drop_table(&self, conn: &mut dyn Connection) -> Result<()> {
        let q = conn.dialect().quote_ident(&self.table);
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", q))
    }

    /// Record `version` as applied.
    pub fn insert(&self, conn: &mut dyn Connection, version: u64) -> Result<()> {
        let dialect = conn.dialect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_ident(&self.table),
            dialect.quote_ident("version"),
            dialect.placeholder(1)
        );
        conn.execute(&sql, &[Value::Text(version.to_string())])?;
        Ok(())
    }

    /// Forget `version`. Returns whether a row was removed.
    pub fn delete(&self, conn: &mut dyn Connection, version: u64) -> Result<bool> {
        let dialect = conn.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_ident(&self.table),
            dialect.quote_ident("version"),
            dialect.placeholder(1)
        );
        Ok(conn.execute(&sql, &[Value::Text(version.to_string())])? > 0)
    }

    pub fn delete_all(&self, conn: &mut dyn Connection) -> Result<u64> {
        let q = conn.dialect().quote_ident(&self.table);
        conn.execute(&format!("DELETE FROM {}", q), &[])
    }

    /// Applied versions in ascending numeric order.
    ///
    /// Returns an empty list when the table does not exist. Rows whose
    /// version is not a number are skipped.
    pub fn all_versions(&self, conn: &mut dyn Connection) -> Result<Vec<u64>> {
        if !self.table_exists(conn)? {
            return Ok(Vec::new());
        }
        let dialect = conn.dialect();
        let sql = format!(
            "SELECT {} FROM {}",
            dialect.quote_ident("version"),
            dialect.quote_ident(&self.table)
        );
        let mut versions = Vec::new();
        for row in conn.query(&sql, &[])? {
            let raw: String = row.get_as(0)?;
            match raw.trim().parse::<u64>() {
                Ok(version) => versions.push(version),
                Err(_) => tracing::warn!(table = %self.table, version = %raw, "ignoring non-numeric ledger row"),
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Applied versions formatted with [`normalize_migration_number`].
    pub fn normalized_versions(&self, conn: &mut dyn Connection) -> Result<Vec<String>> {
        Ok(self
            .all_versions(conn)?
            .into_iter()
            .map(normalize_migration_number)
            .collect())
    }
}
