//! Key/value metadata stored alongside the schema.
//!
//! The `environment` key records which environment last ran migrations
//! against a database. Destructive operations compare it to the current
//! environment before proceeding.

use sqlshift_core::{Connection, Result, Value};

/// Default metadata table name.
pub const INTERNAL_METADATA_TABLE: &str = "ar_internal_metadata";

/// Key holding the environment that last migrated the database.
pub const ENVIRONMENT_KEY: &str = "environment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMetadata {
    table: String,
}

impl Default for InternalMetadata {
    fn default() -> Self {
        Self::new(INTERNAL_METADATA_TABLE)
    }
}

impl InternalMetadata {
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

    pub fn create_table(&self, conn: &mut dyn Connection) -> Result<()> {
        if self.table_exists(conn)? {
            return Ok(());
        }
        let d = conn.dialect();
        tracing::debug!(table = %self.table, "creating internal metadata table");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {} VARCHAR(255) NOT NULL PRIMARY KEY,\n  {} VARCHAR(255),\n  {} TIMESTAMP NOT NULL,\n  {} TIMESTAMP NOT NULL\n)",
            d.quote_ident(&self.table),
            d.quote_ident("key"),
            d.quote_ident("value"),
            d.quote_ident("created_at"),
            d.quote_ident("updated_at"),
        ))
    }

    pub fn drop_table(&self, conn: &mut dyn Connection) -> Result<()> {
        let q = conn.dialect().quote_ident(&self.table);
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", q))
    }

    /// Value stored under `key`, or `None` if the key or table is missing.
    pub fn get(&self, conn: &mut dyn Connection, key: &str) -> Result<Option<String>> {
        if !self.table_exists(conn)? {
            return Ok(None);
        }
        let d = conn.dialect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            d.quote_ident("value"),
            d.quote_ident(&self.table),
            d.quote_ident("key"),
            d.placeholder(1)
        );
        match conn.query_one(&sql, &[Value::Text(key.to_string())])? {
            Some(row) => row.get_as::<Option<String>>(0),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, creating the table if needed.
    pub fn set(&self, conn: &mut dyn Connection, key: &str, value: &str) -> Result<()> {
        self.create_table(conn)?;
        let d = conn.dialect();
        let update = format!(
            "UPDATE {} SET {} = {}, {} = CURRENT_TIMESTAMP WHERE {} = {}",
            d.quote_ident(&self.table),
            d.quote_ident("value"),
            d.placeholder(1),
            d.quote_ident("updated_at"),
            d.quote_ident("key"),
            d.placeholder(2)
        );
        let params = [Value::Text(value.to_string()), Value::Text(key.to_string())];
        if conn.execute(&update, &params)? > 0 {
            return Ok(());
        }
        let insert = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            d.quote_ident(&self.table),
            d.quote_ident("key"),
            d.quote_ident("value"),
            d.quote_ident("created_at"),
            d.quote_ident("updated_at"),
            d.placeholder(1),
            d.placeholder(2)
        );
        conn.execute(&insert, &[Value::Text(key.to_string()), Value::Text(value.to_string())])?;
        Ok(())
    }

    pub fn environment(&self, conn: &mut dyn Connection) -> Result<Option<String>> {
        self.get(conn, ENVIRONMENT_KEY)
    }

    pub fn set_environment(&self, conn: &mut dyn Connection, environment: &str) -> Result<()> {
        tracing::debug!(environment, "recording schema environment");
        self.set(conn, ENVIRONMENT_KEY, environment)
    }
}
