//! Reversible schema statements.
//!
//! A `change` migration is a list of [`SchemaStatement`]s. Each statement
//! knows its own inverse, so reverting the migration runs the inverses in
//! reverse order. Statements that destroy information (dropping a table,
//! removing a column) are only reversible when they carry the definition
//! needed to recreate what they remove.

use sqlshift_core::Dialect;

/// A column definition for `CREATE TABLE` and `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// SQL type, passed through verbatim (`"TEXT"`, `"INTEGER"`, `"VARCHAR(255)"`).
    pub sql_type: String,
    pub nullable: bool,
    /// Default expression, passed through verbatim.
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnDef {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    fn to_sql(&self, dialect: Dialect) -> String {
        let mut parts = vec![dialect.quote_ident(&self.name), self.sql_type.clone()];
        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else if !self.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &self.default {
            parts.push(format!("DEFAULT {}", default));
        }
        parts.join(" ")
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// A table with an integer `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![ColumnDef::new("id", "INTEGER").primary_key()],
        }
    }

    /// A table with no implicit primary key.
    pub fn without_id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub table: String,
    pub columns: Vec<String>,
    pub name: String,
    pub unique: bool,
}

impl IndexDef {
    /// An index named `index_<table>_on_<col>_and_<col>`.
    pub fn new<S: Into<String>>(table: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = index_name(&table, &columns);
        Self {
            table,
            columns,
            name,
            unique: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Default index name for `columns` on `table`.
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("index_{}_on_{}", table, columns.join("_and_"))
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatement {
    CreateTable(TableDef),
    /// Reversible only when `definition` is present.
    DropTable {
        name: String,
        definition: Option<TableDef>,
    },
    RenameTable {
        from: String,
        to: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    /// Reversible only when `definition` is present.
    RemoveColumn {
        table: String,
        column: String,
        definition: Option<ColumnDef>,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    AddIndex(IndexDef),
    /// Reversible only when `definition` is present.
    RemoveIndex {
        table: String,
        name: String,
        definition: Option<IndexDef>,
    },
    /// Raw SQL. Reversible only when `down` is present.
    Execute { up: String, down: Option<String> },
}

impl SchemaStatement {
    pub fn create_table(table: TableDef) -> Self {
        SchemaStatement::CreateTable(table)
    }

    /// Drop a table, keeping its definition so the drop can be reverted.
    pub fn drop_table(table: TableDef) -> Self {
        SchemaStatement::DropTable {
            name: table.name.clone(),
            definition: Some(table),
        }
    }

    pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Self {
        SchemaStatement::RenameTable {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn add_column(table: impl Into<String>, column: ColumnDef) -> Self {
        SchemaStatement::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Remove a column, keeping its definition so the removal can be reverted.
    pub fn remove_column(table: impl Into<String>, column: ColumnDef) -> Self {
        SchemaStatement::RemoveColumn {
            table: table.into(),
            column: column.name.clone(),
            definition: Some(column),
        }
    }

    pub fn rename_column(
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        SchemaStatement::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn add_index(index: IndexDef) -> Self {
        SchemaStatement::AddIndex(index)
    }

    pub fn remove_index(index: IndexDef) -> Self {
        SchemaStatement::RemoveIndex {
            table: index.table.clone(),
            name: index.name.clone(),
            definition: Some(index),
        }
    }

    pub fn execute(up: impl Into<String>, down: Option<String>) -> Self {
        SchemaStatement::Execute {
            up: up.into(),
            down,
        }
    }

    /// The statement that undoes this one, if it can be built from data
    /// carried by the statement.
    pub fn inverse(&self) -> Option<SchemaStatement> {
        match self {
            SchemaStatement::CreateTable(table) => Some(SchemaStatement::DropTable {
                name: table.name.clone(),
                definition: Some(table.clone()),
            }),
            SchemaStatement::DropTable { definition, .. } => {
                definition.clone().map(SchemaStatement::CreateTable)
            }
            SchemaStatement::RenameTable { from, to } => Some(SchemaStatement::RenameTable {
                from: to.clone(),
                to: from.clone(),
            }),
            SchemaStatement::AddColumn { table, column } => Some(SchemaStatement::RemoveColumn {
                table: table.clone(),
                column: column.name.clone(),
                definition: Some(column.clone()),
            }),
            SchemaStatement::RemoveColumn {
                table, definition, ..
            } => definition.clone().map(|column| SchemaStatement::AddColumn {
                table: table.clone(),
                column,
            }),
            SchemaStatement::RenameColumn { table, from, to } => {
                Some(SchemaStatement::RenameColumn {
                    table: table.clone(),
                    from: to.clone(),
                    to: from.clone(),
                })
            }
            SchemaStatement::AddIndex(index) => Some(SchemaStatement::RemoveIndex {
                table: index.table.clone(),
                name: index.name.clone(),
                definition: Some(index.clone()),
            }),
            SchemaStatement::RemoveIndex { definition, .. } => {
                definition.clone().map(SchemaStatement::AddIndex)
            }
            SchemaStatement::Execute { up, down } => {
                down.clone().map(|down| SchemaStatement::Execute {
                    up: down,
                    down: Some(up.clone()),
                })
            }
        }
    }

    /// Short human description, used in logs and irreversible errors.
    pub fn describe(&self) -> String {
        match self {
            SchemaStatement::CreateTable(table) => format!("create_table({})", table.name),
            SchemaStatement::DropTable { name, .. } => format!("drop_table({})", name),
            SchemaStatement::RenameTable { from, to } => format!("rename_table({}, {})", from, to),
            SchemaStatement::AddColumn { table, column } => {
                format!("add_column({}, {})", table, column.name)
            }
            SchemaStatement::RemoveColumn { table, column, .. } => {
                format!("remove_column({}, {})", table, column)
            }
            SchemaStatement::RenameColumn { table, from, to } => {
                format!("rename_column({}, {}, {})", table, from, to)
            }
            SchemaStatement::AddIndex(index) => format!("add_index({}, {})", index.table, index.name),
            SchemaStatement::RemoveIndex { table, name, .. } => {
                format!("remove_index({}, {})", table, name)
            }
            SchemaStatement::Execute { .. } => "execute".to_string(),
        }
    }

    /// Render this statement for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let q = |name: &str| dialect.quote_ident(name);
        let sql = match self {
            SchemaStatement::CreateTable(table) => {
                let columns: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| format!("  {}", c.to_sql(dialect)))
                    .collect();
                format!("CREATE TABLE {} (\n{}\n)", q(&table.name), columns.join(",\n"))
            }
            SchemaStatement::DropTable { name, .. } => format!("DROP TABLE {}", q(name)),
            SchemaStatement::RenameTable { from, to } => match dialect {
                Dialect::Mysql => format!("RENAME TABLE {} TO {}", q(from), q(to)),
                Dialect::Sqlite | Dialect::Postgres => {
                    format!("ALTER TABLE {} RENAME TO {}", q(from), q(to))
                }
            },
            SchemaStatement::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                q(table),
                column.to_sql(dialect)
            ),
            SchemaStatement::RemoveColumn { table, column, .. } => {
                format!("ALTER TABLE {} DROP COLUMN {}", q(table), q(column))
            }
            SchemaStatement::RenameColumn { table, from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                q(table),
                q(from),
                q(to)
            ),
            SchemaStatement::AddIndex(index) => {
                let columns: Vec<String> = index.columns.iter().map(|c| q(c)).collect();
                format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    q(&index.name),
                    q(&index.table),
                    columns.join(", ")
                )
            }
            SchemaStatement::RemoveIndex { table, name, .. } => match dialect {
                Dialect::Mysql => format!("DROP INDEX {} ON {}", q(name), q(table)),
                Dialect::Sqlite | Dialect::Postgres => format!("DROP INDEX {}", q(name)),
            },
            SchemaStatement::Execute { up, .. } => up.clone(),
        };
        tracing::trace!(dialect = %dialect, sql = %sql, "rendered schema statement");
        sql
    }
}

/// Inverses of `statements`, in reverse order.
///
/// Returns the first irreversible statement as the error.
pub fn invert_all(statements: &[SchemaStatement]) -> Result<Vec<SchemaStatement>, &SchemaStatement> {
    statements
        .iter()
        .rev()
        .map(|statement| statement.inverse().ok_or(statement))
        .collect()
}
