//! Lazy handles to migrations.
//!
//! Listing and status reporting only need a migration's version and name.
//! A [`MigrationProxy`] carries those and loads the migration body the first
//! time it is executed.

use crate::migration::{Migration, camelize, humanize, underscore};
use regex::Regex;
use sqlshift_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

/// `<version>_<snake_name>[.<scope>].sql`
pub const MIGRATION_FILENAME_PATTERN: &str = r"^(\d+)_([_a-z0-9]*)\.?([_a-z0-9]*)?\.sql$";

static FILENAME_REGEX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(MIGRATION_FILENAME_PATTERN));

/// The compiled [`MIGRATION_FILENAME_PATTERN`].
pub fn migration_filename_regex() -> Result<&'static Regex> {
    FILENAME_REGEX
        .as_ref()
        .map_err(|e| Error::config(format!("invalid migration filename pattern: {}", e)))
}

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";
const NO_TRANSACTION_MARKER: &str = "-- migrate:no_transaction";

/// Version, snake name and scope parsed from a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFilename {
    pub version: u64,
    pub name: String,
    pub scope: Option<String>,
}

/// Parse a migration file name (the base name, not a full path).
///
/// Returns `None` if the name does not follow the migration pattern.
pub fn parse_migration_filename(file_name: &str) -> Result<Option<MigrationFilename>> {
    let Some(caps) = migration_filename_regex()?.captures(file_name) else {
        return Ok(None);
    };
    let Ok(version) = caps[1].parse::<u64>() else {
        return Ok(None);
    };
    let scope = caps
        .get(3)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());
    Ok(Some(MigrationFilename {
        version,
        name: caps[2].to_string(),
        scope,
    }))
}

fn status_name(snake_name: &str, scope: Option<&str>) -> String {
    humanize(&format!("{}{}", snake_name, scope.unwrap_or_default()))
}

#[derive(Debug, Clone)]
enum Source {
    Registered(Arc<Migration>),
    File(PathBuf),
}

/// A migration known by version and name, loaded on first use.
#[derive(Debug, Clone)]
pub struct MigrationProxy {
    version: u64,
    name: String,
    scope: Option<String>,
    display_name: String,
    source: Source,
    loaded: Arc<OnceLock<Arc<Migration>>>,
}

impl MigrationProxy {
    /// Wrap a migration registered in code.
    pub fn registered(migration: Migration) -> Self {
        Self::from_arc(Arc::new(migration))
    }

    pub fn from_arc(migration: Arc<Migration>) -> Self {
        let loaded = OnceLock::new();
        let _ = loaded.set(Arc::clone(&migration));
        let scope = migration.scope_name().map(str::to_string);
        Self {
            version: migration.version(),
            name: migration.name().to_string(),
            display_name: status_name(&underscore(migration.name()), scope.as_deref()),
            scope,
            source: Source::Registered(migration),
            loaded: Arc::new(loaded),
        }
    }

    /// A proxy for the migration file at `path`.
    ///
    /// Fails with `IllegalName` when the file name does not parse.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parsed = parse_migration_filename(&file_name)?
            .ok_or_else(|| Error::illegal_migration_name(&path.display().to_string()))?;
        Ok(Self {
            version: parsed.version,
            name: camelize(&parsed.name),
            display_name: status_name(&parsed.name, parsed.scope.as_deref()),
            scope: parsed.scope,
            source: Source::File(path),
            loaded: Arc::new(OnceLock::new()),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// The file this migration is read from, if any.
    pub fn filename(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Registered(_) => None,
        }
    }

    /// Human-readable name for status listings.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether the body has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Load (once) and return the migration.
    pub fn load(&self) -> Result<Arc<Migration>> {
        if let Some(migration) = self.loaded.get() {
            return Ok(Arc::clone(migration));
        }
        let migration = match &self.source {
            Source::Registered(migration) => Arc::clone(migration),
            Source::File(path) => {
                tracing::debug!(path = %path.display(), version = self.version, "loading migration file");
                let text = std::fs::read_to_string(path)?;
                Arc::new(parse_sql_migration(self, &text))
            }
        };
        Ok(Arc::clone(self.loaded.get_or_init(|| migration)))
    }
}

/// Build a migration from the text of a SQL migration file.
///
/// The file holds an up section and an optional down section, introduced
/// by `-- migrate:up` and `-- migrate:down`. A file without markers is
/// all up. `-- migrate:no_transaction` on its own line disables the DDL
/// transaction.
fn parse_sql_migration(proxy: &MigrationProxy, text: &str) -> Migration {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let has_markers = text.lines().any(|line| {
        let line = line.trim();
        line == UP_MARKER || line == DOWN_MARKER
    });

    let mut section = if has_markers { Section::Preamble } else { Section::Up };
    let mut up = String::new();
    let mut down: Option<String> = None;
    let mut no_transaction = false;

    for line in text.lines() {
        match line.trim() {
            UP_MARKER => section = Section::Up,
            DOWN_MARKER => {
                section = Section::Down;
                down.get_or_insert_with(String::new);
            }
            NO_TRANSACTION_MARKER => no_transaction = true,
            _ => {
                let target = match section {
                    Section::Preamble => continue,
                    Section::Up => &mut up,
                    Section::Down => down.get_or_insert_with(String::new),
                };
                target.push_str(line);
                target.push('\n');
            }
        }
    }

    let down = down.filter(|sql| !sql.trim().is_empty());
    let mut migration = Migration::new(proxy.version, &proxy.name).sql(up, down);
    if let Some(scope) = &proxy.scope {
        migration = migration.scope(scope.clone());
    }
    if no_transaction {
        migration = migration.disable_ddl_transaction();
    }
    migration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationBody;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("sqlshift_proxy_{}_{}", name, std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn join(&self, file: &str) -> PathBuf {
            self.0.join(file)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_parse_filenames() {
        let parsed = parse_migration_filename("20100101010101_people_have_last_names.sql")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.version, 20_100_101_010_101);
        assert_eq!(parsed.name, "people_have_last_names");
        assert_eq!(parsed.scope, None);

        let scoped = parse_migration_filename("1_create_posts.blog.sql").unwrap().unwrap();
        assert_eq!(scoped.scope.as_deref(), Some("blog"));

        assert!(parse_migration_filename("1_CreatePosts.sql").unwrap().is_none());
        assert!(parse_migration_filename("create_posts.sql").unwrap().is_none());
        assert!(parse_migration_filename("1_create_posts.rb").unwrap().is_none());
    }

    #[test]
    fn test_filename_regex_is_compiled_once() {
        let first = migration_filename_regex().unwrap();
        let second = migration_filename_regex().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(first.is_match("20240101000000_create_users.sql"));
    }

    #[test]
    fn test_file_proxy_is_lazy() {
        let dir = TempDir::new("lazy");
        let path = dir.join("3_innocent_jointable.sql");
        std::fs::write(
            &path,
            "-- migrate:up\nCREATE TABLE t (id INTEGER);\n-- migrate:down\nDROP TABLE t;\n",
        )
        .unwrap();

        let proxy = MigrationProxy::from_file(&path).unwrap();
        assert_eq!(proxy.version(), 3);
        assert_eq!(proxy.name(), "InnocentJointable");
        assert_eq!(proxy.display_name(), "Innocent jointable");
        assert!(!proxy.is_loaded());

        let migration = proxy.load().unwrap();
        assert!(proxy.is_loaded());
        match migration.body() {
            MigrationBody::Sql { up, down } => {
                assert_eq!(up.trim(), "CREATE TABLE t (id INTEGER);");
                assert_eq!(down.as_deref().map(str::trim), Some("DROP TABLE t;"));
            }
            other => panic!("unexpected body {:?}", other),
        }

        // Cached: the file is not read again.
        std::fs::remove_file(&path).unwrap();
        assert!(proxy.clone().load().is_ok());
    }

    #[test]
    fn test_file_without_markers_is_up_only() {
        let dir = TempDir::new("plain");
        let path = dir.join("7_backfill.sql");
        std::fs::write(&path, "-- migrate:no_transaction\nUPDATE t SET a = 1;\n").unwrap();

        let migration = MigrationProxy::from_file(&path).unwrap().load().unwrap();
        assert!(migration.ddl_transaction_disabled());
        assert!(matches!(
            migration.body(),
            MigrationBody::Sql { down: None, .. }
        ));
    }

    #[test]
    fn test_illegal_file_name() {
        let err = MigrationProxy::from_file("db/migrate/1_BadName.sql").unwrap_err();
        assert_eq!(
            err.migration_kind(),
            Some(sqlshift_core::MigrationErrorKind::IllegalName)
        );
    }

    #[test]
    fn test_registered_proxy_is_loaded() {
        let proxy = MigrationProxy::registered(Migration::new(1, "create_users").scope("auth"));
        assert!(proxy.is_loaded());
        assert_eq!(proxy.scope(), Some("auth"));
        assert_eq!(proxy.display_name(), "Create usersauth");
        assert!(proxy.filename().is_none());
    }
}
