//! Options for migration tasks, read from the environment.
//!
//! | variable  | meaning                                                    |
//! |-----------|------------------------------------------------------------|
//! | `VERSION` | target version: digits, or a migration file name           |
//! | `STEP`    | number of migrations for rollback/forward (default 1)      |
//! | `VERBOSE` | announce progress unless set to `false`                    |
//! | `SCOPE`   | only run migrations with this scope                        |

use regex::Regex;
use sqlshift_core::{Error, Result};
use sqlshift_schema::migration_filename_regex;
use std::sync::LazyLock;

static DIGITS: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\d+$"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    pub version: Option<u64>,
    pub step: Option<usize>,
    pub verbose: bool,
    pub scope: Option<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            version: None,
            step: None,
            verbose: true,
            scope: None,
        }
    }
}

impl MigrateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `VERSION`, `STEP`, `VERBOSE` and `SCOPE` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let version = present("VERSION")
            .map(|raw| parse_target_version(&raw))
            .transpose()?;
        let step = present("STEP")
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| Error::config(format!("Invalid STEP value: `{}`", raw)))
            })
            .transpose()?;
        let verbose = lookup("VERBOSE").is_none_or(|v| v != "false");
        let scope = present("SCOPE");

        let options = Self {
            version,
            step,
            verbose,
            scope,
        };
        tracing::debug!(?options, "migration options");
        Ok(options)
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Steps for rollback/forward, defaulting to 1.
    pub fn steps(&self) -> usize {
        self.step.unwrap_or(1)
    }
}

/// Accept `20240101000000` or `20240101000000_create_users.sql`.
pub fn parse_target_version(raw: &str) -> Result<u64> {
    let invalid = || Error::config(format!("Invalid format of target version: `VERSION={}`", raw));
    let digits = DIGITS.as_ref().map_err(|e| Error::config(e.to_string()))?;
    let filename = migration_filename_regex()?;
    if !digits.is_match(raw) && !filename.is_match(raw) {
        return Err(invalid());
    }
    let leading: String = raw.chars().take_while(char::is_ascii_digit).collect();
    leading.parse::<u64>().map_err(|_| invalid())
}
