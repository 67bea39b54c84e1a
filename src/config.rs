//! Configuration for pgroster.
//!
//! Looked up in this order:
//! - an explicit `--config <path>`
//! - `pgroster.toml` in the working directory
//! - `<config dir>/pgroster/config.toml`
//!
//! ```toml
//! database_url = "postgres://app@localhost:5432/app_dev"
//! prefix = "app"
//! exclude = ["postgres", "rdsadmin"]
//! concurrency = 4
//!
//! [migrations]
//! schema = "public"
//! table = "knex_migrations"
//! directory = "db/migrations"
//!
//! [superuser]
//! user = "postgres"
//! password = "secret"
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::annotate::DEFAULT_CONCURRENCY;
use crate::error::{RosterError, RosterResult};

pub const CONFIG_FILE_NAME: &str = "pgroster.toml";

/// Top-level config file contents.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Inventory database URL; `--url` / `DATABASE_URL` take precedence.
    pub database_url: Option<String>,
    /// Default name prefix. The CLI filters on `"<prefix>_"`.
    pub prefix: Option<String>,
    /// Databases that are never listed.
    pub exclude: Vec<String>,
    /// Maximum number of simultaneous status introspection connections.
    pub concurrency: usize,
    pub migrations: Option<MigrationsConfig>,
    pub superuser: Option<SuperuserConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            prefix: None,
            exclude: default_exclude(),
            concurrency: default_concurrency(),
            migrations: None,
            superuser: None,
        }
    }
}

fn default_exclude() -> Vec<String> {
    vec!["postgres".to_string()]
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Where the migration framework keeps its bookkeeping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsConfig {
    pub schema: String,
    pub table: String,
    pub directory: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "knex_migrations".to_string(),
            directory: PathBuf::from("migrations"),
        }
    }
}

/// Elevated credentials used only for status introspection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SuperuserConfig {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Config {
    /// Load config, falling back to defaults when no file is found.
    ///
    /// An explicit path must exist; implicit locations are optional.
    pub fn load(explicit: Option<&Path>) -> RosterResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|d| d.join("pgroster").join("config.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Parse a config file. Relative migration directories are anchored
    /// to the file's own directory.
    pub fn from_file(path: &Path) -> RosterResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| RosterError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self::parse(&content).map_err(|message| RosterError::Config {
            path: path.to_path_buf(),
            message,
        })?;

        if let (Some(migrations), Some(base)) = (config.migrations.as_mut(), path.parent()) {
            if migrations.directory.is_relative() {
                migrations.directory = base.join(&migrations.directory);
            }
        }

        Ok(config)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        Ok(config)
    }

    /// Prefix the CLI filters on when none is given: `"<prefix>_"` or empty.
    pub fn default_prefix(&self) -> String {
        match self.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{}_", p),
            _ => String::new(),
        }
    }

    /// Freeze the parts of the config the report pipeline needs.
    pub fn report_settings(&self) -> ReportSettings {
        let migrations = self.migrations.clone().unwrap_or_default();
        ReportSettings {
            exclude: self.exclude.iter().cloned().collect(),
            migrations_schema: migrations.schema,
            migrations_table: migrations.table,
            migrations_dir: migrations.directory,
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Resolve the three-valued verbose flag into a concrete boolean.
///
/// An explicit `--verbose` / `--no-verbose` wins; otherwise migration
/// status is shown whenever the config declares a `[migrations]` table.
pub fn resolve_show_migrations(explicit: Option<bool>, config: &Config) -> bool {
    explicit.unwrap_or(config.migrations.is_some())
}

/// Immutable settings handed to [`crate::report::build_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    /// Always-ignored database names.
    pub exclude: BTreeSet<String>,
    pub migrations_schema: String,
    pub migrations_table: String,
    /// Local migration files, shared reference point for every database.
    pub migrations_dir: PathBuf,
    /// Fan-out width for status introspection.
    pub concurrency: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Config::default().report_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.exclude, vec!["postgres".to_string()]);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.default_prefix(), "");
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            database_url = "postgres://app@localhost/app_dev"
            prefix = "app"
            exclude = ["postgres", "rdsadmin"]
            concurrency = 2

            [migrations]
            table = "schema_versions"

            [superuser]
            user = "root"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_prefix(), "app_");
        assert_eq!(config.concurrency, 2);

        let migrations = config.migrations.clone().unwrap();
        assert_eq!(migrations.schema, "public");
        assert_eq!(migrations.table, "schema_versions");
        assert_eq!(migrations.directory, PathBuf::from("migrations"));

        let superuser = config.superuser.clone().unwrap();
        assert_eq!(superuser.user, "root");
        assert_eq!(superuser.password, None);

        let settings = config.report_settings();
        assert!(settings.exclude.contains("rdsadmin"));
        assert_eq!(settings.migrations_table, "schema_versions");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::parse("concurrency = 0").unwrap_err();
        assert!(err.contains("concurrency"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("prefx = \"app\"").is_err());
    }

    #[test]
    fn test_resolve_show_migrations() {
        let plain = Config::default();
        let with_migrations = Config {
            migrations: Some(MigrationsConfig::default()),
            ..Config::default()
        };

        assert!(!resolve_show_migrations(None, &plain));
        assert!(resolve_show_migrations(None, &with_migrations));
        assert!(resolve_show_migrations(Some(true), &plain));
        assert!(!resolve_show_migrations(Some(false), &with_migrations));
    }

    #[test]
    fn test_from_file_anchors_migrations_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[migrations]\ndirectory = \"db/migrations\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config.migrations.unwrap().directory,
            dir.path().join("db/migrations")
        );
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, RosterError::Config { .. }));
    }
}
