//! Store configuration loaded from environment variables.
//!
//! All settings have defaults so a database can be opened with zero
//! configuration for local development.

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{Result, StoreError};

/// Deployment environment.  Selects the default database file and the
/// dotenv file an entry point should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn database_file_name(&self) -> &'static str {
        match self {
            Environment::Development => "shopdb.db",
            Environment::Test => "shopdb-test.db",
        }
    }

    pub fn dotenv_file(&self) -> &'static str {
        match self {
            Environment::Development => ".env",
            Environment::Test => ".env.test",
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Explicit database file.
    /// Env: `SHOPDB_DATABASE_PATH`
    /// Default: platform data directory, see [`StoreConfig::resolve_path`].
    pub database_path: Option<PathBuf>,

    /// Env: `SHOPDB_ENV` (`test` or anything else)
    /// Default: development.
    pub environment: Environment,

    /// Upgrade to head whenever the database is opened.
    /// Env: `SHOPDB_AUTO_MIGRATE` (true/false)
    /// Default: `true`
    pub auto_migrate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            environment: Environment::default(),
            auto_migrate: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("SHOPDB_DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(env) = lookup("SHOPDB_ENV") {
            config.environment = Environment::parse(&env);
        }

        if let Some(val) = lookup("SHOPDB_AUTO_MIGRATE") {
            config.auto_migrate = val != "false" && val != "0";
        }

        config
    }

    /// The database file to open.
    ///
    /// Without an explicit path the file lives in the platform data directory:
    /// - Linux:   `~/.local/share/shopdb/shopdb.db`
    /// - macOS:   `~/Library/Application Support/com.shopdb.shopdb/shopdb.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\shopdb\shopdb\data\shopdb.db`
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let project_dirs =
            ProjectDirs::from("com", "shopdb", "shopdb").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs
            .data_dir()
            .join(self.environment.database_file_name()))
    }
}
