//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] with foreign-key
//! enforcement switched on.  Unless disabled in [`StoreConfig`], migrations
//! are brought up to head before the handle is returned.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::inspect;
use crate::migrations::{self, Migrator};

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = config.resolve_path()?;
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!(path = %db_path.display(), "opening database");

        if config.auto_migrate {
            Self::open_at(&db_path)
        } else {
            Self::open_unmigrated(&db_path)
        }
    }

    /// Open (or create) a database at an explicit path and upgrade it to head.
    pub fn open_at(path: &Path) -> Result<Self> {
        let mut db = Self::open_unmigrated(path)?;
        migrations::run_migrations(&mut db.conn)?;
        Ok(db)
    }

    /// Open a database without touching its schema.
    pub fn open_unmigrated(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self { conn })
    }

    /// Open an existing database for inspection only.
    ///
    /// Fails if the file does not exist.  Neither the file nor its journal
    /// mode is changed.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database read-only");
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Fresh in-memory database at head.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    pub fn current_revision(&self) -> Result<Option<String>> {
        migrations::current_revision(&self.conn)
    }

    pub fn upgrade(&mut self, target: Option<&str>) -> Result<Vec<&'static str>> {
        Migrator::default().upgrade(&mut self.conn, target)
    }

    pub fn downgrade(&mut self, target: Option<&str>) -> Result<Vec<&'static str>> {
        Migrator::default().downgrade(&mut self.conn, target)
    }

    /// Check the live schema against every table the applied revision owns.
    pub fn verify_schema(&self) -> Result<()> {
        let expected = Migrator::default().expected_tables(&self.conn)?;
        inspect::verify_schema(&self.conn, &expected)
    }
}
