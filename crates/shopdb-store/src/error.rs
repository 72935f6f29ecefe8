use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A single migration step failed.  The SQLite error is kept as the source.
    #[error("Migration {revision} failed during {direction}: {source}")]
    Step {
        revision: &'static str,
        direction: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The registry or a requested transition is inconsistent.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A revision identifier that is not in the registry.
    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    /// The live schema differs from the table descriptors.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
