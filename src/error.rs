//! Error taxonomy shared by every store and the asset manager.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Record, user, tag or catalog table absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Unique-constraint violation on a username or tag name.
    #[error("{0} already exists")]
    DuplicateKey(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic version check failed on a record update.
    #[error("record was modified by someone else (expected version {expected}, found {actual})")]
    Conflict { expected: i64, actual: i64 },

    #[error("permission denied")]
    PermissionDenied,

    /// File write/delete failure. A missing file is never reported this way.
    #[error("storage I/O failure at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog configuration: {0}")]
    Registry(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::StorageIo { path: path.into(), source }
    }
}

/// True when the error is a SQLite UNIQUE (or primary key) constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Converts a unique-constraint failure into `DuplicateKey`, passing other errors through.
pub(crate) fn map_unique(err: rusqlite::Error, what: impl FnOnce() -> String) -> CatalogError {
    if is_unique_violation(&err) {
        CatalogError::DuplicateKey(what())
    } else {
        CatalogError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_unique_violation_maps_to_duplicate_key() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT NOT NULL UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();

        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(is_unique_violation(&err));

        let mapped = map_unique(err, || "tag 'a'".to_string());
        assert!(matches!(mapped, CatalogError::DuplicateKey(ref what) if what == "tag 'a'"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(!is_unique_violation(&err));
        assert!(matches!(map_unique(err, String::new), CatalogError::Database(_)));
    }
}
