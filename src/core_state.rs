//! Transport-agnostic application state.
//!
//! Holds the data directory and opens per-request SQLite connections.
//! The engine is stateless between calls; all workflow state lives in
//! the database, so a fresh connection per request is sufficient.

use std::path::PathBuf;

use rusqlite::Connection;

use crate::config;
use crate::db::{open_database, DatabaseError};

pub struct AppCore {
    pub data_dir: PathBuf,
}

impl AppCore {
    pub fn new() -> Self {
        Self {
            data_dir: config::app_data_dir(),
        }
    }

    /// Construct with an explicit data directory (tests use a tempdir).
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("labflow.db")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Open a connection to the clinic database, creating the data
    /// directory and running migrations on first use.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| DatabaseError::ConstraintViolation(format!("data dir: {e}")))?;
        open_database(&self.db_path())
    }
}

impl Default for AppCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_db_creates_data_dir_and_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let core = AppCore::with_data_dir(tmp.path().join("nested"));
        let conn = core.open_db().unwrap();
        let tables = crate::db::count_tables(&conn).unwrap();
        assert!(tables >= 7, "expected full schema, got {tables} tables");
    }

    #[test]
    fn reports_dir_under_data_dir() {
        let core = AppCore::with_data_dir(PathBuf::from("/tmp/lf"));
        assert_eq!(core.reports_dir(), PathBuf::from("/tmp/lf/reports"));
    }
}
