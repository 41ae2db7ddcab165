//! SQLite table keyed by name.

use super::{AttendanceBackend, BackendError, RecordOutcome};
use crate::types::AttendanceRecord;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    name TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (name)
);
";

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) the database file and ensure the table exists.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl AttendanceBackend for SqliteBackend {
    fn record_if_absent(
        &mut self,
        name: &str,
        timestamp: &str,
    ) -> Result<RecordOutcome, BackendError> {
        match self.conn.execute(
            "INSERT INTO attendance (name, timestamp) VALUES (?1, ?2)",
            params![name, timestamp],
        ) {
            Ok(_) => Ok(RecordOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(RecordOutcome::AlreadyPresent),
            Err(e) => Err(e.into()),
        }
    }

    fn records(&self) -> Result<Vec<AttendanceRecord>, BackendError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, timestamp FROM attendance ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(AttendanceRecord {
                name: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::{assert_idempotent, assert_report_round_trip};

    #[test]
    fn test_idempotent_insert() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        assert_idempotent(&mut backend);
    }

    #[test]
    fn test_report_round_trip() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        assert_report_round_trip(&mut backend);
    }

    #[test]
    fn test_empty_table() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.records().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        {
            let mut backend = SqliteBackend::open(&path).unwrap();
            backend.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap();
        }
        let mut backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(
            backend.record_if_absent("ALICE", "2024-01-01 10:00:00").unwrap(),
            RecordOutcome::AlreadyPresent
        );
        assert_eq!(backend.records().unwrap().len(), 1);
    }

    #[test]
    fn test_existing_table_is_reused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO attendance (name, timestamp) VALUES ('BOB', '2024-01-01 08:00:00')",
            [],
        )
        .unwrap();
        let backend = SqliteBackend::with_connection(conn).unwrap();
        assert_eq!(backend.records().unwrap()[0].name, "BOB");
    }
}
