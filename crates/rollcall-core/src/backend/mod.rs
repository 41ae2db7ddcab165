//! Attendance persistence.
//!
//! Both backends store at most one record per name. Recording a name that
//! is already present is a successful no-op, never an error.

pub mod flat_file;
pub mod sqlite;

pub use flat_file::FlatFileBackend;
pub use sqlite::SqliteBackend;

use crate::types::AttendanceRecord;
use chrono::{DateTime, Local};
use thiserror::Error;

/// Timestamp layout used for every stored record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("attendance file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed attendance line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },
}

/// What `record_if_absent` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyPresent,
}

/// Append-only, idempotent attendance store.
pub trait AttendanceBackend {
    /// Store `(name, timestamp)` unless a record for `name` already exists.
    fn record_if_absent(
        &mut self,
        name: &str,
        timestamp: &str,
    ) -> Result<RecordOutcome, BackendError>;

    /// Every stored record in insertion order.
    fn records(&self) -> Result<Vec<AttendanceRecord>, BackendError>;
}

/// Format a wall-clock instant the way records store it.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current local time in record format.
pub fn now_timestamp() -> String {
    format_timestamp(Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-07 09:05:01");
    }

    /// Exercise the shared contract against any backend.
    pub(crate) fn assert_idempotent(backend: &mut dyn AttendanceBackend) {
        let first = backend.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap();
        let second = backend.record_if_absent("ALICE", "2024-01-01 09:30:00").unwrap();
        assert_eq!(first, RecordOutcome::Inserted);
        assert_eq!(second, RecordOutcome::AlreadyPresent);

        let records = backend.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ALICE");
        assert_eq!(records[0].timestamp, "2024-01-01 09:00:00");
    }

    /// Every written record comes back once, in write order, unchanged.
    pub(crate) fn assert_report_round_trip(backend: &mut dyn AttendanceBackend) {
        let written = [
            ("CAROL", "2024-01-02 08:00:00"),
            ("ALICE", "2024-01-02 08:01:00"),
            ("BOB", "2024-01-02 08:02:30"),
        ];
        for (name, ts) in written {
            backend.record_if_absent(name, ts).unwrap();
        }
        backend.record_if_absent("ALICE", "2024-01-02 09:00:00").unwrap();

        let records = backend.records().unwrap();
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.name.as_str(), r.timestamp.as_str()))
            .collect();
        assert_eq!(got, written.to_vec());
    }
}
