//! Header-less `name,timestamp` text file.
//!
//! The file is re-scanned before every append, so handles opened one after
//! another agree on who is present. Only one process may write a given file
//! at a time: the scan and the append are not locked against other writers.

use super::{AttendanceBackend, BackendError, RecordOutcome};
use crate::types::AttendanceRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FlatFileBackend {
    path: PathBuf,
}

impl FlatFileBackend {
    /// Use `path` as the attendance file, creating its parent directory.
    ///
    /// The file itself is created on the first insert.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "using flat-file attendance backend");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>, BackendError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Split a line at its last comma; timestamps never contain one.
fn parse_line(index: usize, line: &str) -> Result<AttendanceRecord, BackendError> {
    let (name, timestamp) = line
        .rsplit_once(',')
        .ok_or_else(|| BackendError::MalformedLine {
            line: index + 1,
            content: line.to_string(),
        })?;
    Ok(AttendanceRecord {
        name: name.to_string(),
        timestamp: timestamp.trim_end_matches('\r').to_string(),
    })
}

impl AttendanceBackend for FlatFileBackend {
    fn record_if_absent(
        &mut self,
        name: &str,
        timestamp: &str,
    ) -> Result<RecordOutcome, BackendError> {
        let present = self
            .read_lines()?
            .iter()
            .enumerate()
            .filter_map(|(i, line)| parse_line(i, line).ok())
            .any(|record| record.name == name);
        if present {
            return Ok(RecordOutcome::AlreadyPresent);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{name},{timestamp}")?;
        file.sync_data()?;

        Ok(RecordOutcome::Inserted)
    }

    fn records(&self) -> Result<Vec<AttendanceRecord>, BackendError> {
        self.read_lines()?
            .iter()
            .enumerate()
            .map(|(i, line)| parse_line(i, line))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::{assert_idempotent, assert_report_round_trip};

    fn backend() -> (tempfile::TempDir, FlatFileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FlatFileBackend::open(dir.path().join("attendance/attendance.csv")).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_idempotent_insert() {
        let (_dir, mut backend) = backend();
        assert_idempotent(&mut backend);
    }

    #[test]
    fn test_report_round_trip() {
        let (_dir, mut backend) = backend();
        assert_report_round_trip(&mut backend);
    }

    #[test]
    fn test_file_layout() {
        let (_dir, mut backend) = backend();
        backend.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap();
        backend.record_if_absent("BOB", "2024-01-01 09:01:00").unwrap();
        let content = std::fs::read_to_string(backend.path()).unwrap();
        assert_eq!(content, "ALICE,2024-01-01 09:00:00\nBOB,2024-01-01 09:01:00\n");
    }

    #[test]
    fn test_second_handle_sees_first_handles_write() {
        let (_dir, mut first) = backend();
        let mut second = FlatFileBackend::open(first.path()).unwrap();
        assert_eq!(
            first.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            second.record_if_absent("ALICE", "2024-01-01 09:05:00").unwrap(),
            RecordOutcome::AlreadyPresent
        );
        assert_eq!(second.records().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_has_no_records() {
        let (_dir, backend) = backend();
        assert!(backend.records().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_sees_existing_records() {
        let (dir, mut backend) = backend();
        backend.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap();
        drop(backend);

        let mut reopened =
            FlatFileBackend::open(dir.path().join("attendance/attendance.csv")).unwrap();
        let outcome = reopened.record_if_absent("ALICE", "2024-01-02 09:00:00").unwrap();
        assert_eq!(outcome, RecordOutcome::AlreadyPresent);
    }

    #[test]
    fn test_malformed_line_reported() {
        let (_dir, backend) = backend();
        std::fs::write(backend.path(), "ALICE,2024-01-01 09:00:00\ngarbage\n").unwrap();
        match backend.records() {
            Err(BackendError::MalformedLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed line error, got {other:?}"),
        }
    }

    #[test]
    fn test_name_prefix_is_not_a_match() {
        let (_dir, mut backend) = backend();
        backend.record_if_absent("ALICE", "2024-01-01 09:00:00").unwrap();
        let outcome = backend.record_if_absent("ALI", "2024-01-01 09:00:01").unwrap();
        assert_eq!(outcome, RecordOutcome::Inserted);
    }
}
