//! Plain-text attendance report.

use crate::types::AttendanceRecord;
use std::fmt::Write;

pub const REPORT_TITLE: &str = "--- Attendance Report ---";
pub const EMPTY_REPORT: &str = "No attendance records found.";

/// Render records as an aligned two-column table, in the order given.
pub fn render_report(records: &[AttendanceRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{REPORT_TITLE}");

    if records.is_empty() {
        let _ = writeln!(out, "{EMPTY_REPORT}");
        let _ = writeln!(out, "{}", "-".repeat(REPORT_TITLE.len()));
        return out;
    }

    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .chain(std::iter::once("name".len()))
        .max()
        .unwrap_or(4);

    let _ = writeln!(out, "{:<name_width$}  timestamp", "name");
    for record in records {
        let _ = writeln!(out, "{:<name_width$}  {}", record.name, record.timestamp);
    }
    let _ = writeln!(out, "{}", "-".repeat(REPORT_TITLE.len()));
    out
}
