//! # CSV Data Log
//!
//! Appends one row per acquisition cycle to a comma-separated log file.
//!
//! The header is written only when the file is empty at open time, so a
//! log reopened across pause/resume or restarts never repeats it. Fields
//! are numeric or fixed enum text and are never quoted.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::debug;

use super::file_stamp;
use crate::error::Result;
use crate::metrics::{DerivedMetric, MetricKind, PrimaryReadings};
use crate::obd::protocol::{ParameterId, Reading};

/// Timestamp column format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Log file extension
pub const LOG_EXTENSION: &str = "csv";

/// Column name for a primary parameter
pub fn parameter_column(parameter: ParameterId) -> &'static str {
    match parameter {
        ParameterId::VehicleSpeed => "Speed (km/h)",
        ParameterId::EngineRpm => "Engine RPM",
        ParameterId::EngineLoad => "Engine Load (%)",
        ParameterId::MassAirFlow => "MAF (g/s)",
    }
}

/// One cycle's worth of log data
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub timestamp: NaiveDateTime,
    /// Readings in [`ParameterId::ALL`] order
    pub readings: [Reading; 4],
    /// Derived metrics in [`MetricKind::ALL`] order
    pub derived: [DerivedMetric; 4],
}

impl LogRow {
    pub fn new(timestamp: NaiveDateTime, readings: &PrimaryReadings, derived: [DerivedMetric; 4]) -> Self {
        Self {
            timestamp,
            readings: ParameterId::ALL.map(|p| readings.get(p)),
            derived,
        }
    }

    /// Fixed column header
    pub fn header() -> Vec<&'static str> {
        std::iter::once("Timestamp")
            .chain(ParameterId::ALL.iter().map(|&p| parameter_column(p)))
            .chain(MetricKind::ALL.iter().map(|k| k.column()))
            .collect()
    }

    /// Field texts in header order
    pub fn fields(&self) -> Vec<String> {
        std::iter::once(self.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .chain(self.readings.iter().map(|r| r.to_string()))
            .chain(self.derived.iter().map(|m| m.value.to_string()))
            .collect()
    }
}

/// Append-only CSV log writer
///
/// Only the acquisition cycle appends; cycles never overlap, so no file
/// locking is done here.
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for a log named after `started` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>, started: NaiveDateTime) -> Self {
        let name = format!("{}.{}", file_stamp(started), LOG_EXTENSION);
        Self::new(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is empty
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Csv` if the directory or file cannot be created or
    /// written. The row is lost in that case.
    pub fn append_row(&self, row: &LogRow) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let write_header = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);

        if write_header {
            writer.write_record(LogRow::header())?;
        }
        writer.write_record(row.fields())?;
        writer.flush()?;

        debug!("Appended log row to {}", self.path.display());
        Ok(())
    }
}
