//! # Telemetry Module
//!
//! Session measurement state and its persistence.
//!
//! This module handles:
//! - Holding the latest measurement per parameter (shared session tables)
//! - Appending one CSV row per acquisition cycle
//! - Saving and restoring binary snapshots of all session tables

pub mod table;
pub mod logger;
pub mod snapshot;

pub use logger::{LogRow, LogWriter};
pub use snapshot::{Snapshot, SnapshotStore};
pub use table::{MeasurementTable, NamedTable, Session};

use chrono::NaiveDateTime;

/// File name stem for logs and snapshots (`2024.05.17-14.03.09`)
pub fn file_stamp(at: NaiveDateTime) -> String {
    at.format("%Y.%m.%d-%H.%M.%S").to_string()
}
