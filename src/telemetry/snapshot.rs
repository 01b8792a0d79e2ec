//! # Measurement Snapshots
//!
//! Binary point-in-time copies of the session tables.
//!
//! Stream layout (bincode, in order):
//!
//! ```text
//! service mode (u8) | table 1 | table 2 | ... | table N
//! ```
//!
//! Tables are written and read in [`TABLE_ORDER`]. A stored service mode of
//! 0 means "keep the current mode" on load.

use std::fs;
use std::path::{Path, PathBuf};

use bincode::Options;
use chrono::NaiveDateTime;
use tracing::info;

use super::file_stamp;
use super::table::{NamedTable, Session, TABLE_ORDER};
use crate::error::{ObdLoggerError, Result};

/// Snapshot file extension
pub const SNAPSHOT_EXTENSION: &str = "obd";

/// Decoded snapshot contents
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub service_mode: u8,
    pub tables: Vec<NamedTable>,
}

/// Snapshot serializer
pub struct SnapshotStore;

impl SnapshotStore {
    /// Serialize the service mode followed by each table, in slice order
    ///
    /// # Errors
    ///
    /// Returns `CorruptSnapshot` if a table cannot be serialized.
    pub fn save(tables: &[NamedTable], service_mode: u8) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bincode::options()
            .serialize_into(&mut bytes, &service_mode)
            .map_err(corrupt)?;
        for table in tables {
            bincode::options().serialize_into(&mut bytes, table).map_err(corrupt)?;
        }
        Ok(bytes)
    }

    /// Deserialize a snapshot holding exactly the tables named in `expected`
    ///
    /// # Errors
    ///
    /// Returns `CorruptSnapshot` if the stream ends early, a table fails to
    /// decode, a table name is out of sequence, or bytes remain at the end.
    pub fn load(bytes: &[u8], expected: &[&str]) -> Result<Snapshot> {
        // Bound allocations by the input size so a corrupt length prefix
        // cannot request more memory than the stream could hold
        let limit = bytes.len() as u64;
        let mut reader = bytes;

        let service_mode: u8 = bincode::options()
            .with_limit(limit)
            .deserialize_from(&mut reader)
            .map_err(corrupt)?;

        let mut tables = Vec::with_capacity(expected.len());
        for (index, name) in expected.iter().enumerate() {
            let table: NamedTable = bincode::options()
                .with_limit(limit)
                .deserialize_from(&mut reader)
                .map_err(|e| ObdLoggerError::CorruptSnapshot(format!("table {} ({}): {}", index, name, e)))?;

            if table.name != *name {
                return Err(ObdLoggerError::CorruptSnapshot(format!(
                    "expected table '{}' at position {}, found '{}'",
                    name, index, table.name
                )));
            }
            tables.push(table);
        }

        if !reader.is_empty() {
            return Err(ObdLoggerError::CorruptSnapshot(format!(
                "{} unexpected trailing bytes",
                reader.len()
            )));
        }

        Ok(Snapshot { service_mode, tables })
    }

    /// Serialize the full state of `session`
    pub fn capture(session: &Session) -> Result<Vec<u8>> {
        let (service_mode, tables) = session.tables();
        Self::save(&tables, service_mode)
    }

    /// Decode `bytes` and apply it to `session`
    ///
    /// Nothing is applied unless the whole snapshot decodes. Callers outside
    /// the crate go through `AcquisitionScheduler::restore_snapshot`, which
    /// keeps a load from racing the acquisition cycle.
    pub(crate) fn restore(session: &Session, bytes: &[u8]) -> Result<Snapshot> {
        let snapshot = Self::load(bytes, &TABLE_ORDER)?;
        session.replace(snapshot.service_mode, snapshot.tables.clone());
        Ok(snapshot)
    }

    /// Write a snapshot of `session` to `dir`, named after `taken_at`
    pub fn save_to_file(session: &Session, dir: impl AsRef<Path>, taken_at: NaiveDateTime) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.{}", file_stamp(taken_at), SNAPSHOT_EXTENSION));
        let bytes = Self::capture(session)?;
        fs::write(&path, &bytes)?;

        info!("Saved snapshot ({} bytes) to {}", bytes.len(), path.display());
        Ok(path)
    }
}

fn corrupt(e: bincode::Error) -> ObdLoggerError {
    ObdLoggerError::CorruptSnapshot(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obd::protocol::{Measurement, ParameterId, Reading};
    use crate::telemetry::table::{MeasurementTable, LIVE_DATA_TABLE};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn populated_session() -> Session {
        let session = Session::new();
        session.record(Measurement::new(ParameterId::VehicleSpeed, "410D1A", Reading::Value(26.0)));
        session.record(Measurement::new(ParameterId::MassAirFlow, "41100190", Reading::Value(4.0)));
        session.record(Measurement::decode_error(ParameterId::EngineRpm, "410C"));
        session
    }

    #[test]
    fn test_round_trip_populated() {
        let session = populated_session();
        let (mode, tables) = session.tables();

        let bytes = SnapshotStore::save(&tables, mode).unwrap();
        let snapshot = SnapshotStore::load(&bytes, &TABLE_ORDER).unwrap();

        assert_eq!(snapshot.service_mode, mode);
        assert_eq!(snapshot.tables, tables);
    }

    #[test]
    fn test_round_trip_empty_tables() {
        let bytes = SnapshotStore::save(&[], 7).unwrap();
        let snapshot = SnapshotStore::load(&bytes, &[]).unwrap();
        assert_eq!(snapshot.service_mode, 7);
        assert!(snapshot.tables.is_empty());

        let tables = vec![NamedTable::new("only", MeasurementTable::new())];
        let bytes = SnapshotStore::save(&tables, 1).unwrap();
        assert_eq!(SnapshotStore::load(&bytes, &["only"]).unwrap().tables, tables);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let session = populated_session();
        let bytes = SnapshotStore::capture(&session).unwrap();

        for len in 0..bytes.len() {
            let result = SnapshotStore::load(&bytes[..len], &TABLE_ORDER);
            assert!(
                matches!(result, Err(ObdLoggerError::CorruptSnapshot(_))),
                "truncation at {} was accepted",
                len
            );
        }
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut bytes = SnapshotStore::capture(&Session::new()).unwrap();
        bytes.push(0);
        assert!(SnapshotStore::load(&bytes, &TABLE_ORDER).is_err());
    }

    #[test]
    fn test_out_of_order_tables_are_corrupt() {
        let tables = vec![
            NamedTable::new("b", MeasurementTable::new()),
            NamedTable::new("a", MeasurementTable::new()),
        ];
        let bytes = SnapshotStore::save(&tables, 1).unwrap();
        assert!(SnapshotStore::load(&bytes, &["a", "b"]).is_err());
    }

    #[test]
    fn test_failed_restore_leaves_session_untouched() {
        let session = populated_session();
        let before = session.tables();

        let result = SnapshotStore::restore(&session, &[1, 2, 3]);
        assert!(result.is_err());
        assert_eq!(session.tables(), before);
    }

    #[test]
    fn test_restore_zero_mode_keeps_current() {
        let source = populated_session();
        let (_, tables) = source.tables();
        let bytes = SnapshotStore::save(&tables, 0).unwrap();

        let target = Session::new();
        target.set_service_mode(0x03);
        SnapshotStore::restore(&target, &bytes).unwrap();

        assert_eq!(target.service_mode(), 0x03);
        assert_eq!(target.live_data(), source.live_data());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let taken_at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();

        let source = populated_session();
        let path = SnapshotStore::save_to_file(&source, dir.path(), taken_at).unwrap();
        assert_eq!(path.file_name().unwrap(), "2024.01.02-03.04.05.obd");

        let target = Session::new();
        let bytes = std::fs::read(&path).unwrap();
        let snapshot = SnapshotStore::restore(&target, &bytes).unwrap();
        assert_eq!(snapshot.tables.len(), TABLE_ORDER.len());
        assert_eq!(target.table(LIVE_DATA_TABLE), source.table(LIVE_DATA_TABLE));
    }
}
