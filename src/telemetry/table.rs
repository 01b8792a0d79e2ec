//! # Measurement Tables and Session State
//!
//! The session owns the latest measurement per parameter plus the other
//! named tables persisted in snapshots. It is shared between the
//! acquisition cycle (writer) and snapshot save/load (reader, replacer)
//! through an `Arc<Session>`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::metrics::PrimaryReadings;
use crate::obd::protocol::{Measurement, ParameterId, SERVICE_CURRENT_DATA};

/// Table updated by every acquisition cycle
pub const LIVE_DATA_TABLE: &str = "live_data";
/// Vehicle identification data
pub const VEHICLE_INFO_TABLE: &str = "vehicle_info";
/// Diagnostic trouble codes
pub const TROUBLE_CODES_TABLE: &str = "trouble_codes";
/// Values contributed by extensions
pub const PLUGIN_DATA_TABLE: &str = "plugin_data";

/// Session tables in snapshot order
pub const TABLE_ORDER: [&str; 4] = [
    LIVE_DATA_TABLE,
    VEHICLE_INFO_TABLE,
    TROUBLE_CODES_TABLE,
    PLUGIN_DATA_TABLE,
];

/// Latest measurement per parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTable {
    entries: BTreeMap<ParameterId, Measurement>,
}

impl MeasurementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the measurement for its parameter, returning the superseded one
    pub fn insert(&mut self, measurement: Measurement) -> Option<Measurement> {
        self.entries.insert(measurement.parameter, measurement)
    }

    pub fn get(&self, parameter: ParameterId) -> Option<&Measurement> {
        self.entries.get(&parameter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.values()
    }

    /// Current readings for metric derivation
    pub fn readings(&self) -> PrimaryReadings {
        PrimaryReadings::from_measurements(self.iter())
    }
}

/// A measurement table with its snapshot name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTable {
    pub name: String,
    pub table: MeasurementTable,
}

impl NamedTable {
    pub fn new(name: impl Into<String>, table: MeasurementTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SessionState {
    service_mode: u8,
    tables: Vec<NamedTable>,
}

/// Measurement state of one acquisition session
#[derive(Debug)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Empty tables in [`TABLE_ORDER`], service 01 active
    pub fn new() -> Self {
        let tables = TABLE_ORDER
            .iter()
            .map(|name| NamedTable::new(*name, MeasurementTable::new()))
            .collect();
        Self {
            state: RwLock::new(SessionState {
                service_mode: SERVICE_CURRENT_DATA,
                tables,
            }),
        }
    }

    pub fn service_mode(&self) -> u8 {
        self.read(|s| s.service_mode)
    }

    pub fn set_service_mode(&self, mode: u8) {
        self.write(|s| s.service_mode = mode);
    }

    /// Store a measurement in the live data table
    pub fn record(&self, measurement: Measurement) {
        self.write(|s| {
            if let Some(live) = s.tables.iter_mut().find(|t| t.name == LIVE_DATA_TABLE) {
                live.table.insert(measurement);
            }
        });
    }

    /// Copy of the live data table
    pub fn live_data(&self) -> MeasurementTable {
        self.table(LIVE_DATA_TABLE).unwrap_or_default()
    }

    /// Copy of a named table
    pub fn table(&self, name: &str) -> Option<MeasurementTable> {
        self.read(|s| s.tables.iter().find(|t| t.name == name).map(|t| t.table.clone()))
    }

    /// Consistent copy of the service mode and all tables
    pub fn tables(&self) -> (u8, Vec<NamedTable>) {
        self.read(|s| (s.service_mode, s.tables.clone()))
    }

    /// Replace all tables at once; a service mode of 0 keeps the current mode
    pub fn replace(&self, service_mode: u8, tables: Vec<NamedTable>) {
        self.write(|s| {
            if service_mode != 0 {
                s.service_mode = service_mode;
            }
            s.tables = tables;
        });
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
