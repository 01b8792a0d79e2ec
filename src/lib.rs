//! # OBD Logger Library
//!
//! Periodic OBD-II telemetry acquisition over an ELM327-style adapter.
//!
//! This library provides request encoding and response decoding for the
//! supported service 01 parameters, derived driving metrics, the
//! pausable acquisition cycle, CSV logging and binary session snapshots.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod metrics;
pub mod obd;
pub mod serial;
pub mod telemetry;
