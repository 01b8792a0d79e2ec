//! # Error Types
//!
//! Custom error types for the OBD logger using `thiserror`.
//!
//! Response decoding failures are not variants here: they travel as
//! [`Reading::DecodeError`](crate::obd::protocol::Reading::DecodeError)
//! inside measurements so one bad parameter never aborts a cycle.

use thiserror::Error;

/// Main error type for the OBD logger
#[derive(Debug, Error)]
pub enum ObdLoggerError {
    /// Parameter unknown or administratively disabled
    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// Extra request parameter does not fit the configured digit width
    #[error("Parameter value 0x{value:X} does not fit in {digits} hex digits")]
    ParameterOverflow { value: u32, digits: usize },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV log errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Snapshot stream truncated or unreadable
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No usable serial device found
    #[error("No OBD adapter found (tried: {0})")]
    SerialPortNotFound(String),

    /// Lifecycle operation not allowed in the current state
    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: &'static str },

    /// Snapshot load attempted while acquisition is running
    #[error("Acquisition is running; pause or stop it first")]
    AcquisitionBusy,
}

/// Result type alias for the OBD logger
pub type Result<T> = std::result::Result<T, ObdLoggerError>;
