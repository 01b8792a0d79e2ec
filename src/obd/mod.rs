//! # OBD-II Telegram Module
//!
//! Text telegram codec for service 01 (current data).
//!
//! This module handles:
//! - Request encoding (`"01"` + PID + optional zero-padded parameter)
//! - Response decoding into typed measurements with an error sentinel
//! - Per-parameter codec configuration (digit widths, disabled PIDs)

pub mod protocol;
pub mod encoder;
pub mod decoder;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::CodecConfig;
use crate::error::{ObdLoggerError, Result};
use protocol::{Measurement, ParameterId};

/// Configured request/response codec
#[derive(Debug, Clone, Default)]
pub struct TelegramCodec {
    param_digits: HashMap<ParameterId, usize>,
    disabled: HashSet<ParameterId>,
    rpm_standard_scaling: bool,
}

impl TelegramCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a codec from the `[codec]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedParameter` if a configured name is unknown.
    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        let mut codec = Self::new().with_rpm_standard_scaling(config.rpm_standard_scaling);
        for (name, &digits) in &config.param_digits {
            codec = codec.with_param_digits(name.parse()?, digits);
        }
        for name in &config.disabled {
            codec = codec.with_disabled(name.parse()?);
        }
        Ok(codec)
    }

    pub fn with_param_digits(mut self, parameter: ParameterId, digits: usize) -> Self {
        self.param_digits.insert(parameter, digits);
        self
    }

    pub fn with_disabled(mut self, parameter: ParameterId) -> Self {
        self.disabled.insert(parameter);
        self
    }

    pub fn with_rpm_standard_scaling(mut self, enabled: bool) -> Self {
        self.rpm_standard_scaling = enabled;
        self
    }

    /// Hex digit width of the extra parameter field for `parameter`
    pub fn param_digits(&self, parameter: ParameterId) -> usize {
        self.param_digits.get(&parameter).copied().unwrap_or(0)
    }

    pub fn is_enabled(&self, parameter: ParameterId) -> bool {
        !self.disabled.contains(&parameter)
    }

    /// Build the request telegram for `parameter`
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedParameter` if the parameter is disabled, or
    /// `ParameterOverflow` if `extra` does not fit the configured width.
    pub fn encode_request(&self, parameter: ParameterId, extra: Option<u32>) -> Result<String> {
        if !self.is_enabled(parameter) {
            return Err(ObdLoggerError::UnsupportedParameter(format!("{} is disabled", parameter)));
        }
        let telegram = encoder::encode_request(parameter, extra, self.param_digits(parameter))?;
        debug!("Encoded {} request: {}", parameter, telegram);
        Ok(telegram)
    }

    /// Decode the response to a `parameter` request
    pub fn decode_response(&self, parameter: ParameterId, response: &str) -> Measurement {
        decoder::decode_response(parameter, response, self.rpm_standard_scaling)
    }
}
