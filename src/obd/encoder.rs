//! # OBD-II Request Encoder
//!
//! Builds service 01 request telegrams.

use super::protocol::*;
use crate::error::{ObdLoggerError, Result};

/// Widest parameter field supported (a full `u32`)
pub const MAX_PARAM_DIGITS: usize = 8;

/// Encode a service 01 request telegram
///
/// # Arguments
///
/// * `parameter` - Parameter to request
/// * `extra` - Optional extra parameter value appended after the PID
/// * `param_digits` - Width of the extra parameter field in hex digits (0 = none)
///
/// # Returns
///
/// * `Result<String>` - Telegram such as `"010D"` or `"010D0001"`
///
/// # Errors
///
/// Returns `ParameterOverflow` if `extra` does not fit in `param_digits`
/// hex digits. When `param_digits > 0` and no extra value is given, the
/// field is sent as zeros.
///
/// # Examples
///
/// ```
/// use obd_logger::obd::encoder::encode_request;
/// use obd_logger::obd::protocol::ParameterId;
///
/// let telegram = encode_request(ParameterId::VehicleSpeed, None, 0)?;
/// assert_eq!(telegram, "010D");
/// # Ok::<(), obd_logger::error::ObdLoggerError>(())
/// ```
pub fn encode_request(parameter: ParameterId, extra: Option<u32>, param_digits: usize) -> Result<String> {
    let value = extra.unwrap_or(0);
    if !fits_in_digits(value, param_digits) {
        return Err(ObdLoggerError::ParameterOverflow {
            value,
            digits: param_digits,
        });
    }

    let mut telegram = format!("{:02X}{:02X}", SERVICE_CURRENT_DATA, parameter.code());
    if param_digits > 0 {
        telegram.push_str(&format!("{:0width$X}", value, width = param_digits));
    }

    Ok(telegram)
}

/// Parse a request telegram back into its parameter and extra field
///
/// Inverse of [`encode_request`] for the same `param_digits`.
///
/// # Errors
///
/// Returns `UnsupportedParameter` if the telegram is not a well-formed
/// service 01 request for a known PID.
pub fn parse_request(telegram: &str, param_digits: usize) -> Result<(ParameterId, Option<u32>)> {
    let malformed = || ObdLoggerError::UnsupportedParameter(format!("malformed request '{}'", telegram));

    if !telegram.is_ascii() || telegram.len() != 4 + param_digits {
        return Err(malformed());
    }

    let service = u8::from_str_radix(&telegram[0..2], 16).map_err(|_| malformed())?;
    if service != SERVICE_CURRENT_DATA {
        return Err(malformed());
    }

    let code = u8::from_str_radix(&telegram[2..4], 16).map_err(|_| malformed())?;
    let parameter = ParameterId::from_code(code)?;

    if param_digits == 0 {
        return Ok((parameter, None));
    }

    let value = u32::from_str_radix(&telegram[4..], 16).map_err(|_| malformed())?;
    Ok((parameter, Some(value)))
}

/// Whether `value` can be written in `digits` hex digits
fn fits_in_digits(value: u32, digits: usize) -> bool {
    if digits >= MAX_PARAM_DIGITS {
        return true;
    }
    (value as u64) < 16u64.pow(digits as u32)
}
