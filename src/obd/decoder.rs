//! # OBD-II Response Decoder
//!
//! Extracts typed measurements from service 01 response telegrams.
//!
//! Decoding never fails past this boundary: a response that is too short
//! or not valid hex yields a [`Measurement`] carrying
//! [`Reading::DecodeError`].

use super::protocol::*;

/// Normalize a raw response: drop whitespace and uppercase hex digits
///
/// Adapters commonly answer `"41 0D 1A"`; the offsets below apply to
/// `"410D1A"`.
pub fn normalize_response(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Decode a response telegram for `parameter`
///
/// # Arguments
///
/// * `parameter` - Parameter the response answers
/// * `response` - Response text (whitespace tolerated)
/// * `rpm_standard_scaling` - Divide the RPM field by 4 (standard OBD-II scaling)
///
/// # Decoding rules
///
/// | Parameter | Min length | Field | Value |
/// |-----------|------------|-------|-------|
/// | Vehicle speed | 6 | byte 2 | A (km/h) |
/// | Engine RPM | 6 | bytes 2-3 | A×256+B, raw unless scaled |
/// | Mass air flow | 8 | bytes 2-3 | (A×256+B)/100 (g/s) |
/// | Engine load | 6 | byte 2 | A×100/255 (%) |
///
/// The RPM field is four hex digits, so a 6 or 7 character RPM response
/// passes the length check but still decodes to the error sentinel.
pub fn decode_response(parameter: ParameterId, response: &str, rpm_standard_scaling: bool) -> Measurement {
    let text = normalize_response(response);

    if text.len() < parameter.min_response_len() {
        return Measurement::decode_error(parameter, text);
    }

    let value = match parameter {
        ParameterId::VehicleSpeed => hex_field(&text, RESPONSE_DATA_OFFSET, 2).map(|a| a as f64),
        ParameterId::EngineRpm => hex_field(&text, RESPONSE_DATA_OFFSET, 4).map(|raw| {
            if rpm_standard_scaling {
                raw as f64 / 4.0
            } else {
                raw as f64
            }
        }),
        ParameterId::MassAirFlow => {
            let a = hex_field(&text, RESPONSE_DATA_OFFSET, 2);
            let b = hex_field(&text, RESPONSE_DATA_OFFSET + 2, 2);
            a.zip(b).map(|(a, b)| (a as f64 * 256.0 + b as f64) / 100.0)
        }
        ParameterId::EngineLoad => hex_field(&text, RESPONSE_DATA_OFFSET, 2).map(|a| a as f64 * 100.0 / 255.0),
    };

    match value {
        Some(v) => Measurement::new(parameter, text, Reading::Value(v)),
        None => Measurement::decode_error(parameter, text),
    }
}

/// Parse `len` hex digits starting at character `offset`
fn hex_field(text: &str, offset: usize, len: usize) -> Option<u32> {
    let field = text.get(offset..offset + len)?;
    if !field.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}
