//! Payload to numeric value conversion.

use thiserror::Error;

/// Symbolic payloads and the values they stand for. Matched exactly, before any
/// numeric parsing.
const SYMBOLIC_VALUES: &[(&str, f64)] = &[("on", 1.0), ("off", 0.0)];

/// Why a payload could not be turned into a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("\"{0}\" is not a number")]
    NotANumber(String),

    #[error("\"{0}\" is not a finite number")]
    NotFinite(String),
}

/// Convert a textual payload to a metric value.
///
/// `"on"` and `"off"` map to `1.0` and `0.0`; anything else must parse as a
/// decimal floating-point number (sign, fraction and exponent allowed). No
/// trimming, case folding, clamping or locale handling is applied.
pub fn convert(raw: &str) -> Result<f64, ConversionError> {
    if let Some((_, value)) = SYMBOLIC_VALUES.iter().find(|(symbol, _)| *symbol == raw) {
        return Ok(*value);
    }

    let value: f64 = raw
        .parse()
        .map_err(|_| ConversionError::NotANumber(raw.to_string()))?;

    if !value.is_finite() {
        return Err(ConversionError::NotFinite(raw.to_string()));
    }

    Ok(value)
}

/// Convert a raw message payload.
pub fn convert_payload(payload: &[u8]) -> Result<f64, ConversionError> {
    let raw = std::str::from_utf8(payload).map_err(|_| ConversionError::InvalidUtf8)?;
    convert(raw)
}
