//! Input validation utilities.
//!
//! Values written into the outbound MSH header come from process configuration. They are
//! checked once, when [`ConverterConfig`](crate::ConverterConfig) is constructed, so that a bad
//! environment fails at startup rather than on the first message.

use crate::{ConversionError, ConversionResult};
use hl7v2::Delimiters;

/// Validates a value destined for an MSH header field.
///
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to the field's HL7 length
/// - Restricts to printable ASCII without HL7 delimiter characters
///
/// # Errors
///
/// Returns `ConversionError::InvalidInput` naming `field` if the value is invalid.
pub fn validate_header_value(field: &str, value: &str, max_len: usize) -> ConversionResult<()> {
    if value.trim().is_empty() {
        return Err(ConversionError::InvalidInput(format!(
            "{field} cannot be empty"
        )));
    }

    if value.len() > max_len {
        return Err(ConversionError::InvalidInput(format!(
            "{field} exceeds maximum length of {max_len} characters"
        )));
    }

    if !value.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(ConversionError::InvalidInput(format!(
            "{field} must contain only printable ASCII characters"
        )));
    }

    let delimiters = Delimiters::default();
    if value.chars().any(|c| delimiters.is_delimiter(c)) {
        return Err(ConversionError::InvalidInput(format!(
            "{field} must not contain HL7 delimiter characters"
        )));
    }

    Ok(())
}

/// Validates MSH-11: `P` (production), `D` (debugging) or `T` (training).
pub fn validate_processing_id(value: &str) -> ConversionResult<()> {
    match value {
        "P" | "D" | "T" => Ok(()),
        other => Err(ConversionError::InvalidInput(format!(
            "processing id must be P, D or T, got '{other}'"
        ))),
    }
}

/// Validates MSH-12 as a dotted `2.x` version number.
pub fn validate_version(value: &str) -> ConversionResult<()> {
    let ok = value.starts_with("2.")
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));

    if !ok {
        return Err(ConversionError::InvalidInput(format!(
            "HL7 version must look like 2.x, got '{value}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_values() {
        validate_header_value("sending application", "HIS", 227).expect("valid");
        validate_header_value("sending facility", "St Elsewhere", 227).expect("valid");
    }

    #[test]
    fn rejects_bad_header_values() {
        for bad in ["", "   ", "A|B", "A^B", "caf\u{e9}", "line\rbreak"] {
            let err = validate_header_value("field", bad, 20).expect_err(bad);
            assert!(matches!(err, ConversionError::InvalidInput(_)), "{bad}");
        }
        assert!(validate_header_value("field", "ABCDEF", 5).is_err());
    }

    #[test]
    fn checks_processing_id_and_version() {
        validate_processing_id("P").expect("P");
        assert!(validate_processing_id("X").is_err());
        validate_version("2.5").expect("2.5");
        validate_version("2.5.1").expect("2.5.1");
        for bad in ["3.0", "2.", "2.x", ""] {
            assert!(validate_version(bad).is_err(), "{bad}");
        }
    }
}
