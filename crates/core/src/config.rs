//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the converter. Library code never reads environment variables; binaries read
//! them and hand the raw values to [`ConfigOverrides::resolve`].

use crate::validation::{validate_header_value, validate_processing_id, validate_version};
use crate::ConversionResult;

/// HL7 v2.5 length of an HD (hierarchic designator) field.
const HD_MAX_LEN: usize = 227;

pub const DEFAULT_APPLICATION: &str = "V2FHIR";
pub const DEFAULT_FACILITY: &str = "V2FHIR";
pub const DEFAULT_PROCESSING_ID: &str = "P";
pub const DEFAULT_HL7_VERSION: &str = "2.5";

/// Outbound message header values, resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConverterConfig {
    sending_application: String,
    sending_facility: String,
    receiving_application: String,
    receiving_facility: String,
    processing_id: String,
    version: String,
}

impl ConverterConfig {
    /// Create a new `ConverterConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::InvalidInput` if any value is empty, too long, contains an
    /// HL7 delimiter, or if the processing id or version is not recognised.
    pub fn new(
        sending_application: String,
        sending_facility: String,
        receiving_application: String,
        receiving_facility: String,
        processing_id: String,
        version: String,
    ) -> ConversionResult<Self> {
        validate_header_value("sending application", &sending_application, HD_MAX_LEN)?;
        validate_header_value("sending facility", &sending_facility, HD_MAX_LEN)?;
        validate_header_value("receiving application", &receiving_application, HD_MAX_LEN)?;
        validate_header_value("receiving facility", &receiving_facility, HD_MAX_LEN)?;
        validate_processing_id(&processing_id)?;
        validate_version(&version)?;

        Ok(Self {
            sending_application,
            sending_facility,
            receiving_application,
            receiving_facility,
            processing_id,
            version,
        })
    }

    pub fn sending_application(&self) -> &str {
        &self.sending_application
    }

    pub fn sending_facility(&self) -> &str {
        &self.sending_facility
    }

    pub fn receiving_application(&self) -> &str {
        &self.receiving_application
    }

    pub fn receiving_facility(&self) -> &str {
        &self.receiving_facility
    }

    pub fn processing_id(&self) -> &str {
        &self.processing_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            sending_application: DEFAULT_APPLICATION.into(),
            sending_facility: DEFAULT_FACILITY.into(),
            receiving_application: DEFAULT_APPLICATION.into(),
            receiving_facility: DEFAULT_FACILITY.into(),
            processing_id: DEFAULT_PROCESSING_ID.into(),
            version: DEFAULT_HL7_VERSION.into(),
        }
    }
}

/// Raw optional values, typically read from the environment by a binary.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub sending_application: Option<String>,
    pub sending_facility: Option<String>,
    pub receiving_application: Option<String>,
    pub receiving_facility: Option<String>,
    pub processing_id: Option<String>,
    pub version: Option<String>,
}

impl ConfigOverrides {
    /// Build a validated config, falling back to defaults for absent or blank values.
    pub fn resolve(self) -> ConversionResult<ConverterConfig> {
        fn pick(value: Option<String>, default: &str) -> String {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        ConverterConfig::new(
            pick(self.sending_application, DEFAULT_APPLICATION),
            pick(self.sending_facility, DEFAULT_FACILITY),
            pick(self.receiving_application, DEFAULT_APPLICATION),
            pick(self.receiving_facility, DEFAULT_FACILITY),
            pick(self.processing_id, DEFAULT_PROCESSING_ID),
            pick(self.version, DEFAULT_HL7_VERSION),
        )
    }
}
