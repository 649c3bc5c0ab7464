//! Message-type dispatch.
//!
//! Inbound messages are classified from MSH-9 before the body is parsed, so an unsupported
//! type is rejected without paying for (or failing on) a full parse. Outbound messages are
//! chosen by the caller.

use crate::error::Stage;
use crate::{ConversionError, ConversionResult};
use hl7v2::parser::read_header;
use hl7v2::Delimiters;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Inbound message types the forward direction accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "trigger")]
pub enum InboundMessageType {
    /// ADT^A01, admit/visit notification.
    AdtA01,
    /// ORM, order message, any trigger.
    Orm(String),
    /// ORU, observation result, any trigger.
    Oru(String),
}

impl InboundMessageType {
    /// Classify a raw message from its MSH header.
    ///
    /// # Errors
    ///
    /// Returns a parse-stage failure if the header is missing or malformed, and
    /// `ConversionError::UnsupportedMessageType` if MSH-9 names a type this crate does not map.
    pub fn sniff(raw: &str) -> ConversionResult<(Self, Delimiters)> {
        let (delimiters, header) =
            read_header(raw).map_err(|e| ConversionError::at(Stage::Parse, e))?;

        let msh9 = header.split(delimiters.field).nth(8).unwrap_or_default();
        let mut parts = msh9.split(delimiters.component).map(str::trim);
        let code = parts.next().unwrap_or_default();
        let trigger = parts.next().unwrap_or_default();

        let message_type = match (code, trigger) {
            ("ADT", "A01") => InboundMessageType::AdtA01,
            ("ORM", trigger) => InboundMessageType::Orm(trigger.to_string()),
            ("ORU", trigger) => InboundMessageType::Oru(trigger.to_string()),
            ("", _) => {
                return Err(ConversionError::UnsupportedMessageType(
                    "MSH-9 is empty".into(),
                ))
            }
            _ => {
                return Err(ConversionError::UnsupportedMessageType(
                    msh9.replace(delimiters.component, "^"),
                ))
            }
        };

        tracing::debug!(message_type = %message_type, "classified inbound message");
        Ok((message_type, delimiters))
    }
}

impl fmt::Display for InboundMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundMessageType::AdtA01 => f.write_str("ADT^A01"),
            InboundMessageType::Orm(trigger) => write!(f, "ORM^{trigger}"),
            InboundMessageType::Oru(trigger) => write!(f, "ORU^{trigger}"),
        }
    }
}

/// Outbound message types the reverse direction can build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OutboundMessageType {
    AdtA01,
    OruR01,
}

impl OutboundMessageType {
    /// MSH-9 in encoded form, with message structure.
    pub fn message_type_field(self) -> &'static str {
        match self {
            OutboundMessageType::AdtA01 => "ADT^A01^ADT_A01",
            OutboundMessageType::OruR01 => "ORU^R01^ORU_R01",
        }
    }

    pub fn trigger(self) -> &'static str {
        match self {
            OutboundMessageType::AdtA01 => "A01",
            OutboundMessageType::OruR01 => "R01",
        }
    }

    /// Segment order of the built message.
    pub fn template(self) -> &'static [&'static str] {
        match self {
            OutboundMessageType::AdtA01 => &["MSH", "EVN", "PID", "PV1", "OBX"],
            OutboundMessageType::OruR01 => &["MSH", "PID", "PV1", "OBX"],
        }
    }

    /// Whether the message is invalid without a patient.
    pub fn requires_patient(self) -> bool {
        matches!(self, OutboundMessageType::AdtA01)
    }
}

impl fmt::Display for OutboundMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutboundMessageType::AdtA01 => "ADT^A01",
            OutboundMessageType::OruR01 => "ORU^R01",
        })
    }
}

impl FromStr for OutboundMessageType {
    type Err = ConversionError;

    /// Accepts `ADT^A01`, `ADT_A01` and `adt-a01` spellings, case-insensitively.
    fn from_str(s: &str) -> ConversionResult<Self> {
        let normalised = s.trim().to_ascii_uppercase().replace(['^', '-'], "_");
        match normalised.as_str() {
            "ADT_A01" => Ok(OutboundMessageType::AdtA01),
            "ORU_R01" => Ok(OutboundMessageType::OruR01),
            _ => Err(ConversionError::UnsupportedMessageType(s.trim().to_string())),
        }
    }
}
