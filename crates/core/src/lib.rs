//! # v2fhir core
//!
//! Table-driven translation between HL7 v2 messages and FHIR R4 resources.
//!
//! This crate joins the two boundary crates:
//! - `hl7v2` parses, addresses and builds pipe-delimited messages
//! - `fhir` carries resources as JSON and assembles Bundles
//!
//! and adds everything in between: the declarative rule tables ([`MappingConfig`]), the value
//! transforms ([`Transform`]), the rule interpreter ([`engine`]) and the orchestrator
//! ([`Converter`]) that dispatches on message type and collects warnings.
//!
//! **No process concerns**: environment variables, logging setup and I/O belong in the
//! `v2fhir` binary. Configuration is resolved there and passed in.

pub mod config;
pub mod converter;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod rules;
pub mod transform;
pub mod validation;

pub use config::{ConfigOverrides, ConverterConfig};
pub use converter::{convert_to_fhir, convert_to_hl7, Converter, FhirConversion, Hl7Conversion};
pub use dispatch::{InboundMessageType, OutboundMessageType};
pub use engine::{apply_forward, apply_reverse, FieldAssignment, Mapped};
pub use error::{ConversionError, ConversionResult, MappingWarning, Stage, WarningKind};
pub use rules::{
    Condition, ForwardRule, ForwardRuleSet, MappingConfig, MappingRule, ReverseRule,
    ReverseRuleSet, RuleSet, SegmentMapping,
};
pub use transform::{FieldValue, Transform, TransformError};
