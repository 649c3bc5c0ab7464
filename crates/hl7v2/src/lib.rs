//! HL7 v2 wire/boundary support.
//!
//! This crate is responsible for reading and writing pipe-delimited HL7 v2.x messages:
//! - resolving the delimiter table from the MSH header
//! - parsing raw text into a segment / field / repetition / component / sub-component tree
//! - addressing values in that tree with Terser-style paths (`PID-3(1)-4`)
//! - building outbound messages, re-escaping delimiter characters on emission
//!
//! Clinical meaning and FHIR mapping live in `v2fhir-core`. This crate handles the HL7
//! grammar only and knows nothing about FHIR.

pub mod builder;
pub mod delimiters;
pub mod escape;
pub mod message;
pub mod parser;
pub mod path;
pub mod terser;

pub use builder::MessageBuilder;
pub use delimiters::Delimiters;
pub use message::{Component, Field, Message, Repetition, Segment};
pub use path::FieldPath;
pub use terser::Terser;

/// Errors returned by the `hl7v2` boundary crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Hl7Error {
    #[error("empty message")]
    Empty,

    #[error("malformed MSH header at line {line}: {reason}")]
    MalformedHeader { line: usize, reason: String },

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid field path: {0}")]
    InvalidPath(String),
}

impl Hl7Error {
    /// Line number the error refers to, when it came from parsing.
    pub fn line(&self) -> Option<usize> {
        match self {
            Hl7Error::MalformedHeader { line, .. } | Hl7Error::Parse { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Type alias for Results that can fail with an [`Hl7Error`].
pub type Hl7Result<T> = Result<T, Hl7Error>;
