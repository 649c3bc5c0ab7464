use serde::Serialize;
use std::fmt;

/// Conversion step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Map,
    Extract,
    Build,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::Map => "map",
            Stage::Extract => "extract",
            Stage::Build => "build",
        })
    }
}

/// Fatal conversion errors. No partial result is returned alongside them.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("{stage} step failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid mapping rules: {0}")]
    Rules(String),

    #[error("failed to read mapping rules: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub(crate) fn at(
        stage: Stage,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ConversionError::StageFailed {
            stage,
            source: source.into(),
        }
    }

    /// The step that failed, for stage failures.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ConversionError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

// ============================================================================
// Warnings
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A required source element was absent.
    MissingRequired,
    /// A source value could not be transformed; the target was left unset.
    InvalidValue,
    /// An issue reported by the resource validator.
    Validation,
    /// The input had an unexpected shape (duplicate or missing segments/resources).
    Structure,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarningKind::MissingRequired => "missing required value",
            WarningKind::InvalidValue => "invalid value",
            WarningKind::Validation => "validation",
            WarningKind::Structure => "structure",
        })
    }
}

/// Non-fatal problem found while converting one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MappingWarning {
    pub kind: WarningKind,
    pub location: String,
    pub message: String,
}

impl MappingWarning {
    pub fn new(kind: WarningKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        let warning = Self {
            kind,
            location: location.into(),
            message: message.into(),
        };
        tracing::warn!(kind = %warning.kind, location = %warning.location, "{}", warning.message);
        warning
    }
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.location, self.message)
    }
}
