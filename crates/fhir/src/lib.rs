//! FHIR R4 wire/boundary support for the HL7 v2 translation core.
//!
//! This crate provides **wire models** and **JSON helpers** for the small FHIR R4 subset the
//! translator maps:
//! - Patient, Encounter and Observation resources (plus the datatypes they use)
//! - collection Bundles, with bundle-local ids and cross-resource references
//! - dotted element paths (`name[0].family`) for reading and writing resource JSON
//! - a validator seam with a built-in structural validator
//!
//! Resources are carried as JSON objects ([`Resource`]) so mapping rules can address any
//! element. The typed models ([`Patient`], [`Encounter`], [`Observation`]) are used where a
//! strict shape is needed, for example by [`StructuralValidator`].
//!
//! This crate knows nothing about HL7 v2.

pub mod bundle;
pub mod datatypes;
pub mod element_path;
pub mod encounter;
pub mod observation;
pub mod patient;
pub mod resource;
pub mod validation;

pub use bundle::{assemble, extract_by_type, Bundle, BundleEntry};
pub use element_path::ElementPath;
pub use encounter::Encounter;
pub use observation::Observation;
pub use patient::Patient;
pub use resource::{FhirResource, Resource, ResourceType};
pub use validation::{
    IssueSeverity, ResourceValidator, StructuralValidator, ValidationIssue, ValidationOutcome,
};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid element path: {0}")]
    InvalidPath(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// A JSON value that did not match a wire schema, with the element path that failed.
#[derive(Debug)]
pub(crate) struct SchemaMismatch {
    pub path: String,
    pub source: serde_json::Error,
}

impl SchemaMismatch {
    pub(crate) fn into_error(self, what: &str) -> FhirError {
        FhirError::Translation(format!(
            "{what} schema mismatch at {}: {}",
            self.path, self.source
        ))
    }
}

/// Deserialise `value` into a wire type, keeping the path of the first failing element.
pub(crate) fn decode<T>(value: &serde_json::Value) -> Result<T, SchemaMismatch>
where
    T: serde::de::DeserializeOwned,
{
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        SchemaMismatch {
            path,
            source: err.into_inner(),
        }
    })
}
