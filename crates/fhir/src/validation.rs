//! Resource validation seam.
//!
//! The translator calls a [`ResourceValidator`] once per assembled resource. Validation never
//! aborts a conversion: the caller turns every issue into a warning.
//!
//! [`StructuralValidator`] is the built-in implementation. It checks that the resource matches
//! the typed wire model and that the coded elements the translator produces carry allowed
//! codes. Profile and terminology validation belong to an external validator plugged in
//! through the same trait.

use crate::resource::{FhirResource, Resource, ResourceType};
use crate::{decode, Encounter, Observation, Patient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity of a validation issue, as in `OperationOutcome.issue.severity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }
}

/// One problem found in a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(severity: IssueSeverity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.severity.as_str(), self.path, self.message)
    }
}

/// Result of validating one resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// Outcome for `issues`; valid unless an issue is `error` or `fatal`.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal));
        Self { valid, issues }
    }
}

/// Validates resource JSON.
pub trait ResourceValidator: Send + Sync {
    fn validate(&self, resource: &Value) -> ValidationOutcome;
}

/// Shape and code checks for Patient, Encounter and Observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralValidator;

impl ResourceValidator for StructuralValidator {
    fn validate(&self, resource: &Value) -> ValidationOutcome {
        let resource = match Resource::from_value(resource.clone()) {
            Ok(resource) => resource,
            Err(e) => {
                return ValidationOutcome::from_issues(vec![ValidationIssue::new(
                    IssueSeverity::Fatal,
                    "<root>",
                    e.to_string(),
                )])
            }
        };

        let issues = match resource.resource_type() {
            Some(ResourceType::Patient) => check::<Patient>(&resource, patient_codes),
            Some(ResourceType::Encounter) => check::<Encounter>(&resource, encounter_codes),
            Some(ResourceType::Observation) => {
                check::<Observation>(&resource, observation_codes)
            }
            Some(ResourceType::Bundle) => Vec::new(),
            None => vec![ValidationIssue::new(
                IssueSeverity::Error,
                "resourceType",
                format!(
                    "unsupported resourceType '{}'",
                    resource.resource_type_name()
                ),
            )],
        };

        ValidationOutcome::from_issues(issues)
    }
}

fn check<T: FhirResource>(
    resource: &Resource,
    codes: fn(&T, &mut Vec<ValidationIssue>),
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    match decode::<T>(resource.as_value()) {
        Ok(typed) => codes(&typed, &mut issues),
        Err(mismatch) => issues.push(ValidationIssue::new(
            IssueSeverity::Error,
            mismatch.path,
            mismatch.source.to_string(),
        )),
    }
    issues
}

fn patient_codes(patient: &Patient, issues: &mut Vec<ValidationIssue>) {
    if let Some(gender) = patient.gender.as_deref() {
        require_code(issues, "gender", gender, &crate::patient::GENDER_CODES);
    }
    if let Some(date) = patient.birth_date.as_deref() {
        if !is_fhir_date(date) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Error,
                "birthDate",
                format!("'{date}' is not a FHIR date"),
            ));
        }
    }
    if patient.identifier.iter().all(|i| i.value.is_none()) {
        issues.push(ValidationIssue::new(
            IssueSeverity::Warning,
            "identifier",
            "patient has no identifier value",
        ));
    }
}

fn encounter_codes(encounter: &Encounter, issues: &mut Vec<ValidationIssue>) {
    match encounter.status.as_deref() {
        Some(status) => require_code(issues, "status", status, &crate::encounter::STATUS_CODES),
        None => issues.push(missing("status")),
    }
    if encounter.class.is_none() {
        issues.push(missing("class"));
    }
}

fn observation_codes(observation: &Observation, issues: &mut Vec<ValidationIssue>) {
    match observation.status.as_deref() {
        Some(status) => {
            require_code(issues, "status", status, &crate::observation::STATUS_CODES)
        }
        None => issues.push(missing("status")),
    }
    if observation.code.is_none() {
        issues.push(missing("code"));
    }
    if observation.value_quantity.is_some() && observation.value_string.is_some() {
        issues.push(ValidationIssue::new(
            IssueSeverity::Error,
            "value[x]",
            "only one value[x] element is allowed",
        ));
    }
}

fn missing(path: &str) -> ValidationIssue {
    ValidationIssue::new(IssueSeverity::Error, path, "required element is missing")
}

fn require_code(issues: &mut Vec<ValidationIssue>, path: &str, code: &str, allowed: &[&str]) {
    if !allowed.contains(&code) {
        issues.push(ValidationIssue::new(
            IssueSeverity::Error,
            path,
            format!("'{code}' is not an allowed code"),
        ));
    }
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, with a real calendar date when complete.
fn is_fhir_date(value: &str) -> bool {
    match value.len() {
        4 => value.bytes().all(|b| b.is_ascii_digit()),
        7 => chrono::NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").is_ok(),
        10 => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}
