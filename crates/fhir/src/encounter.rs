//! FHIR R4 Encounter wire model (the PV1 counterpart).

use crate::datatypes::{Coding, Identifier, Period, Reference};
use crate::resource::{FhirResource, ResourceType};
use serde::{Deserialize, Serialize};

/// Encounter status codes (`EncounterStatus`).
pub const STATUS_CODES: [&str; 9] = [
    "planned",
    "arrived",
    "triaged",
    "in-progress",
    "onleave",
    "finished",
    "cancelled",
    "entered-in-error",
    "unknown",
];

/// A location the patient was at during the encounter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterLocation {
    pub location: Reference,
}

/// An interaction between the patient and a provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<Coding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<EncounterLocation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
}

impl FhirResource for Encounter {
    const RESOURCE_TYPE: ResourceType = ResourceType::Encounter;
}
