//! FHIR R4 Patient wire model.
//!
//! Responsibilities:
//! - Model the Patient elements mapped to and from PID
//! - Surface the failing element path when JSON does not match the model
//!
//! Notes:
//! - `gender` is kept as the raw code; allowed values are checked by
//!   [`StructuralValidator`](crate::StructuralValidator), not by deserialisation

use crate::datatypes::{Address, HumanName, Identifier};
use crate::resource::{FhirResource, ResourceType};
use serde::{Deserialize, Serialize};

/// Administrative gender codes (`AdministrativeGender`).
pub const GENDER_CODES: [&str; 4] = ["male", "female", "other", "unknown"];

/// Patient demographics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
}

impl FhirResource for Patient {
    const RESOURCE_TYPE: ResourceType = ResourceType::Patient;
}
