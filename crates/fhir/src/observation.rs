//! FHIR R4 Observation wire model (the OBX counterpart).
//!
//! Only `valueQuantity` and `valueString` of the `value[x]` choice are modelled; an OBX value
//! is numeric (`NM`) or text.

use crate::datatypes::{CodeableConcept, Quantity, Reference};
use crate::resource::{FhirResource, ResourceType};
use serde::{Deserialize, Serialize};

/// Observation status codes (`ObservationStatus`).
pub const STATUS_CODES: [&str; 8] = [
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A measurement or assertion about the patient.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_range: Vec<ReferenceRange>,
}

impl FhirResource for Observation {
    const RESOURCE_TYPE: ResourceType = ResourceType::Observation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resource;

    #[test]
    fn integral_quantity_stays_integral() {
        let resource = Resource::parse(
            r#"{
                "resourceType": "Observation",
                "status": "final",
                "code": {"coding": [{"code": "8867-4", "display": "Heart rate", "system": "LN"}]},
                "valueQuantity": {"value": 72, "unit": "/min"}
            }"#,
        )
        .expect("resource");

        let observation = Observation::from_resource(&resource).expect("observation");
        let rendered = observation
            .to_resource()
            .and_then(|r| r.to_json(false))
            .expect("render");
        assert!(rendered.contains(r#""valueQuantity":{"value":72,"unit":"/min"}"#));
    }
}
