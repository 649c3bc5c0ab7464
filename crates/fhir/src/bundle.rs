//! Collection bundles.
//!
//! Responsibilities:
//! - Assemble mapped resources into a `collection` Bundle with bundle-local ids
//! - Link Encounter and Observation references to the Patient and Encounter
//! - Extract resources of one type from a Bundle or a single resource
//!
//! Notes:
//! - Ids are `{type}-{n}` where `n` comes from one counter per bundle, so the ids of a
//!   Patient, an Encounter and two Observations are `patient-1`, `encounter-2`,
//!   `observation-3` and `observation-4`.
//! - Linking happens only after every resource has its id.

use crate::datatypes::Identifier;
use crate::resource::{Resource, ResourceType};
use crate::{decode, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const COLLECTION: &str = "collection";

// ============================================================================
// Public types
// ============================================================================

/// A Bundle and its entries.
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    pub id: Option<String>,
    pub bundle_type: String,
    pub timestamp: Option<String>,
    pub identifier: Option<Identifier>,
    pub entries: Vec<BundleEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BundleEntry {
    pub full_url: Option<String>,
    pub resource: Resource,
}

impl Bundle {
    /// Empty collection bundle with a random id.
    pub fn collection() -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            bundle_type: COLLECTION.into(),
            timestamp: None,
            identifier: None,
            entries: Vec::new(),
        }
    }

    /// Read a bundle from an untyped resource.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`](crate::FhirError) if the resource is not a Bundle or an entry does
    /// not hold a resource object.
    pub fn from_resource(resource: &Resource) -> FhirResult<Self> {
        if resource.resource_type() != Some(ResourceType::Bundle) {
            return Err(crate::FhirError::InvalidInput(format!(
                "Expected resourceType 'Bundle', got '{}'",
                resource.resource_type_name()
            )));
        }

        let wire: BundleWire = decode(resource.as_value()).map_err(|m| m.into_error("Bundle"))?;
        Ok(Self {
            id: wire.id,
            bundle_type: wire.bundle_type,
            timestamp: wire.timestamp,
            identifier: wire.identifier,
            entries: wire
                .entry
                .into_iter()
                .map(|e| BundleEntry {
                    full_url: e.full_url,
                    resource: e.resource,
                })
                .collect(),
        })
    }

    /// Render as an untyped resource.
    pub fn to_resource(&self) -> FhirResult<Resource> {
        let wire = BundleWire {
            resource_type: ResourceType::Bundle,
            id: self.id.clone(),
            bundle_type: self.bundle_type.clone(),
            timestamp: self.timestamp.clone(),
            identifier: self.identifier.clone(),
            entry: self
                .entries
                .iter()
                .map(|e| EntryWire {
                    full_url: e.full_url.clone(),
                    resource: e.resource.clone(),
                })
                .collect(),
        };
        Resource::from_value(serde_json::to_value(wire)?)
    }

    /// Render as JSON text.
    pub fn to_json(&self, pretty: bool) -> FhirResult<String> {
        self.to_resource()?.to_json(pretty)
    }

    /// Entry resources, in order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter().map(|e| &e.resource)
    }

    /// Number of entries of the given type.
    pub fn count(&self, resource_type: ResourceType) -> usize {
        self.resources()
            .filter(|r| r.resource_type() == Some(resource_type))
            .count()
    }
}

// ============================================================================
// Assembly and extraction
// ============================================================================

/// Wrap mapped resources into a collection bundle and link their references.
///
/// Entry order is Patient, Encounter, then Observations. Any `id` already on a resource is
/// replaced by its bundle-local id.
pub fn assemble(
    patient: Option<Resource>,
    encounter: Option<Resource>,
    observations: Vec<Resource>,
) -> Bundle {
    let mut counter = 0usize;
    let mut assign_id = |mut resource: Resource| {
        counter += 1;
        let id = format!("{}-{counter}", resource.resource_type_name().to_lowercase());
        resource.set_id(id);
        resource
    };

    // Pass 1: every resource gets its id.
    let patient = patient.map(&mut assign_id);
    let mut encounter = encounter.map(&mut assign_id);
    let mut observations: Vec<Resource> = observations.into_iter().map(&mut assign_id).collect();

    // Pass 2: references.
    let subject = patient.as_ref().and_then(Resource::reference);
    let encounter_ref = encounter.as_ref().and_then(Resource::reference);

    if let (Some(encounter), Some(subject)) = (encounter.as_mut(), subject.as_ref()) {
        encounter.insert("subject", reference(subject));
    }
    for observation in &mut observations {
        if let Some(subject) = subject.as_ref() {
            observation.insert("subject", reference(subject));
        }
        if let Some(encounter_ref) = encounter_ref.as_ref() {
            observation.insert("encounter", reference(encounter_ref));
        }
    }

    let mut bundle = Bundle::collection();
    bundle.entries = patient
        .into_iter()
        .chain(encounter)
        .chain(observations)
        .map(|resource| BundleEntry {
            full_url: resource.reference(),
            resource,
        })
        .collect();

    tracing::debug!(entries = bundle.entries.len(), "assembled bundle");
    bundle
}

/// Resources of `resource_type` held by `input`.
///
/// A Bundle yields its matching entries in order; entries of unsupported types are skipped.
/// Any other resource yields itself when its type matches.
///
/// # Errors
///
/// Returns [`FhirError`](crate::FhirError) if `input` is a malformed Bundle.
pub fn extract_by_type(input: &Resource, resource_type: ResourceType) -> FhirResult<Vec<Resource>> {
    if input.resource_type() != Some(ResourceType::Bundle) {
        let matches = input.resource_type() == Some(resource_type);
        return Ok(matches.then(|| input.clone()).into_iter().collect());
    }

    let bundle = Bundle::from_resource(input)?;
    let mut found = Vec::new();
    for resource in bundle.resources() {
        match resource.resource_type() {
            Some(t) if t == resource_type => found.push(resource.clone()),
            Some(_) => {}
            None => tracing::debug!(
                resource_type = resource.resource_type_name(),
                "skipping unsupported bundle entry"
            ),
        }
    }
    Ok(found)
}

fn reference(target: &str) -> Value {
    json!({ "reference": target })
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct BundleWire {
    #[serde(rename = "resourceType")]
    resource_type: ResourceType,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(rename = "type")]
    bundle_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<Identifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entry: Vec<EntryWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryWire {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    full_url: Option<String>,

    resource: Resource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementPath, FhirError};

    fn path(s: &str) -> ElementPath {
        s.parse().expect("valid path")
    }

    fn observation(code: &str) -> Resource {
        let mut r = Resource::new(ResourceType::Observation);
        r.set(&path("code.coding[0].code"), json!(code)).expect("set");
        r
    }

    #[test]
    fn links_observations_to_patient_and_encounter() {
        let bundle = assemble(
            Some(Resource::new(ResourceType::Patient)),
            Some(Resource::new(ResourceType::Encounter)),
            vec![observation("8867-4"), observation("8302-2")],
        );

        let ids: Vec<_> = bundle.resources().filter_map(Resource::id).collect();
        assert_eq!(ids, vec!["patient-1", "encounter-2", "observation-3", "observation-4"]);
        assert_eq!(bundle.bundle_type, "collection");

        let patient_ref = bundle.entries[0].full_url.clone().expect("fullUrl");
        let encounter_ref = bundle.entries[1].full_url.clone().expect("fullUrl");
        assert_eq!(patient_ref, "Patient/patient-1");

        let encounter = &bundle.entries[1].resource;
        assert_eq!(
            encounter.get(&path("subject.reference")),
            Some(&json!(patient_ref))
        );

        for entry in &bundle.entries[2..] {
            assert_eq!(
                entry.resource.get(&path("subject.reference")),
                Some(&json!(patient_ref))
            );
            assert_eq!(
                entry.resource.get(&path("encounter.reference")),
                Some(&json!(encounter_ref))
            );
        }
    }

    #[test]
    fn omits_links_to_missing_resources() {
        let bundle = assemble(None, None, vec![observation("x")]);
        let only = &bundle.entries[0].resource;
        assert_eq!(only.id(), Some("observation-1"));
        assert_eq!(only.get(&path("subject")), None);
        assert_eq!(only.get(&path("encounter")), None);
    }

    #[test]
    fn renders_and_reads_back() {
        let mut bundle = assemble(Some(Resource::new(ResourceType::Patient)), None, vec![]);
        bundle.timestamp = Some("2024-01-01T12:00:00".into());
        let resource = bundle.to_resource().expect("render");
        assert_eq!(resource.get(&path("type")), Some(&json!("collection")));

        let back = Bundle::from_resource(&resource).expect("read");
        assert_eq!(back, bundle);
    }

    #[test]
    fn extracts_from_bundle_or_single_resource() {
        let bundle = assemble(
            Some(Resource::new(ResourceType::Patient)),
            None,
            vec![observation("a"), observation("b")],
        )
        .to_resource()
        .expect("render");

        let observations = extract_by_type(&bundle, ResourceType::Observation).expect("extract");
        assert_eq!(observations.len(), 2);
        assert!(extract_by_type(&bundle, ResourceType::Encounter)
            .expect("extract")
            .is_empty());

        let single = Resource::new(ResourceType::Patient);
        assert_eq!(
            extract_by_type(&single, ResourceType::Patient).expect("single"),
            vec![single.clone()]
        );
        assert!(extract_by_type(&single, ResourceType::Observation)
            .expect("single")
            .is_empty());
    }

    #[test]
    fn skips_unsupported_entries() {
        let bundle = Resource::parse(
            r#"{"resourceType": "Bundle", "type": "collection", "entry": [
                {"resource": {"resourceType": "Medication"}},
                {"resource": {"resourceType": "Patient", "id": "p"}}
            ]}"#,
        )
        .expect("bundle");
        let patients = extract_by_type(&bundle, ResourceType::Patient).expect("extract");
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id(), Some("p"));
    }

    #[test]
    fn malformed_bundle_is_an_error() {
        let bundle = Resource::parse(
            r#"{"resourceType": "Bundle", "type": "collection", "entry": [{"resource": 7}]}"#,
        )
        .expect("resource");
        let err = extract_by_type(&bundle, ResourceType::Patient).expect_err("malformed");
        assert!(matches!(err, FhirError::Translation(_)));
    }
}
