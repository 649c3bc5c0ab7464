//! Untyped FHIR resources.
//!
//! A [`Resource`] is a JSON object that always carries a string `resourceType`. Mapping rules
//! read and write it through [`ElementPath`]s; typed views are available through
//! [`FhirResource`].

use crate::{decode, ElementPath, FhirError, FhirResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Resource types this crate maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Patient,
    Encounter,
    Observation,
    Bundle,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::Bundle => "Bundle",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = FhirError;

    fn from_str(s: &str) -> FhirResult<Self> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Encounter" => Ok(ResourceType::Encounter),
            "Observation" => Ok(ResourceType::Observation),
            "Bundle" => Ok(ResourceType::Bundle),
            other => Err(FhirError::InvalidInput(format!(
                "unsupported resourceType '{other}'"
            ))),
        }
    }
}

impl Serialize for ResourceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A FHIR resource as a JSON object.
///
/// Invariant: the wrapped value is an object with a string `resourceType`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Resource {
    value: Value,
}

impl Resource {
    /// Empty resource of the given type.
    pub fn new(resource_type: ResourceType) -> Self {
        let mut map = Map::new();
        map.insert(
            "resourceType".into(),
            Value::String(resource_type.as_str().into()),
        );
        Self {
            value: Value::Object(map),
        }
    }

    /// Parse resource JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the text is not JSON, or not an object with a string
    /// `resourceType`.
    pub fn parse(json: &str) -> FhirResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Wrap a JSON value, checking the resource invariant.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        let resource_type = value
            .as_object()
            .ok_or_else(|| FhirError::InvalidInput("resource must be a JSON object".into()))?
            .get("resourceType");

        match resource_type {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(Self { value }),
            _ => Err(FhirError::InvalidInput(
                "resource is missing a string resourceType".into(),
            )),
        }
    }

    /// Declared `resourceType`, supported or not.
    pub fn resource_type_name(&self) -> &str {
        self.value
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// `resourceType` when it is one this crate maps.
    pub fn resource_type(&self) -> Option<ResourceType> {
        self.resource_type_name().parse().ok()
    }

    pub fn id(&self) -> Option<&str> {
        self.value.get("id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.insert("id", Value::String(id.into()));
    }

    /// Set a top-level element.
    pub fn insert(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.value {
            map.insert(key.to_string(), value);
        }
    }

    /// Value at `path`, if present.
    pub fn get(&self, path: &ElementPath) -> Option<&Value> {
        path.get(&self.value)
    }

    /// Write `value` at `path`, creating intermediate objects and arrays.
    pub fn set(&mut self, path: &ElementPath, value: Value) -> FhirResult<()> {
        path.set(&mut self.value, value)
    }

    /// Append `value` to the array at `path`, creating it when absent.
    pub fn append(&mut self, path: &ElementPath, value: Value) -> FhirResult<()> {
        path.append(&mut self.value, value)
    }

    /// Reference to this resource, `{Type}/{id}`.
    pub fn reference(&self) -> Option<String> {
        self.id()
            .map(|id| format!("{}/{id}", self.resource_type_name()))
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Render as JSON text.
    pub fn to_json(&self, pretty: bool) -> FhirResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(&self.value)?
        } else {
            serde_json::to_string(&self.value)?
        };
        Ok(json)
    }
}

impl TryFrom<Value> for Resource {
    type Error = FhirError;

    fn try_from(value: Value) -> FhirResult<Self> {
        Self::from_value(value)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.value
    }
}

// ============================================================================
// Typed views
// ============================================================================

/// Typed model of one resource type.
///
/// The JSON object of a [`Resource`] is the wire format; implementors describe the subset of
/// elements they understand and ignore the rest.
pub trait FhirResource: Serialize + DeserializeOwned {
    const RESOURCE_TYPE: ResourceType;

    /// Parse a typed model from an untyped resource.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] when the `resourceType` does not match, or
    /// [`FhirError::Translation`] naming the first element whose shape is wrong.
    fn from_resource(resource: &Resource) -> FhirResult<Self> {
        if resource.resource_type() != Some(Self::RESOURCE_TYPE) {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType '{}', got '{}'",
                Self::RESOURCE_TYPE,
                resource.resource_type_name()
            )));
        }

        decode(resource.as_value()).map_err(|m| m.into_error(Self::RESOURCE_TYPE.as_str()))
    }

    /// Render the typed model as an untyped resource.
    fn to_resource(&self) -> FhirResult<Resource> {
        let mut resource = Resource::new(Self::RESOURCE_TYPE);
        match serde_json::to_value(self)? {
            Value::Object(fields) => {
                for (key, value) in fields {
                    resource.insert(&key, value);
                }
                Ok(resource)
            }
            _ => Err(FhirError::Translation(format!(
                "{} did not serialise to a JSON object",
                Self::RESOURCE_TYPE
            ))),
        }
    }
}
