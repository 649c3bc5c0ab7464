//! Dotted FHIR element paths.
//!
//! An [`ElementPath`] addresses an element inside resource JSON: `birthDate`, `identifier[0]`,
//! `class.code`, `location[0].location.display`. Each step names an object member and may
//! carry a 0-based array index.
//!
//! Reads step through the first element of an array when an intermediate step has no index,
//! so `name.family` reads `name[0].family`. Writes create missing objects and arrays.

use crate::{FhirError, FhirResult};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Step {
    name: String,
    index: Option<usize>,
}

/// Address of an element in a FHIR resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ElementPath {
    steps: Vec<Step>,
}

impl ElementPath {
    /// Value at this path, if every step exists.
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        let last = self.steps.len() - 1;
        let mut current = root;
        for (i, step) in self.steps.iter().enumerate() {
            current = current.get(step.name.as_str())?;
            current = match (step.index, current) {
                (Some(index), _) => current.get(index)?,
                (None, Value::Array(items)) if i < last => items.first()?,
                (None, _) => current,
            };
        }
        Some(current)
    }

    /// Write `value` at this path.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidPath`] if an existing element along the path has the wrong
    /// JSON shape (for example a string where an object is needed).
    pub fn set(&self, root: &mut Value, value: Value) -> FhirResult<()> {
        *self.slot_mut(root)? = value;
        Ok(())
    }

    /// Append `value` to the array at this path, creating the array when absent.
    ///
    /// # Errors
    ///
    /// Same as [`ElementPath::set`]; also fails when the element exists and is not an array.
    pub fn append(&self, root: &mut Value, value: Value) -> FhirResult<()> {
        let slot = self.slot_mut(root)?;
        match slot {
            Value::Null => *slot = Value::Array(vec![value]),
            Value::Array(items) => items.push(value),
            _ => return Err(self.conflict("is not an array")),
        }
        Ok(())
    }

    /// The last member name, without index.
    pub fn leaf(&self) -> &str {
        self.steps
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }

    fn slot_mut<'v>(&self, root: &'v mut Value) -> FhirResult<&'v mut Value> {
        let last = self.steps.len() - 1;
        let mut current = root;

        for (i, step) in self.steps.iter().enumerate() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else {
                return Err(self.conflict("crosses a value that is not an object"));
            };
            let slot = map.entry(step.name.clone()).or_insert(Value::Null);

            current = match step.index {
                Some(index) => {
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    let Value::Array(items) = slot else {
                        return Err(self.conflict("indexes a value that is not an array"));
                    };
                    if items.len() <= index {
                        items.resize(index + 1, Value::Null);
                    }
                    &mut items[index]
                }
                None if i < last && slot.is_array() => {
                    let Value::Array(items) = slot else {
                        unreachable!("checked is_array");
                    };
                    if items.is_empty() {
                        items.push(Value::Null);
                    }
                    &mut items[0]
                }
                None => slot,
            };
        }

        Ok(current)
    }

    fn conflict(&self, reason: &str) -> FhirError {
        FhirError::InvalidPath(format!("'{self}' {reason}"))
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&step.name)?;
            if let Some(index) = step.index {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ElementPath {
    type Err = FhirError;

    fn from_str(s: &str) -> FhirResult<Self> {
        let invalid = |reason: &str| FhirError::InvalidPath(format!("'{s}': {reason}"));

        let steps = s
            .trim()
            .split('.')
            .map(|part| {
                let (name, index) = match part.split_once('[') {
                    None => (part, None),
                    Some((name, rest)) => {
                        let index = rest
                            .strip_suffix(']')
                            .and_then(|i| i.parse::<usize>().ok())
                            .ok_or_else(|| invalid("bad array index"))?;
                        (name, Some(index))
                    }
                };
                let valid = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(invalid("element names must be alphanumeric"));
                }
                Ok(Step {
                    name: name.to_string(),
                    index,
                })
            })
            .collect::<FhirResult<Vec<_>>>()?;

        Ok(Self { steps })
    }
}

impl serde::Serialize for ElementPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ElementPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
