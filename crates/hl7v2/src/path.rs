//! Terser-style field paths.
//!
//! A [`FieldPath`] addresses one node of the message tree:
//!
//! ```text
//! SEG[(occurrence)]-field[(repetition)][-component[-subcomponent]]
//! ```
//!
//! Occurrence and repetition are 0-based, field, component and sub-component are 1-based,
//! following the usual HL7 Terser conventions. `PID-3`, `OBX(2)-5` and `PID-3(1)-4-1` are
//! all valid. The same type is used for reading (accessor) and writing (builder).

use crate::{Hl7Error, Hl7Result};
use std::fmt;
use std::str::FromStr;

/// Address of a node in an HL7 v2 message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub segment: String,
    pub occurrence: usize,
    pub field: usize,
    pub repetition: Option<usize>,
    pub component: Option<usize>,
    pub subcomponent: Option<usize>,
}

impl FieldPath {
    /// Path to a whole field of the first occurrence of `segment`.
    pub fn new(segment: impl Into<String>, field: usize) -> Self {
        Self {
            segment: segment.into(),
            occurrence: 0,
            field,
            repetition: None,
            component: None,
            subcomponent: None,
        }
    }

    pub fn with_occurrence(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn with_repetition(mut self, repetition: usize) -> Self {
        self.repetition = Some(repetition);
        self
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = Some(component);
        self
    }

    pub fn with_subcomponent(mut self, subcomponent: usize) -> Self {
        self.subcomponent = Some(subcomponent);
        self
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment)?;
        if self.occurrence > 0 {
            write!(f, "({})", self.occurrence)?;
        }
        write!(f, "-{}", self.field)?;
        if let Some(rep) = self.repetition {
            write!(f, "({rep})")?;
        }
        if let Some(component) = self.component {
            write!(f, "-{component}")?;
        }
        if let Some(sub) = self.subcomponent {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = Hl7Error;

    fn from_str(s: &str) -> Hl7Result<Self> {
        let invalid = |reason: &str| Hl7Error::InvalidPath(format!("'{s}': {reason}"));

        let mut parts = s.trim().split('-');

        let (segment, occurrence) = split_index(parts.next().unwrap_or_default())
            .ok_or_else(|| invalid("bad segment occurrence"))?;
        let valid_segment = segment.len() == 3
            && segment
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !valid_segment {
            return Err(invalid("segment must be a 3-character code"));
        }

        let (field, repetition) = parts
            .next()
            .and_then(split_index)
            .ok_or_else(|| invalid("missing or bad field"))?;
        let field = field
            .parse::<usize>()
            .map_err(|_| invalid("field must be a number"))?;

        let component = parts
            .next()
            .map(|c| one_based(c).ok_or_else(|| invalid("component must be >= 1")))
            .transpose()?;
        let subcomponent = parts
            .next()
            .map(|c| one_based(c).ok_or_else(|| invalid("sub-component must be >= 1")))
            .transpose()?;

        if parts.next().is_some() {
            return Err(invalid("too many path parts"));
        }

        Ok(Self {
            segment: segment.to_string(),
            occurrence: occurrence.unwrap_or(0),
            field,
            repetition,
            component,
            subcomponent,
        })
    }
}

/// Split `NAME(3)` into `("NAME", Some(3))`; `NAME` into `("NAME", None)`.
fn split_index(part: &str) -> Option<(&str, Option<usize>)> {
    match part.split_once('(') {
        None => Some((part, None)),
        Some((name, rest)) => {
            let index = rest.strip_suffix(')')?.parse::<usize>().ok()?;
            Some((name, Some(index)))
        }
    }
}

fn one_based(part: &str) -> Option<usize> {
    part.parse::<usize>().ok().filter(|n| *n >= 1)
}

impl serde::Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for FieldPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_path() {
        let path: FieldPath = "PID-7".parse().expect("parse");
        assert_eq!(path, FieldPath::new("PID", 7));
    }

    #[test]
    fn parses_full_path() {
        let path: FieldPath = "OBX(2)-3(1)-4-2".parse().expect("parse");
        assert_eq!(path.segment, "OBX");
        assert_eq!(path.occurrence, 2);
        assert_eq!(path.field, 3);
        assert_eq!(path.repetition, Some(1));
        assert_eq!(path.component, Some(4));
        assert_eq!(path.subcomponent, Some(2));
        assert_eq!(path.to_string(), "OBX(2)-3(1)-4-2");
    }

    #[test]
    fn display_omits_defaults() {
        let path = FieldPath::new("PV1", 3).with_component(1);
        assert_eq!(path.to_string(), "PV1-3-1");
    }

    #[test]
    fn rejects_bad_paths() {
        for bad in ["", "PID", "PI-3", "pid-3", "PID-x", "PID-3-0", "PID-3-1-1-1", "OBX(a)-5"] {
            let err = bad.parse::<FieldPath>().expect_err(bad);
            assert!(matches!(err, Hl7Error::InvalidPath(_)), "{bad}");
        }
    }

    #[test]
    fn deserializes_from_yaml_string() {
        let path: FieldPath = serde_yaml::from_str("\"PID-3(0)-1\"").expect("yaml");
        assert_eq!(
            path,
            FieldPath::new("PID", 3).with_repetition(0).with_component(1)
        );
    }
}
