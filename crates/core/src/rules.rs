//! Declarative mapping tables.
//!
//! Responsibilities:
//! - Define the rule types the engine interprets: [`MappingRule`], [`Condition`], [`RuleSet`]
//! - Load the full table ([`MappingConfig`]) from YAML, built-in or from a file
//! - Reject tables whose rules point at the wrong segment or cannot ever produce a value
//!
//! Notes:
//! - Rule paths never carry a segment occurrence. The engine applies the occurrence being
//!   mapped, so one Observation rule set serves every OBX.
//! - A rule without a `source` is a constant rule: it writes `default` whenever its `when`
//!   guard holds.

use crate::transform::Transform;
use crate::{ConversionError, ConversionResult};
use fhir::{ElementPath, ResourceType};
use hl7v2::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const BUILTIN_RULES: &str = include_str!("rules/default.yaml");

/// One source-to-target mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    deny_unknown_fields,
    bound(deserialize = "S: Deserialize<'de>, T: Deserialize<'de>")
)]
pub struct MappingRule<S, T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<S>,

    pub target: T,

    #[serde(default)]
    pub transform: Transform,

    #[serde(default)]
    pub required: bool,

    /// Written in target form, without the transform, when the source is absent.
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Map every repetition (forward) or array element (reverse).
    #[serde(default)]
    pub repeat: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition<S>>,

    /// Defined HL7 length of the target; only meaningful on reverse rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Source-side guard on a rule.
///
/// Every comparison given must hold. With none of `equals`, `not_equals`, `one_of` and
/// `none_of` the condition is a presence test. An empty comparison string stands for
/// "absent".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "P: Deserialize<'de>"))]
pub struct Condition<P> {
    pub path: P,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub none_of: Vec<String>,
}

impl<P> Condition<P> {
    /// Presence test on `path`.
    pub fn present(path: P) -> Self {
        Self {
            path,
            equals: None,
            not_equals: None,
            one_of: Vec::new(),
            none_of: Vec::new(),
        }
    }

    /// Whether the guard holds for the value found at `path` (`None` when absent).
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let is = |expected: &str| match actual {
            None => expected.is_empty(),
            Some(actual) => actual == expected,
        };

        let unconstrained = self.equals.is_none()
            && self.not_equals.is_none()
            && self.one_of.is_empty()
            && self.none_of.is_empty();
        if unconstrained {
            return actual.is_some();
        }

        self.equals.as_deref().map_or(true, |e| is(e))
            && self.not_equals.as_deref().map_or(true, |n| !is(n))
            && (self.one_of.is_empty() || self.one_of.iter().any(|e| is(e)))
            && !self.none_of.iter().any(|n| is(n))
    }
}

/// Ordered rules for one segment/resource pair in one direction.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleSet<S, T> {
    pub segment: String,
    pub resource: ResourceType,
    pub rules: Vec<MappingRule<S, T>>,
}

pub type ForwardRule = MappingRule<FieldPath, ElementPath>;
pub type ReverseRule = MappingRule<ElementPath, FieldPath>;
pub type ForwardRuleSet = RuleSet<FieldPath, ElementPath>;
pub type ReverseRuleSet = RuleSet<ElementPath, FieldPath>;

/// Both directions for one segment/resource pair.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "SegmentMappingWire")]
pub struct SegmentMapping {
    pub forward: ForwardRuleSet,
    pub reverse: ReverseRuleSet,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SegmentMappingWire {
    segment: String,
    resource: ResourceType,
    #[serde(default)]
    forward: Vec<ForwardRule>,
    #[serde(default)]
    reverse: Vec<ReverseRule>,
}

impl From<SegmentMappingWire> for SegmentMapping {
    fn from(wire: SegmentMappingWire) -> Self {
        Self {
            forward: RuleSet {
                segment: wire.segment.clone(),
                resource: wire.resource,
                rules: wire.forward,
            },
            reverse: RuleSet {
                segment: wire.segment,
                resource: wire.resource,
                rules: wire.reverse,
            },
        }
    }
}

/// The full mapping table: Patient⇄PID, Encounter⇄PV1, Observation⇄OBX.
///
/// Loaded once at startup and passed explicitly to the converter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    pub patient: SegmentMapping,
    pub encounter: SegmentMapping,
    pub observation: SegmentMapping,
}

impl MappingConfig {
    /// The table shipped with the crate.
    pub fn builtin() -> ConversionResult<Self> {
        Self::from_yaml(BUILTIN_RULES)
    }

    /// Parse and validate a YAML rule table.
    ///
    /// This uses `serde_path_to_error` to surface the location of a malformed rule
    /// (e.g. `patient.forward[2].transform`).
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::Rules` if the YAML does not match the table schema or a rule
    /// fails validation.
    pub fn from_yaml(yaml_text: &str) -> ConversionResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

        let config = match serde_path_to_error::deserialize::<_, MappingConfig>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(ConversionError::Rules(format!(
                    "rule table mismatch at {path}: {source}"
                )));
            }
        };

        config.validate()?;
        tracing::debug!(
            patient = config.patient.forward.rules.len() + config.patient.reverse.rules.len(),
            encounter =
                config.encounter.forward.rules.len() + config.encounter.reverse.rules.len(),
            observation =
                config.observation.forward.rules.len() + config.observation.reverse.rules.len(),
            "loaded mapping rules"
        );
        Ok(config)
    }

    /// Read, parse and validate a YAML rule table from disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConversionResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    /// Named segment mappings in table order.
    pub fn mappings(&self) -> [(&'static str, &SegmentMapping); 3] {
        [
            ("patient", &self.patient),
            ("encounter", &self.encounter),
            ("observation", &self.observation),
        ]
    }

    fn validate(&self) -> ConversionResult<()> {
        let expected = [
            ResourceType::Patient,
            ResourceType::Encounter,
            ResourceType::Observation,
        ];
        for ((name, mapping), resource) in self.mappings().into_iter().zip(expected) {
            if mapping.forward.resource != resource {
                return Err(ConversionError::Rules(format!(
                    "{name}: resource must be {resource}, got {}",
                    mapping.forward.resource
                )));
            }
            validate_forward(name, &mapping.forward)?;
            validate_reverse(name, &mapping.reverse)?;
        }
        Ok(())
    }
}

fn validate_forward(name: &str, set: &ForwardRuleSet) -> ConversionResult<()> {
    for (i, rule) in set.rules.iter().enumerate() {
        let location = format!("{name}.forward[{i}]");
        validate_common(&location, rule)?;

        let paths = rule.source.iter().chain(rule.when.as_ref().map(|w| &w.path));
        for path in paths {
            check_segment_path(&location, &set.segment, path)?;
        }
        if rule.length.is_some() {
            return Err(rule_error(&location, "length only applies to reverse rules"));
        }
    }
    Ok(())
}

fn validate_reverse(name: &str, set: &ReverseRuleSet) -> ConversionResult<()> {
    for (i, rule) in set.rules.iter().enumerate() {
        let location = format!("{name}.reverse[{i}]");
        validate_common(&location, rule)?;
        check_segment_path(&location, &set.segment, &rule.target)?;
    }
    Ok(())
}

fn validate_common<S, T>(location: &str, rule: &MappingRule<S, T>) -> ConversionResult<()> {
    if rule.source.is_none() {
        if rule.required {
            return Err(rule_error(location, "a constant rule cannot be required"));
        }
        if rule.default_value.is_none() {
            return Err(rule_error(location, "a rule without a source needs a default"));
        }
        if rule.repeat {
            return Err(rule_error(location, "a rule without a source cannot repeat"));
        }
    }
    Ok(())
}

fn check_segment_path(location: &str, segment: &str, path: &FieldPath) -> ConversionResult<()> {
    if path.segment != segment {
        return Err(rule_error(
            location,
            &format!("path {path} does not address segment {segment}"),
        ));
    }
    if path.occurrence != 0 {
        return Err(rule_error(
            location,
            &format!("path {path} must not name a segment occurrence"),
        ));
    }
    Ok(())
}

fn rule_error(location: &str, reason: &str) -> ConversionError {
    ConversionError::Rules(format!("{location}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
patient:
  segment: PID
  resource: Patient
  forward:
    - source: PID-8
      target: gender
      transform: gender
  reverse:
    - target: PID-1
      default: "1"
encounter:
  segment: PV1
  resource: Encounter
observation:
  segment: OBX
  resource: Observation
"#;

    fn expect_rules_error(yaml: &str) -> String {
        match MappingConfig::from_yaml(yaml).expect_err("invalid table") {
            ConversionError::Rules(msg) => msg,
            other => panic!("expected Rules error, got {other:?}"),
        }
    }

    #[test]
    fn builtin_table_loads() {
        let config = MappingConfig::builtin().expect("builtin rules");
        assert_eq!(config.patient.forward.segment, "PID");
        assert_eq!(config.encounter.reverse.segment, "PV1");
        assert_eq!(config.observation.forward.resource, ResourceType::Observation);
        assert!(config
            .patient
            .forward
            .rules
            .iter()
            .any(|r| r.transform == Transform::HumanName && r.repeat));
    }

    #[test]
    fn minimal_table_loads_with_defaults() {
        let config = MappingConfig::from_yaml(MINIMAL).expect("minimal");
        let rule = &config.patient.forward.rules[0];
        assert_eq!(rule.source, Some("PID-8".parse().expect("path")));
        assert!(!rule.required);
        assert!(!rule.repeat);
        assert!(config.encounter.forward.rules.is_empty());

        let constant = &config.patient.reverse.rules[0];
        assert_eq!(constant.source, None);
        assert_eq!(constant.default_value, Some(Value::String("1".into())));
    }

    #[test]
    fn loads_override_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(MINIMAL.as_bytes()).expect("write rules");

        let config = MappingConfig::from_yaml_file(file.path()).expect("load file");
        assert_eq!(config.patient.forward.rules.len(), 1);

        let missing = MappingConfig::from_yaml_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConversionError::Io(_))));
    }

    #[test]
    fn reports_schema_path() {
        let yaml = MINIMAL.replace("transform: gender", "transform: sparkle");
        let msg = expect_rules_error(&yaml);
        assert!(msg.contains("patient.forward"), "{msg}");
        assert!(msg.contains("transform"), "{msg}");

        let yaml = MINIMAL.replace("target: gender", "target: gender\n      colour: red");
        assert!(expect_rules_error(&yaml).contains("colour"));
    }

    #[test]
    fn rejects_rules_for_other_segments() {
        let yaml = MINIMAL.replace("source: PID-8", "source: PV1-2");
        let msg = expect_rules_error(&yaml);
        assert!(msg.starts_with("patient.forward[0]"), "{msg}");

        let yaml = MINIMAL.replace("source: PID-8", "source: PID(1)-8");
        assert!(expect_rules_error(&yaml).contains("occurrence"));

        let yaml = MINIMAL.replace("target: PID-1", "target: OBX-1");
        assert!(expect_rules_error(&yaml).starts_with("patient.reverse[0]"));
    }

    #[test]
    fn rejects_unusable_rules() {
        let yaml = MINIMAL.replace("      default: \"1\"\n", "");
        assert!(expect_rules_error(&yaml).contains("needs a default"));

        let yaml = MINIMAL.replace("transform: gender", "transform: gender\n      length: 1");
        assert!(expect_rules_error(&yaml).contains("reverse rules"));

        let yaml = MINIMAL.replace("resource: Encounter", "resource: Patient");
        assert!(expect_rules_error(&yaml).starts_with("encounter"));
    }

    #[test]
    fn condition_matching() {
        let equals = Condition {
            equals: Some("NM".to_string()),
            ..Condition::present(())
        };
        assert!(equals.matches(Some("NM")));
        assert!(!equals.matches(Some("ST")));
        assert!(!equals.matches(None));

        let not_equals = Condition {
            not_equals: Some("NM".to_string()),
            ..Condition::present(())
        };
        assert!(not_equals.matches(Some("ST")));
        assert!(not_equals.matches(None));
        assert!(!not_equals.matches(Some("NM")));

        let present = Condition::present(());
        assert!(present.matches(Some("I")));
        assert!(!present.matches(None));

        let absent = Condition {
            equals: Some(String::new()),
            ..Condition::present(())
        };
        assert!(absent.matches(None));
        assert!(!absent.matches(Some("x")));
    }

    #[test]
    fn condition_lists() {
        let text_types = Condition {
            one_of: vec!["ST".into(), "TX".into()],
            ..Condition::present(())
        };
        assert!(text_types.matches(Some("TX")));
        assert!(!text_types.matches(Some("CE")));
        assert!(!text_types.matches(None));

        let coded = Condition {
            none_of: vec!["NM".into(), "ST".into()],
            ..Condition::present(())
        };
        assert!(coded.matches(Some("CE")));
        assert!(coded.matches(None));
        assert!(!coded.matches(Some("ST")));
    }

    #[test]
    fn generic_rules_deserialize_without_optional_fields() {
        let rule: ForwardRule =
            serde_yaml::from_str("source: OBX-5\ntarget: valueString\nwhen:\n  path: OBX-2\n")
                .expect("rule");
        assert_eq!(rule.transform, Transform::Copy);
        assert_eq!(rule.when, Some(Condition::present("OBX-2".parse().expect("path"))));

        let condition: Condition<ElementPath> =
            serde_yaml::from_str("path: valueQuantity.value\nnone_of: [\"\"]\n").expect("condition");
        assert_eq!(condition.none_of, vec![String::new()]);
        assert!(condition.equals.is_none());
    }
}
