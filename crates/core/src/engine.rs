//! Rule interpreter.
//!
//! [`apply_forward`] turns one segment occurrence into one resource; [`apply_reverse`] turns
//! one resource into field assignments for one segment occurrence. Neither aborts on bad
//! data: a value that cannot be transformed leaves its target unset and adds a warning.
//! The only hard failure is a rule table whose targets conflict in shape.

use crate::error::{MappingWarning, WarningKind};
use crate::rules::{ForwardRule, ForwardRuleSet, ReverseRule, ReverseRuleSet};
use crate::transform::{FieldValue, TransformError};
use fhir::{FhirResult, Resource};
use hl7v2::{Delimiters, FieldPath, Hl7Result, MessageBuilder, Terser};
use serde_json::Value;

/// A mapping result together with the warnings raised while producing it.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapped<T> {
    pub value: T,
    pub warnings: Vec<MappingWarning>,
}

/// One value to write into an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldAssignment {
    pub path: FieldPath,
    pub value: FieldValue,
}

impl FieldAssignment {
    pub fn apply(&self, builder: &mut MessageBuilder) -> Hl7Result<()> {
        match &self.value {
            FieldValue::Literal(text) => builder.set_field(&self.path, text)?,
            FieldValue::Encoded(text) => builder.set_encoded(&self.path, text)?,
        };
        Ok(())
    }
}

/// What the transform produced for one rule, before defaults are considered.
#[derive(Default)]
struct Outcome {
    produced: bool,
    failed: bool,
}

// ============================================================================
// Forward
// ============================================================================

/// Map occurrence `occurrence` of the rule set's segment into a new resource.
///
/// # Errors
///
/// Returns `FhirError::InvalidPath` if two rules write incompatible shapes to the same
/// element.
pub fn apply_forward(
    rules: &ForwardRuleSet,
    terser: &Terser<'_>,
    occurrence: usize,
) -> FhirResult<Mapped<Resource>> {
    let mut resource = Resource::new(rules.resource);
    let mut warnings = Vec::new();

    for rule in &rules.rules {
        if !forward_guard(rule, terser, occurrence) {
            tracing::debug!(target_path = %rule.target, "rule skipped by condition");
            continue;
        }

        let Some(source) = rule.source.as_ref().map(|s| s.clone().with_occurrence(occurrence))
        else {
            if let Some(default) = &rule.default_value {
                write(&mut resource, rule, default.clone())?;
            }
            continue;
        };

        let location = format!("{source} -> {}", rule.target);
        let results: Vec<Result<Option<Value>, TransformError>> = if rule.repeat {
            (0..terser.repetition_count(&source))
                .map(|rep| {
                    rule.transform
                        .forward(terser, &source.clone().with_repetition(rep))
                })
                .collect()
        } else {
            vec![rule.transform.forward(terser, &source)]
        };

        let mut outcome = Outcome::default();
        for result in results {
            match result {
                Ok(Some(value)) => {
                    write(&mut resource, rule, value)?;
                    outcome.produced = true;
                }
                Ok(None) => {}
                Err(e) => {
                    warnings.push(MappingWarning::new(
                        WarningKind::InvalidValue,
                        &location,
                        e.to_string(),
                    ));
                    outcome.failed = true;
                }
            }
        }

        if !outcome.produced && !outcome.failed {
            if rule.required {
                warnings.push(missing_required(&location));
            }
            if let Some(default) = &rule.default_value {
                write(&mut resource, rule, default.clone())?;
            }
        }
    }

    Ok(Mapped {
        value: resource,
        warnings,
    })
}

fn forward_guard(rule: &ForwardRule, terser: &Terser<'_>, occurrence: usize) -> bool {
    let Some(when) = &rule.when else {
        return true;
    };
    let actual = terser.get(&when.path.clone().with_occurrence(occurrence));
    let actual = actual.trim();
    when.matches((!actual.is_empty()).then_some(actual))
}

fn write(resource: &mut Resource, rule: &ForwardRule, value: Value) -> FhirResult<()> {
    if rule.repeat {
        resource.append(&rule.target, value)
    } else {
        resource.set(&rule.target, value)
    }
}

// ============================================================================
// Reverse
// ============================================================================

/// Map `resource` into assignments for occurrence `occurrence` of the rule set's segment.
pub fn apply_reverse(
    rules: &ReverseRuleSet,
    resource: &Resource,
    occurrence: usize,
    delimiters: &Delimiters,
) -> Mapped<Vec<FieldAssignment>> {
    let mut assignments = Vec::new();
    let mut warnings = Vec::new();

    for rule in &rules.rules {
        if !reverse_guard(rule, resource) {
            tracing::debug!(target_path = %rule.target, "rule skipped by condition");
            continue;
        }

        let target = rule.target.clone().with_occurrence(occurrence);

        let Some(source) = &rule.source else {
            assignments.extend(default_assignment(rule, &target));
            continue;
        };

        let location = format!("{source} -> {target}");
        let items: Vec<(FieldPath, &Value)> = match resource.get(source) {
            Some(Value::Array(items)) if rule.repeat => items
                .iter()
                .filter(|item| !is_absent(item))
                .enumerate()
                .map(|(rep, item)| (target.clone().with_repetition(rep), item))
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .find(|item| !is_absent(item))
                .map(|item| (target.clone(), item))
                .into_iter()
                .collect(),
            Some(value) if !is_absent(value) => vec![(target.clone(), value)],
            _ => Vec::new(),
        };

        let mut outcome = Outcome::default();
        for (path, item) in items {
            match rule.transform.reverse(item, rule.length, delimiters) {
                Ok(Some(value)) => {
                    assignments.push(FieldAssignment { path, value });
                    outcome.produced = true;
                }
                Ok(None) => {}
                Err(e) => {
                    warnings.push(MappingWarning::new(
                        WarningKind::InvalidValue,
                        &location,
                        e.to_string(),
                    ));
                    outcome.failed = true;
                }
            }
        }

        if !outcome.produced && !outcome.failed {
            if rule.required {
                warnings.push(missing_required(&location));
            }
            assignments.extend(default_assignment(rule, &target));
        }
    }

    Mapped {
        value: assignments,
        warnings,
    }
}

fn reverse_guard(rule: &ReverseRule, resource: &Resource) -> bool {
    let Some(when) = &rule.when else {
        return true;
    };
    let actual = resource
        .get(&when.path)
        .filter(|v| !is_absent(v))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    when.matches(actual.as_deref())
}

fn default_assignment(rule: &ReverseRule, target: &FieldPath) -> Option<FieldAssignment> {
    let text = match rule.default_value.as_ref()? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(FieldAssignment {
        path: target.clone(),
        value: FieldValue::Literal(text),
    })
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn missing_required(location: &str) -> MappingWarning {
    MappingWarning::new(
        WarningKind::MissingRequired,
        location,
        "required source value is absent",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MappingConfig;
    use hl7v2::Message;
    use serde_json::json;

    fn config() -> MappingConfig {
        MappingConfig::builtin().expect("builtin rules")
    }

    fn forward(rules: &ForwardRuleSet, raw: &str, occurrence: usize) -> Mapped<Resource> {
        let msg = Message::parse(raw).expect("parse");
        apply_forward(rules, &Terser::new(&msg), occurrence).expect("map")
    }

    fn reverse(rules: &ReverseRuleSet, resource: serde_json::Value) -> Mapped<Vec<FieldAssignment>> {
        let resource = Resource::from_value(resource).expect("resource");
        apply_reverse(rules, &resource, 0, &Delimiters::default())
    }

    fn assigned<'a>(mapped: &'a Mapped<Vec<FieldAssignment>>, path: &str) -> Vec<&'a FieldValue> {
        let path: FieldPath = path.parse().expect("path");
        mapped
            .value
            .iter()
            .filter(|a| a.path == path)
            .map(|a| &a.value)
            .collect()
    }

    const PID: &str = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401011200||ADT^A01|MSG00001|P|2.5\r\
PID|1||12345^^^Hospital~777^^^NHS||Ravi^Kumar||19800101|M";

    #[test]
    fn maps_patient_segment() {
        let mapped = forward(&config().patient.forward, PID, 0);
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);
        assert_eq!(
            mapped.value.into_value(),
            json!({
                "resourceType": "Patient",
                "identifier": [
                    {"system": "Hospital", "value": "12345"},
                    {"system": "NHS", "value": "777"}
                ],
                "name": [{"text": "Ravi Kumar", "family": "Ravi", "given": ["Kumar"]}],
                "birthDate": "1980-01-01",
                "gender": "male"
            })
        );
    }

    #[test]
    fn bad_date_leaves_attribute_unset_with_one_warning() {
        let raw = PID.replace("19800101", "bad");
        let mapped = forward(&config().patient.forward, &raw, 0);
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].kind, WarningKind::InvalidValue);
        assert_eq!(mapped.warnings[0].location, "PID-7-1 -> birthDate");
        assert!(mapped.value.as_value().get("birthDate").is_none());
        assert_eq!(mapped.value.as_value()["gender"], "male");
    }

    #[test]
    fn missing_required_source_warns() {
        let raw = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401011200||ADT^A01|MSG00001|P|2.5\rPID|1||||Ravi";
        let mapped = forward(&config().patient.forward, raw, 0);
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].kind, WarningKind::MissingRequired);
        assert!(mapped.value.as_value().get("identifier").is_none());
    }

    #[test]
    fn constants_and_conditions() {
        let raw = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401011200||ADT^A01|MSG00001|P|2.5\rPV1|1|I|WARD^101^1";
        let mapped = forward(&config().encounter.forward, raw, 0);
        assert!(mapped.warnings.is_empty());
        let value = mapped.value.into_value();
        assert_eq!(value["status"], "unknown");
        assert_eq!(
            value["class"],
            json!({"code": "I", "system": "http://terminology.hl7.org/CodeSystem/v2-0004"})
        );
        assert_eq!(value["location"][0]["location"]["display"], "WARD^101^1");

        let raw = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401011200||ADT^A01|MSG00001|P|2.5\rPV1|1";
        let mapped = forward(&config().encounter.forward, raw, 0);
        assert_eq!(mapped.warnings.len(), 1);
        assert!(mapped.value.as_value().get("class").is_none());
    }

    #[test]
    fn maps_each_observation_occurrence() {
        let raw = "MSH|^~\\&|LAB|RIH|EHR|RIH|202401011200||ORU^R01|MSG1|P|2.5\r\
OBX|1|NM|8867-4^Heart rate^LN||72|/min|60-100||||F\r\
OBX|2|ST|8302-2^Comment^LN||Tall \\T\\ thin||||||P";
        let rules = config().observation.forward;

        let numeric = forward(&rules, raw, 0);
        assert!(numeric.warnings.is_empty());
        let numeric = numeric.value.into_value();
        assert_eq!(numeric["valueQuantity"], json!({"value": 72, "unit": "/min"}));
        assert_eq!(numeric["status"], "final");
        assert_eq!(numeric["referenceRange"][0]["text"], "60-100");
        assert!(numeric.get("valueString").is_none());

        let text = forward(&rules, raw, 1).value.into_value();
        assert_eq!(text["valueString"], "Tall & thin");
        assert_eq!(text["status"], "preliminary");
        assert!(text.get("valueQuantity").is_none());
    }

    #[test]
    fn unknown_result_status_warns_without_default() {
        let raw = "MSH|^~\\&|LAB|RIH|EHR|RIH|202401011200||ORU^R01|MSG1|P|2.5\r\
OBX|1|NM|8867-4^Heart rate^LN||72|/min|||||Q";
        let mapped = forward(&config().observation.forward, raw, 0);
        assert_eq!(mapped.warnings.len(), 1);
        assert!(mapped.value.as_value().get("status").is_none());

        let raw = raw.replace("|||||Q", "");
        let mapped = forward(&config().observation.forward, &raw, 0);
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].kind, WarningKind::MissingRequired);
        assert_eq!(mapped.value.as_value()["status"], "unknown");
    }

    #[test]
    fn reverse_maps_patient_fields() {
        let mapped = reverse(
            &config().patient.reverse,
            json!({
                "resourceType": "Patient",
                "identifier": [{"value": "99999"}, null, {"value": "2", "system": "NHS"}],
                "gender": "female",
                "birthDate": "1990-05-17"
            }),
        );
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);
        assert_eq!(
            assigned(&mapped, "PID-8"),
            vec![&FieldValue::Literal("F".into())]
        );
        assert_eq!(
            assigned(&mapped, "PID-7"),
            vec![&FieldValue::Literal("19900517".into())]
        );
        assert_eq!(
            assigned(&mapped, "PID-3(0)"),
            vec![&FieldValue::Encoded("99999^^^".into())]
        );
        assert_eq!(
            assigned(&mapped, "PID-3(1)"),
            vec![&FieldValue::Encoded("2^^^NHS".into())]
        );
        assert_eq!(
            assigned(&mapped, "PID-1"),
            vec![&FieldValue::Literal("1".into())]
        );
    }

    #[test]
    fn reverse_gender_collapses_to_unknown() {
        for gender in ["other", "unknown"] {
            let mapped = reverse(
                &config().patient.reverse,
                json!({"resourceType": "Patient", "identifier": [{"value": "1"}], "gender": gender}),
            );
            assert_eq!(
                assigned(&mapped, "PID-8"),
                vec![&FieldValue::Literal("U".into())]
            );
        }
    }

    #[test]
    fn reverse_default_applies_after_warning() {
        let mapped = reverse(
            &config().encounter.reverse,
            json!({"resourceType": "Encounter", "status": "finished"}),
        );
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].kind, WarningKind::MissingRequired);
        assert_eq!(
            assigned(&mapped, "PV1-2"),
            vec![&FieldValue::Literal("U".into())]
        );
    }

    #[test]
    fn reverse_observation_value_type_follows_value() {
        let rules = config().observation.reverse;
        let mapped = reverse(
            &rules,
            json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {"coding": [{"code": "8867-4", "display": "Heart rate", "system": "LN"}]},
                "valueQuantity": {"value": 72, "unit": "/min"}
            }),
        );
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);
        assert_eq!(assigned(&mapped, "OBX-2"), vec![&FieldValue::Literal("NM".into())]);
        assert_eq!(assigned(&mapped, "OBX-5"), vec![&FieldValue::Literal("72".into())]);
        assert_eq!(assigned(&mapped, "OBX-11"), vec![&FieldValue::Literal("F".into())]);

        let mapped = reverse(
            &rules,
            json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {"text": "Comment"},
                "valueString": "Tall & thin"
            }),
        );
        assert_eq!(assigned(&mapped, "OBX-2"), vec![&FieldValue::Literal("ST".into())]);
        assert_eq!(
            assigned(&mapped, "OBX-5"),
            vec![&FieldValue::Encoded("Tall \\T\\ thin".into())]
        );
    }

    #[test]
    fn quantity_wins_over_string_value() {
        let mapped = reverse(
            &config().observation.reverse,
            json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {"text": "Heart rate"},
                "valueQuantity": {"value": 72},
                "valueString": "seventy-two"
            }),
        );
        assert_eq!(
            assigned(&mapped, "OBX-5"),
            vec![&FieldValue::Literal("72".into())]
        );

        let mut builder = MessageBuilder::new(Delimiters::default(), &["MSH", "OBX"]);
        for assignment in &mapped.value {
            assignment.apply(&mut builder).expect("apply");
        }
        let message = builder.into_message();
        let terser = Terser::new(&message);
        assert_eq!(terser.get(&"OBX-2".parse().expect("path")), "NM");
        assert_eq!(terser.get(&"OBX-5".parse().expect("path")), "72");
    }

    #[test]
    fn coded_string_value_keeps_structure() {
        let raw = "MSH|^~\\&|LAB|RIH|EHR|RIH|202401011200||ORU^R01|MSG1|P|2.5\r\
OBX|1|CE|X^Y^LN||A^Alpha^LN~B^Beta^LN||||||F";
        let mapped = forward(&config().observation.forward, raw, 0);
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);
        let resource = mapped.value;
        assert_eq!(
            resource.as_value()["valueString"],
            "A^Alpha^LN~B^Beta^LN"
        );

        let reversed = apply_reverse(
            &config().observation.reverse,
            &resource,
            0,
            &Delimiters::default(),
        );
        let mut builder = MessageBuilder::new(Delimiters::default(), &["MSH", "OBX"]);
        for assignment in &reversed.value {
            assignment.apply(&mut builder).expect("apply");
        }
        let message = builder.into_message();
        let terser = Terser::new(&message);
        let get = |p: &str| terser.get(&p.parse().expect("path"));
        assert_eq!(get("OBX-5-1"), "A");
        assert_eq!(get("OBX-5(1)-2"), "Beta");
        assert_eq!(terser.repetition_count(&"OBX-5".parse().expect("path")), 2);
    }

    #[test]
    fn assignments_build_a_segment() {
        let mapped = reverse(
            &config().patient.reverse,
            json!({
                "resourceType": "Patient",
                "identifier": [{"value": "99999", "system": "Hospital"}],
                "name": [{"family": "O^Brien", "given": ["Ann"]}],
                "gender": "female"
            }),
        );
        let mut builder = MessageBuilder::new(Delimiters::default(), &["MSH", "PID"]);
        for assignment in &mapped.value {
            assignment.apply(&mut builder).expect("apply");
        }
        let msg = builder.into_message();
        let terser = Terser::new(&msg);
        assert_eq!(terser.get(&"PID-5-1".parse().expect("path")), "O^Brien");
        assert_eq!(terser.get(&"PID-3-4".parse().expect("path")), "Hospital");
        assert_eq!(terser.get(&"PID-8".parse().expect("path")), "F");
    }
}
