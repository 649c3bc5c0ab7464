//! Value transforms applied by mapping rules.
//!
//! Forward transforms read HL7 through a [`Terser`] and produce FHIR JSON. Reverse transforms
//! take FHIR JSON and produce a [`FieldValue`] for the builder. The two directions are not
//! always inverses:
//! - gender: `other`, `unknown` and anything unrecognised all become `U`
//! - dates: timezone offsets are dropped and output is truncated to the field length
//!
//! A transform error fails one field only; the engine records it as a warning.

use chrono::{NaiveDate, NaiveDateTime};
use fhir::datatypes::{Address, CodeableConcept, Coding, HumanName, Identifier};
use hl7v2::escape::{escape, escape_except};
use hl7v2::{Delimiters, FieldPath, Terser};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A value the reverse direction writes into a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain text; delimiters in it are escaped on emission.
    Literal(String),
    /// Already encoded HL7 text, split at the target path's level.
    Encoded(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(String);

impl TransformError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

type TransformResult<T> = Result<T, TransformError>;

/// Named transform of a mapping rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Identity on the decoded value.
    #[default]
    Copy,
    /// Composite passthrough: the node's encoded text, delimiters intact. Reverse keeps the
    /// component and repetition separators structural and escapes everything else.
    Encoded,
    /// `M`/`F`/other to `male`/`female`/`other`; reverse collapses to `M`/`F`/`U`.
    Gender,
    /// `yyyyMMdd` to `YYYY-MM-DD`.
    Date,
    /// HL7 DTM to FHIR dateTime at the precision present.
    DateTime,
    /// CX to Identifier.
    Identifier,
    /// XPN to HumanName.
    HumanName,
    /// XAD to Address.
    Address,
    /// CE/CWE to CodeableConcept.
    Coding,
    /// NM to a JSON number.
    Decimal,
    /// OBX-11 result status to ObservationStatus.
    ObservationStatus,
}

impl Transform {
    /// HL7 to FHIR. `Ok(None)` means the source is absent.
    pub fn forward(self, terser: &Terser<'_>, path: &FieldPath) -> TransformResult<Option<Value>> {
        let text = |raw: String| non_empty(raw.trim().to_string());
        let component = |n: usize| {
            let p = path.clone().with_component(n).with_subcomponent(1);
            terser.get(&p).trim().to_string()
        };

        let value = match self {
            Transform::Copy => text(terser.get(path)).map(Value::String),
            Transform::Encoded => text(terser.get_encoded(path)).map(Value::String),
            Transform::Gender => text(terser.get(path))
                .map(|raw| Value::String(gender_forward(&raw).into())),
            Transform::Date => text(terser.get(path))
                .map(|raw| date_forward(&raw).map(Value::String))
                .transpose()?,
            Transform::DateTime => text(terser.get(path))
                .map(|raw| date_time_forward(&raw).map(Value::String))
                .transpose()?,
            Transform::Decimal => text(terser.get(path))
                .map(|raw| parse_decimal(&raw).map(Value::Number))
                .transpose()?,
            Transform::ObservationStatus => text(terser.get(path))
                .map(|raw| status_forward(&raw).map(|s| Value::String(s.into())))
                .transpose()?,
            Transform::Identifier => identifier_forward(&component),
            Transform::HumanName => human_name_forward(&component),
            Transform::Address => address_forward(&component),
            Transform::Coding => coding_forward(&component),
        };
        Ok(value)
    }

    /// FHIR to HL7. `Ok(None)` means nothing should be written.
    pub fn reverse(
        self,
        value: &Value,
        length: Option<usize>,
        delimiters: &Delimiters,
    ) -> TransformResult<Option<FieldValue>> {
        let written = match self {
            Transform::Copy => primitive_text(value)?.map(FieldValue::Literal),
            Transform::Encoded => primitive_text(value)?.map(|text| {
                let structural = [delimiters.component, delimiters.repetition];
                FieldValue::Encoded(escape_except(&text, &structural, delimiters))
            }),
            Transform::Gender => {
                let code = value.as_str().unwrap_or_default();
                Some(FieldValue::Literal(gender_reverse(code).into()))
            }
            Transform::Date | Transform::DateTime => {
                let text = expect_str(value)?;
                Some(FieldValue::Literal(date_reverse(text, length)?))
            }
            Transform::Decimal => Some(FieldValue::Literal(decimal_reverse(value)?)),
            Transform::ObservationStatus => {
                let text = expect_str(value)?;
                Some(FieldValue::Literal(status_reverse(text)?.into()))
            }
            Transform::Identifier => {
                let identifier: Identifier = typed(value, "Identifier")?;
                identifier_reverse(&identifier, delimiters)
            }
            Transform::HumanName => {
                let name: HumanName = typed(value, "HumanName")?;
                human_name_reverse(&name, delimiters)
            }
            Transform::Address => {
                let address: Address = typed(value, "Address")?;
                address_reverse(&address, delimiters)
            }
            Transform::Coding => {
                let concept: CodeableConcept = typed(value, "CodeableConcept")?;
                coding_reverse(&concept, delimiters)
            }
        };
        Ok(written)
    }
}

// ============================================================================
// Composite forward transforms
// ============================================================================

type ComponentReader<'r> = dyn Fn(usize) -> String + 'r;

/// CX: value in .1, assigning authority in .4, type code in .5.
fn identifier_forward(component: &ComponentReader<'_>) -> Option<Value> {
    let id = Identifier {
        value: non_empty(component(1)),
        system: non_empty(component(4)),
        type_: non_empty(component(5)).map(|code| CodeableConcept {
            coding: vec![Coding {
                code: Some(code),
                ..Default::default()
            }],
            text: None,
        }),
    };
    (id.value.is_some() || id.system.is_some()).then(|| to_json(&id))
}

/// XPN: family, given, middle, suffix, prefix.
fn human_name_forward(component: &ComponentReader<'_>) -> Option<Value> {
    let parts: Vec<String> = (1..=5).map(component).collect();
    let text = parts[..2]
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    let name = HumanName {
        use_type: None,
        text: non_empty(text),
        family: non_empty(parts[0].clone()),
        given: parts[1..3].iter().filter(|p| !p.is_empty()).cloned().collect(),
        suffix: non_empty(parts[3].clone()).into_iter().collect(),
        prefix: non_empty(parts[4].clone()).into_iter().collect(),
    };
    (name != HumanName::default()).then(|| to_json(&name))
}

fn address_forward(component: &ComponentReader<'_>) -> Option<Value> {
    let parts: Vec<String> = (1..=6).map(component).collect();
    let address = Address {
        line: parts[..2].iter().filter(|p| !p.is_empty()).cloned().collect(),
        city: non_empty(parts[2].clone()),
        state: non_empty(parts[3].clone()),
        postal_code: non_empty(parts[4].clone()),
        country: non_empty(parts[5].clone()),
    };
    (address != Address::default()).then(|| to_json(&address))
}

/// CE/CWE: code, text, coding system.
fn coding_forward(component: &ComponentReader<'_>) -> Option<Value> {
    let coding = Coding {
        code: non_empty(component(1)),
        display: non_empty(component(2)),
        system: non_empty(component(3)),
    };
    if coding == Coding::default() {
        return None;
    }
    let concept = CodeableConcept {
        text: coding.display.clone(),
        coding: vec![coding],
    };
    Some(to_json(&concept))
}


// ============================================================================
// Scalar transforms
// ============================================================================

fn gender_forward(code: &str) -> &'static str {
    match code {
        "M" => "male",
        "F" => "female",
        _ => "other",
    }
}

fn gender_reverse(code: &str) -> &'static str {
    match code {
        "male" => "M",
        "female" => "F",
        _ => "U",
    }
}

/// `yyyyMMdd` to `YYYY-MM-DD`; anything else fails.
fn date_forward(raw: &str) -> TransformResult<String> {
    let invalid = || TransformError::new(format!("'{raw}' is not a yyyyMMdd date"));
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| invalid())?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// `yyyy[MM[dd[HH[mm[ss[.S+]]]]]][+/-zzzz]` to a FHIR date or dateTime.
fn date_time_forward(raw: &str) -> TransformResult<String> {
    let invalid = |why: &str| TransformError::new(format!("'{raw}' is not an HL7 timestamp: {why}"));

    let (body, offset) = match raw.char_indices().skip(1).find(|(_, c)| *c == '+' || *c == '-') {
        Some((i, _)) => (&raw[..i], Some(&raw[i..])),
        None => (raw, None),
    };
    let digits = body.split('.').next().unwrap_or_default();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("non-digit characters"));
    }

    let date = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| invalid("not a calendar date"))
    };

    let formatted = match digits.len() {
        4 => digits.to_string(),
        6 => date(&format!("{digits}01"))?.format("%Y-%m").to_string(),
        8 => date(digits)?.format("%Y-%m-%d").to_string(),
        10 | 12 | 14 => {
            let padded = format!("{digits:0<14}");
            let at = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
                .map_err(|_| invalid("not a calendar time"))?;
            let mut out = at.format("%Y-%m-%dT%H:%M:%S").to_string();
            if let Some(offset) = offset {
                out.push_str(&offset_forward(offset).ok_or_else(|| invalid("bad offset"))?);
            }
            out
        }
        _ => return Err(invalid("unexpected precision")),
    };
    Ok(formatted)
}

/// `+hhmm` to `+hh:mm`.
fn offset_forward(offset: &str) -> Option<String> {
    let (sign, digits) = offset.split_at(1);
    let ok = digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit());
    ok.then(|| format!("{sign}{}:{}", &digits[..2], &digits[2..]))
}

/// ISO date or dateTime to `yyyyMMdd[HHmm[ss]]`, truncated to `length`; offsets dropped.
fn date_reverse(text: &str, length: Option<usize>) -> TransformResult<String> {
    let invalid = || TransformError::new(format!("'{text}' is not a FHIR date or dateTime"));

    let (date, time) = match text.trim().split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (text.trim(), None),
    };

    let date_digits: String = date.split('-').collect();
    let date_ok = matches!(date_digits.len(), 4 | 6 | 8)
        && date_digits.bytes().all(|b| b.is_ascii_digit())
        && (date_digits.len() != 8 || NaiveDate::parse_from_str(&date_digits, "%Y%m%d").is_ok());
    if !date_ok {
        return Err(invalid());
    }

    let mut out = date_digits;
    if let Some(time) = time {
        let local = time
            .split(['Z', '+', '-'])
            .next()
            .unwrap_or_default()
            .split('.')
            .next()
            .unwrap_or_default();
        let time_digits: String = local.split(':').collect();
        let time_ok = matches!(time_digits.len(), 2 | 4 | 6)
            && time_digits.bytes().all(|b| b.is_ascii_digit());
        if !time_ok {
            return Err(invalid());
        }
        out.push_str(&time_digits);
    }

    if let Some(length) = length {
        out.truncate(length);
    }
    Ok(out)
}

fn parse_decimal(raw: &str) -> TransformResult<Number> {
    let invalid = || TransformError::new(format!("'{raw}' is not a number"));

    let numeric = raw
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+'));
    if !numeric || !raw.bytes().any(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    if !raw.contains('.') {
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Number::from(n));
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(invalid)
}

fn decimal_reverse(value: &Value) -> TransformResult<String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => parse_decimal(s.trim()).map(|_| s.trim().to_string()),
        other => Err(TransformError::new(format!("expected a number, got {other}"))),
    }
}

fn status_forward(code: &str) -> TransformResult<&'static str> {
    match code {
        "F" => Ok("final"),
        "C" => Ok("corrected"),
        "P" | "R" | "S" => Ok("preliminary"),
        "I" => Ok("registered"),
        "X" => Ok("cancelled"),
        "D" | "W" => Ok("entered-in-error"),
        other => Err(TransformError::new(format!(
            "'{other}' is not a supported result status"
        ))),
    }
}

fn status_reverse(status: &str) -> TransformResult<&'static str> {
    match status {
        "final" => Ok("F"),
        "corrected" | "amended" => Ok("C"),
        "preliminary" => Ok("P"),
        "registered" => Ok("I"),
        "cancelled" => Ok("X"),
        "entered-in-error" => Ok("W"),
        other => Err(TransformError::new(format!(
            "'{other}' has no HL7 result status"
        ))),
    }
}

// ============================================================================
// Composite reverse transforms
// ============================================================================

/// `value^^^system[^type]`; the empty CX.2 and CX.3 are always emitted.
fn identifier_reverse(id: &Identifier, delimiters: &Delimiters) -> Option<FieldValue> {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
    if blank(&id.value) && blank(&id.system) {
        return None;
    }
    let type_code = id
        .type_
        .as_ref()
        .and_then(|t| t.coding.first())
        .and_then(|c| c.code.clone());

    let mut parts = vec![
        id.value.clone().unwrap_or_default(),
        String::new(),
        String::new(),
        id.system.clone().unwrap_or_default(),
    ];
    parts.extend(type_code);
    Some(FieldValue::Encoded(join_components(&parts, delimiters)))
}

/// `family^given^middle^suffix^prefix`.
fn human_name_reverse(name: &HumanName, delimiters: &Delimiters) -> Option<FieldValue> {
    let family = name
        .family
        .clone()
        .or_else(|| name.given.is_empty().then(|| name.text.clone()).flatten());

    let parts = trim_trailing(vec![
        family.unwrap_or_default(),
        name.given.first().cloned().unwrap_or_default(),
        name.given.get(1..).map(|m| m.join(" ")).unwrap_or_default(),
        name.suffix.first().cloned().unwrap_or_default(),
        name.prefix.first().cloned().unwrap_or_default(),
    ]);
    (!parts.is_empty()).then(|| FieldValue::Encoded(join_components(&parts, delimiters)))
}

/// `street^other^city^state^zip^country`.
fn address_reverse(address: &Address, delimiters: &Delimiters) -> Option<FieldValue> {
    let parts = trim_trailing(vec![
        address.line.first().cloned().unwrap_or_default(),
        address.line.get(1..).map(|l| l.join(", ")).unwrap_or_default(),
        address.city.clone().unwrap_or_default(),
        address.state.clone().unwrap_or_default(),
        address.postal_code.clone().unwrap_or_default(),
        address.country.clone().unwrap_or_default(),
    ]);
    (!parts.is_empty()).then(|| FieldValue::Encoded(join_components(&parts, delimiters)))
}

/// `code^display^system` from the first coding.
fn coding_reverse(concept: &CodeableConcept, delimiters: &Delimiters) -> Option<FieldValue> {
    let coding = concept.coding.first().cloned().unwrap_or_default();
    let parts = trim_trailing(vec![
        coding.code.unwrap_or_default(),
        coding.display.or_else(|| concept.text.clone()).unwrap_or_default(),
        coding.system.unwrap_or_default(),
    ]);
    (!parts.is_empty()).then(|| FieldValue::Encoded(join_components(&parts, delimiters)))
}

// ============================================================================
// Helpers
// ============================================================================

fn join_components(parts: &[String], delimiters: &Delimiters) -> String {
    parts
        .iter()
        .map(|p| escape(p, delimiters))
        .collect::<Vec<_>>()
        .join(&delimiters.component.to_string())
}

fn trim_trailing(mut parts: Vec<String>) -> Vec<String> {
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn typed<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> TransformResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| TransformError::new(format!("not a valid {what}: {e}")))
}

fn expect_str(value: &Value) -> TransformResult<&str> {
    value
        .as_str()
        .ok_or_else(|| TransformError::new(format!("expected a string, got {value}")))
}

fn primitive_text(value: &Value) -> TransformResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(TransformError::new(format!(
            "expected a primitive value, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl7v2::Message;
    use serde_json::json;

    const ADT: &str = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401011200||ADT^A01|MSG00001|P|2.5\r\
PID|1||12345^^^Hospital^MR~67890^^^NHS&2.16.840&ISO||Ravi^Kumar^J^Jr^Dr||19800101|M|||1 Main St^Flat 2^Leeds^^LS1 1AA^GB\r\
OBX|1|NM|8867-4^Heart rate^LN||72|/min|||||F|||20240101120000+0100\r\
OBX|2|NM|8302-2^Height^LN||1.75|m|||||Q";

    fn path(s: &str) -> FieldPath {
        s.parse().expect("valid path")
    }

    fn forward(transform: Transform, p: &str) -> TransformResult<Option<Value>> {
        let msg = Message::parse(ADT).expect("parse");
        transform.forward(&Terser::new(&msg), &path(p))
    }

    fn reverse(transform: Transform, value: Value) -> TransformResult<Option<FieldValue>> {
        transform.reverse(&value, None, &Delimiters::default())
    }

    #[test]
    fn gender_mapping_is_lossy_on_reverse() {
        assert_eq!(gender_forward("M"), "male");
        assert_eq!(gender_forward("F"), "female");
        assert_eq!(gender_forward("X"), "other");
        assert_eq!(gender_reverse("male"), "M");
        assert_eq!(gender_reverse("female"), "F");
        assert_eq!(gender_reverse("other"), "U");
        assert_eq!(gender_reverse("unknown"), "U");

        assert_eq!(forward(Transform::Gender, "PID-8"), Ok(Some(json!("male"))));
        assert_eq!(forward(Transform::Gender, "PID-9"), Ok(None));
    }

    #[test]
    fn date_forward_requires_eight_digits() {
        assert_eq!(date_forward("19800101").as_deref(), Ok("1980-01-01"));
        for bad in ["bad", "1980010", "198001011", "19801301", "1980-01-01"] {
            assert!(date_forward(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn date_time_forward_keeps_precision() {
        assert_eq!(date_time_forward("2024").as_deref(), Ok("2024"));
        assert_eq!(date_time_forward("202401").as_deref(), Ok("2024-01"));
        assert_eq!(date_time_forward("20240101").as_deref(), Ok("2024-01-01"));
        assert_eq!(
            date_time_forward("202401011200").as_deref(),
            Ok("2024-01-01T12:00:00")
        );
        assert_eq!(
            date_time_forward("20240101120000.123-0500").as_deref(),
            Ok("2024-01-01T12:00:00-05:00")
        );
        for bad in ["2024011", "20241301", "20240101126000", "2024010112+05"] {
            assert!(date_time_forward(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn date_reverse_drops_offset_and_truncates() {
        assert_eq!(date_reverse("1990-05-17", None).as_deref(), Ok("19900517"));
        assert_eq!(
            date_reverse("2024-01-01T12:30:45+01:00", None).as_deref(),
            Ok("20240101123045")
        );
        assert_eq!(
            date_reverse("2024-01-01T12:30:45.5Z", Some(12)).as_deref(),
            Ok("202401011230")
        );
        assert_eq!(date_reverse("2024-01", None).as_deref(), Ok("202401"));
        assert!(date_reverse("17/05/1990", None).is_err());
        assert!(date_reverse("1990-02-30", None).is_err());
    }

    #[test]
    fn identifier_forward_reads_cx_components() {
        assert_eq!(
            forward(Transform::Identifier, "PID-3"),
            Ok(Some(json!({
                "type": {"coding": [{"code": "MR"}]},
                "system": "Hospital",
                "value": "12345"
            })))
        );
        assert_eq!(
            forward(Transform::Identifier, "PID-3(1)"),
            Ok(Some(json!({"system": "NHS", "value": "67890"})))
        );
        assert_eq!(forward(Transform::Identifier, "PID-2"), Ok(None));
    }

    #[test]
    fn identifier_reverse_keeps_placeholders() {
        assert_eq!(
            reverse(Transform::Identifier, json!({"value": "99999"})),
            Ok(Some(FieldValue::Encoded("99999^^^".into())))
        );
        assert_eq!(
            reverse(
                Transform::Identifier,
                json!({"value": "1", "system": "A&B", "type": {"coding": [{"code": "MR"}]}})
            ),
            Ok(Some(FieldValue::Encoded("1^^^A\\T\\B^MR".into())))
        );
    }

    #[test]
    fn human_name_text_joins_first_two_components() {
        let name = forward(Transform::HumanName, "PID-5")
            .expect("name")
            .expect("present");
        assert_eq!(
            name,
            json!({
                "text": "Ravi Kumar",
                "family": "Ravi",
                "given": ["Kumar", "J"],
                "prefix": ["Dr"],
                "suffix": ["Jr"]
            })
        );

        assert_eq!(
            reverse(Transform::HumanName, name),
            Ok(Some(FieldValue::Encoded("Ravi^Kumar^J^Jr^Dr".into())))
        );
        assert_eq!(
            reverse(Transform::HumanName, json!({"text": "Prince"})),
            Ok(Some(FieldValue::Encoded("Prince".into())))
        );
    }

    #[test]
    fn address_maps_xad_components() {
        let address = forward(Transform::Address, "PID-11")
            .expect("address")
            .expect("present");
        assert_eq!(
            address,
            json!({
                "line": ["1 Main St", "Flat 2"],
                "city": "Leeds",
                "postalCode": "LS1 1AA",
                "country": "GB"
            })
        );
        assert_eq!(
            reverse(Transform::Address, address),
            Ok(Some(FieldValue::Encoded(
                "1 Main St^Flat 2^Leeds^^LS1 1AA^GB".into()
            )))
        );
    }

    #[test]
    fn coding_maps_ce_components() {
        let code = forward(Transform::Coding, "OBX-3")
            .expect("code")
            .expect("present");
        assert_eq!(
            code,
            json!({
                "coding": [{"system": "LN", "code": "8867-4", "display": "Heart rate"}],
                "text": "Heart rate"
            })
        );
        assert_eq!(
            reverse(Transform::Coding, code),
            Ok(Some(FieldValue::Encoded("8867-4^Heart rate^LN".into())))
        );
    }

    #[test]
    fn decimal_keeps_integers_integral() {
        assert_eq!(forward(Transform::Decimal, "OBX-5"), Ok(Some(json!(72))));
        assert_eq!(forward(Transform::Decimal, "OBX(1)-5"), Ok(Some(json!(1.75))));
        assert!(parse_decimal("seventy").is_err());
        assert!(parse_decimal("NaN").is_err());
        assert_eq!(decimal_reverse(&json!(72)).as_deref(), Ok("72"));
        assert_eq!(decimal_reverse(&json!(1.75)).as_deref(), Ok("1.75"));
        assert!(decimal_reverse(&json!("abc")).is_err());
    }

    #[test]
    fn observation_status_round_trips_known_codes() {
        assert_eq!(
            forward(Transform::ObservationStatus, "OBX-11"),
            Ok(Some(json!("final")))
        );
        assert!(forward(Transform::ObservationStatus, "OBX(1)-11").is_err());
        assert_eq!(status_reverse("amended"), Ok("C"));
        assert!(status_reverse("bogus").is_err());
    }

    #[test]
    fn encoded_passthrough_keeps_delimiters() {
        assert_eq!(
            forward(Transform::Encoded, "PID-11"),
            Ok(Some(json!("1 Main St^Flat 2^Leeds^^LS1 1AA^GB")))
        );
        assert_eq!(
            reverse(Transform::Encoded, json!("WARD^101^1")),
            Ok(Some(FieldValue::Encoded("WARD^101^1".into())))
        );
        assert_eq!(
            forward(Transform::Encoded, "PID-3"),
            Ok(Some(json!("12345^^^Hospital^MR~67890^^^NHS&2.16.840&ISO")))
        );
    }

    #[test]
    fn encoded_reverse_escapes_free_text() {
        assert_eq!(
            reverse(Transform::Encoded, json!("X-ray & Imaging")),
            Ok(Some(FieldValue::Encoded("X-ray \\T\\ Imaging".into())))
        );
        assert_eq!(
            reverse(Transform::Encoded, json!("C:\\scans|2")),
            Ok(Some(FieldValue::Encoded("C:\\E\\scans\\F\\2".into())))
        );
        assert_eq!(
            reverse(Transform::Encoded, json!("A^Alpha^LN~B^Beta^LN")),
            Ok(Some(FieldValue::Encoded("A^Alpha^LN~B^Beta^LN".into())))
        );
    }

    #[test]
    fn copy_rejects_structured_json() {
        assert_eq!(
            reverse(Transform::Copy, json!("A^B")),
            Ok(Some(FieldValue::Literal("A^B".into())))
        );
        assert!(reverse(Transform::Copy, json!({"a": 1})).is_err());
        assert_eq!(reverse(Transform::Copy, json!("")), Ok(None));
    }
}
