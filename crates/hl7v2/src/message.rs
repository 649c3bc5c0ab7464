//! HL7 v2 message tree.
//!
//! Each level of the HL7 value hierarchy is an explicit tagged variant: a node is a
//! `Scalar` exactly when its text contains no lower-level delimiter, otherwise it is a list
//! of the next level down. Leaf strings are stored decoded; [`escape`](crate::escape) is
//! applied again by the `encode` methods.

use crate::escape::{escape, unescape};
use crate::{Delimiters, Hl7Result};

/// Name of the message header segment.
pub const MSH: &str = "MSH";

// ============================================================================
// Component
// ============================================================================

/// A component: either a single value or a list of sub-components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    Scalar(String),
    Subcomponents(Vec<String>),
}

impl Component {
    /// Parse the encoded text of one component.
    pub fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        if raw.contains(delimiters.subcomponent) {
            Component::Subcomponents(
                raw.split(delimiters.subcomponent)
                    .map(|s| unescape(s, delimiters))
                    .collect(),
            )
        } else {
            Component::Scalar(unescape(raw, delimiters))
        }
    }

    /// Encoded text of this component.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        match self {
            Component::Scalar(value) => escape(value, delimiters),
            Component::Subcomponents(subs) => join(
                subs.iter().map(|s| escape(s, delimiters)),
                delimiters.subcomponent,
            ),
        }
    }

    /// Value as text: decoded for a scalar, encoded for a list.
    pub fn value(&self, delimiters: &Delimiters) -> String {
        match self {
            Component::Scalar(value) => value.clone(),
            Component::Subcomponents(_) => self.encode(delimiters),
        }
    }

    /// 1-based sub-component lookup. A scalar is its own first sub-component.
    pub fn subcomponent(&self, index: usize) -> Option<&str> {
        match self {
            Component::Scalar(value) if index == 1 => Some(value.as_str()),
            Component::Scalar(_) => None,
            Component::Subcomponents(subs) => subs.get(index.checked_sub(1)?).map(String::as_str),
        }
    }

    /// Whether the component holds no text at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Component::Scalar(value) => value.is_empty(),
            Component::Subcomponents(subs) => subs.iter().all(String::is_empty),
        }
    }

    pub(crate) fn subcomponent_mut(&mut self, index: usize) -> &mut String {
        if let Component::Scalar(value) = self {
            *self = Component::Subcomponents(vec![std::mem::take(value)]);
        }
        let Component::Subcomponents(subs) = self else {
            unreachable!("scalar component promoted to sub-components");
        };
        let slot = index.max(1) - 1;
        if subs.len() <= slot {
            subs.resize(slot + 1, String::new());
        }
        &mut subs[slot]
    }

    fn normalize(&mut self) {
        if let Component::Subcomponents(subs) = self {
            if subs.len() == 1 {
                *self = Component::Scalar(std::mem::take(&mut subs[0]));
            }
        }
    }
}

// ============================================================================
// Repetition
// ============================================================================

/// One repetition of a field: either a single value or a list of components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Repetition {
    Scalar(String),
    Components(Vec<Component>),
}

impl Repetition {
    /// Parse the encoded text of one repetition.
    pub fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        if raw.contains(delimiters.component) || raw.contains(delimiters.subcomponent) {
            Repetition::Components(
                raw.split(delimiters.component)
                    .map(|c| Component::parse(c, delimiters))
                    .collect(),
            )
        } else {
            Repetition::Scalar(unescape(raw, delimiters))
        }
    }

    /// Encoded text of this repetition.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        match self {
            Repetition::Scalar(value) => escape(value, delimiters),
            Repetition::Components(components) => join(
                components.iter().map(|c| c.encode(delimiters)),
                delimiters.component,
            ),
        }
    }

    /// Value as text: decoded for a scalar, encoded for a list.
    pub fn value(&self, delimiters: &Delimiters) -> String {
        match self {
            Repetition::Scalar(value) => value.clone(),
            Repetition::Components(_) => self.encode(delimiters),
        }
    }

    /// 1-based component lookup. A scalar is its own first component.
    pub fn component(&self, index: usize) -> Option<ComponentRef<'_>> {
        match self {
            Repetition::Scalar(value) if index == 1 => Some(ComponentRef::Scalar(value.as_str())),
            Repetition::Scalar(_) => None,
            Repetition::Components(components) => components
                .get(index.checked_sub(1)?)
                .map(ComponentRef::Component),
        }
    }

    /// Number of components (a scalar counts as one).
    pub fn component_count(&self) -> usize {
        match self {
            Repetition::Scalar(_) => 1,
            Repetition::Components(components) => components.len(),
        }
    }

    /// Whether the repetition holds no text at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Repetition::Scalar(value) => value.is_empty(),
            Repetition::Components(components) => components.iter().all(Component::is_empty),
        }
    }

    pub(crate) fn component_mut(&mut self, index: usize) -> &mut Component {
        if let Repetition::Scalar(value) = self {
            *self = Repetition::Components(vec![Component::Scalar(std::mem::take(value))]);
        }
        let Repetition::Components(components) = self else {
            unreachable!("scalar repetition promoted to components");
        };
        let slot = index.max(1) - 1;
        if components.len() <= slot {
            components.resize(slot + 1, Component::Scalar(String::new()));
        }
        &mut components[slot]
    }

    fn normalize(&mut self) {
        if let Repetition::Components(components) = self {
            components.iter_mut().for_each(Component::normalize);
            if let [Component::Scalar(only)] = components.as_mut_slice() {
                *self = Repetition::Scalar(std::mem::take(only));
            }
        }
    }
}

/// Borrowed view of a component, which may be the scalar repetition itself.
#[derive(Clone, Copy, Debug)]
pub enum ComponentRef<'a> {
    Scalar(&'a str),
    Component(&'a Component),
}

impl<'a> ComponentRef<'a> {
    pub fn value(&self, delimiters: &Delimiters) -> String {
        match *self {
            ComponentRef::Scalar(value) => value.to_string(),
            ComponentRef::Component(component) => component.value(delimiters),
        }
    }

    pub fn encode(&self, delimiters: &Delimiters) -> String {
        match *self {
            ComponentRef::Scalar(value) => escape(value, delimiters),
            ComponentRef::Component(component) => component.encode(delimiters),
        }
    }

    pub fn subcomponent(&self, index: usize) -> Option<&'a str> {
        match *self {
            ComponentRef::Scalar(value) if index == 1 => Some(value),
            ComponentRef::Scalar(_) => None,
            ComponentRef::Component(component) => component.subcomponent(index),
        }
    }
}

// ============================================================================
// Field
// ============================================================================

/// A field: either a single value or a list of repetitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Scalar(String),
    Repetitions(Vec<Repetition>),
}

impl Default for Field {
    fn default() -> Self {
        Field::Scalar(String::new())
    }
}

impl Field {
    /// Parse the encoded text of one field.
    pub fn parse(raw: &str, delimiters: &Delimiters) -> Self {
        let structured = raw.contains(delimiters.repetition)
            || raw.contains(delimiters.component)
            || raw.contains(delimiters.subcomponent);

        if structured {
            Field::Repetitions(
                raw.split(delimiters.repetition)
                    .map(|r| Repetition::parse(r, delimiters))
                    .collect(),
            )
        } else {
            Field::Scalar(unescape(raw, delimiters))
        }
    }

    /// Encoded text of this field.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        match self {
            Field::Scalar(value) => escape(value, delimiters),
            Field::Repetitions(repetitions) => join(
                repetitions.iter().map(|r| r.encode(delimiters)),
                delimiters.repetition,
            ),
        }
    }

    /// 0-based repetition lookup. A scalar field is its own first repetition.
    pub fn repetition(&self, index: usize) -> Option<RepetitionRef<'_>> {
        match self {
            Field::Scalar(value) if index == 0 => Some(RepetitionRef::Scalar(value.as_str())),
            Field::Scalar(_) => None,
            Field::Repetitions(repetitions) => {
                repetitions.get(index).map(RepetitionRef::Repetition)
            }
        }
    }

    /// Number of repetitions; an empty field has none.
    pub fn repetition_count(&self) -> usize {
        match self {
            Field::Scalar(value) if value.is_empty() => 0,
            Field::Scalar(_) => 1,
            Field::Repetitions(repetitions) => repetitions.len(),
        }
    }

    /// Whether the field holds no text at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Scalar(value) => value.is_empty(),
            Field::Repetitions(repetitions) => repetitions.iter().all(Repetition::is_empty),
        }
    }

    pub(crate) fn repetition_mut(&mut self, index: usize) -> &mut Repetition {
        if let Field::Scalar(value) = self {
            *self = Field::Repetitions(vec![Repetition::Scalar(std::mem::take(value))]);
        }
        let Field::Repetitions(repetitions) = self else {
            unreachable!("scalar field promoted to repetitions");
        };
        if repetitions.len() <= index {
            repetitions.resize(index + 1, Repetition::Scalar(String::new()));
        }
        &mut repetitions[index]
    }

    fn normalize(&mut self) {
        if let Field::Repetitions(repetitions) = self {
            repetitions.iter_mut().for_each(Repetition::normalize);
            if let [Repetition::Scalar(only)] = repetitions.as_mut_slice() {
                *self = Field::Scalar(std::mem::take(only));
            }
        }
    }
}

/// Borrowed view of a repetition, which may be the scalar field itself.
#[derive(Clone, Copy, Debug)]
pub enum RepetitionRef<'a> {
    Scalar(&'a str),
    Repetition(&'a Repetition),
}

impl<'a> RepetitionRef<'a> {
    pub fn value(&self, delimiters: &Delimiters) -> String {
        match *self {
            RepetitionRef::Scalar(value) => value.to_string(),
            RepetitionRef::Repetition(repetition) => repetition.value(delimiters),
        }
    }

    pub fn encode(&self, delimiters: &Delimiters) -> String {
        match *self {
            RepetitionRef::Scalar(value) => escape(value, delimiters),
            RepetitionRef::Repetition(repetition) => repetition.encode(delimiters),
        }
    }

    pub fn component(&self, index: usize) -> Option<ComponentRef<'a>> {
        match *self {
            RepetitionRef::Scalar(value) if index == 1 => Some(ComponentRef::Scalar(value)),
            RepetitionRef::Scalar(_) => None,
            RepetitionRef::Repetition(repetition) => repetition.component(index),
        }
    }
}

// ============================================================================
// Segment
// ============================================================================

/// A segment: a 3-character type code and its fields.
///
/// `fields[0]` holds field 1. For MSH, field 1 is the field separator and field 2 the
/// encoding characters; both are kept literally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    name: String,
    fields: Vec<Field>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// MSH segment carrying the given delimiters in MSH-1 and MSH-2.
    pub fn header(delimiters: &Delimiters) -> Self {
        Self {
            name: MSH.to_string(),
            fields: vec![
                Field::Scalar(delimiters.field.to_string()),
                Field::Scalar(delimiters.encoding_characters()),
            ],
        }
    }

    pub(crate) fn with_fields(name: String, fields: Vec<Field>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_header(&self) -> bool {
        self.name == MSH
    }

    /// 1-based field lookup.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index.checked_sub(1)?)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn field_mut(&mut self, index: usize) -> &mut Field {
        let slot = index.max(1) - 1;
        if self.fields.len() <= slot {
            self.fields.resize(slot + 1, Field::default());
        }
        &mut self.fields[slot]
    }

    /// Encoded text of this segment, without terminator.
    pub fn encode(&self, delimiters: &Delimiters) -> String {
        let mut out = self.name.clone();

        let body = if self.is_header() {
            out.push(delimiters.field);
            match self.fields.get(1) {
                Some(Field::Scalar(encoding)) if !encoding.is_empty() => out.push_str(encoding),
                _ => out.push_str(&delimiters.encoding_characters()),
            }
            self.fields.get(2..).unwrap_or_default()
        } else {
            &self.fields[..]
        };

        for field in body {
            out.push(delimiters.field);
            out.push_str(&field.encode(delimiters));
        }
        out
    }

    pub(crate) fn normalize(&mut self) {
        let skip = if self.is_header() { 2 } else { 0 };
        self.fields
            .iter_mut()
            .skip(skip)
            .for_each(Field::normalize);
    }
}

// ============================================================================
// Message
// ============================================================================

/// A parsed HL7 v2 message: its delimiter table and ordered segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl Message {
    pub(crate) fn from_parts(delimiters: Delimiters, segments: Vec<Segment>) -> Self {
        Self {
            delimiters,
            segments,
        }
    }

    /// Parse raw message text, resolving delimiters from its MSH header.
    ///
    /// # Errors
    ///
    /// See [`parser::parse`](crate::parser::parse).
    pub fn parse(raw: &str) -> Hl7Result<Self> {
        crate::parser::parse_message(raw)
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// All segments with the given type code, in message order.
    pub fn segments_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Segment> + 'n
    where
        'a: 'n,
    {
        self.segments.iter().filter(move |s| s.name == name)
    }

    /// The `occurrence`-th (0-based) segment with the given type code.
    pub fn segment(&self, name: &str, occurrence: usize) -> Option<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.name == name)
            .nth(occurrence)
    }

    /// Serialise the message, terminating every segment with `\r`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&segment.encode(&self.delimiters));
            out.push('\r');
        }
        out
    }
}

fn join(parts: impl Iterator<Item = String>, separator: char) -> String {
    let mut out = String::new();
    for (i, part) in parts.enumerate() {
        if i > 0 {
            out.push(separator);
        }
        out.push_str(&part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d() -> Delimiters {
        Delimiters::default()
    }

    #[test]
    fn scalar_field_stays_scalar() {
        let field = Field::parse(r"Ravi\S\Kumar", &d());
        assert_eq!(field, Field::Scalar("Ravi^Kumar".into()));
        assert_eq!(field.encode(&d()), r"Ravi\S\Kumar");
    }

    #[test]
    fn structured_field_resolves_each_level() {
        let field = Field::parse("A^B&C~D", &d());
        let expected = Field::Repetitions(vec![
            Repetition::Components(vec![
                Component::Scalar("A".into()),
                Component::Subcomponents(vec!["B".into(), "C".into()]),
            ]),
            Repetition::Scalar("D".into()),
        ]);
        assert_eq!(field, expected);
        assert_eq!(field.encode(&d()), "A^B&C~D");
        assert_eq!(field.repetition_count(), 2);
    }

    #[test]
    fn subcomponents_without_components_are_wrapped() {
        let rep = Repetition::parse("x&y", &d());
        assert_eq!(
            rep,
            Repetition::Components(vec![Component::Subcomponents(vec![
                "x".into(),
                "y".into()
            ])])
        );
        assert_eq!(rep.encode(&d()), "x&y");
    }

    #[test]
    fn scalar_is_its_own_first_child() {
        let field = Field::Scalar("12345".into());
        let rep = field.repetition(0).expect("first repetition");
        assert_eq!(rep.value(&d()), "12345");
        let comp = rep.component(1).expect("first component");
        assert_eq!(comp.subcomponent(1), Some("12345"));
        assert!(rep.component(2).is_none());
        assert!(field.repetition(1).is_none());
    }

    #[test]
    fn promotion_preserves_existing_value() {
        let mut field = Field::Scalar("Ravi".into());
        *field.repetition_mut(0).component_mut(2) = Component::Scalar("Kumar".into());
        assert_eq!(field.encode(&d()), "Ravi^Kumar");

        *field.repetition_mut(1) = Repetition::Scalar("Alias".into());
        assert_eq!(field.encode(&d()), "Ravi^Kumar~Alias");
    }

    #[test]
    fn normalize_collapses_single_element_lists() {
        let mut field = Field::Repetitions(vec![Repetition::Components(vec![
            Component::Subcomponents(vec!["only".into()]),
        ])]);
        field.normalize();
        assert_eq!(field, Field::Scalar("only".into()));
    }

    #[test]
    fn header_segment_encodes_delimiters_literally() {
        let mut msh = Segment::header(&d());
        *msh.field_mut(3) = Field::Scalar("HIS".into());
        assert_eq!(msh.encode(&d()), r"MSH|^~\&|HIS");
    }

    #[test]
    fn header_keeps_truncation_character() {
        let raw = "MSH|^~\\&#|HIS|RIH\rPID|1||A#B";
        let parsed = Message::parse(raw).expect("parse");
        let encoded = parsed.encode();
        assert!(encoded.starts_with("MSH|^~\\&#|HIS|RIH\r"), "{encoded}");

        let rebuilt = Message::parse(&encoded).expect("reparse");
        assert_eq!(parsed, rebuilt);
        assert_eq!(
            rebuilt.segment("MSH", 0).and_then(|s| s.field(2)),
            Some(&Field::Scalar("^~\\&#".into()))
        );
    }

    #[test]
    fn segment_lookup_by_occurrence() {
        let parsed = Message::parse("MSH|^~\\&|A\rOBX|1\rOBX|2").expect("parse");
        let name = String::from("OBX");
        let second = parsed.segment(&name, 1).expect("second OBX");
        assert_eq!(second.field(1), Some(&Field::Scalar("2".into())));
        assert!(parsed.segment("OBX", 2).is_none());
        assert_eq!(parsed.segments_named("OBX").count(), 2);
    }
}
