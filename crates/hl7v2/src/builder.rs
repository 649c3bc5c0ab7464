//! Outbound message assembly.
//!
//! The builder is the inverse of the parser: values are written into a segment tree by
//! [`FieldPath`] and the tree is serialised on [`MessageBuilder::build`]. Literal values are
//! escaped on emission, so a value containing `^` or `|` survives a build / re-parse cycle.
//!
//! Segment order on build follows the template the builder was created with. The builder
//! does not try to reorder segments generically.

use crate::message::{Component, Field, Message, Repetition, Segment, MSH};
use crate::{Delimiters, FieldPath, Hl7Error, Hl7Result};

/// Mutable message under construction.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    delimiters: Delimiters,
    template: Vec<String>,
    segments: Vec<Segment>,
}

enum Value<'v> {
    Literal(&'v str),
    Encoded(&'v str),
}

impl MessageBuilder {
    /// Start a message with an MSH header and the given segment order.
    ///
    /// `template` lists segment codes in emission order, for example
    /// `["MSH", "EVN", "PID", "PV1", "OBX"]`.
    pub fn new<S: AsRef<str>>(delimiters: Delimiters, template: &[S]) -> Self {
        Self {
            delimiters,
            template: template.iter().map(|s| s.as_ref().to_string()).collect(),
            segments: vec![Segment::header(&delimiters)],
        }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Write a literal value at `path`. Delimiters inside `value` are escaped on build.
    ///
    /// # Errors
    ///
    /// Returns [`Hl7Error::InvalidPath`] when `path` targets field 0, MSH-1 or MSH-2.
    pub fn set_field(&mut self, path: &FieldPath, value: &str) -> Hl7Result<&mut Self> {
        self.write(path, Value::Literal(value))?;
        Ok(self)
    }

    /// Write already encoded HL7 text at `path`.
    ///
    /// The text is split at the level `path` addresses: a whole field may carry repetitions,
    /// a repetition may carry components, and so on. This is the inverse of
    /// [`Terser::get_encoded`](crate::Terser::get_encoded).
    ///
    /// # Errors
    ///
    /// Same as [`MessageBuilder::set_field`].
    pub fn set_encoded(&mut self, path: &FieldPath, encoded: &str) -> Hl7Result<&mut Self> {
        self.write(path, Value::Encoded(encoded))?;
        Ok(self)
    }

    /// Ensure the `occurrence`-th segment of type `name` exists, even with no fields.
    pub fn ensure_segment(&mut self, name: &str, occurrence: usize) -> &mut Self {
        self.segment_mut(name, occurrence);
        self
    }

    /// Serialise the message in template order, `\r` after every segment.
    pub fn build(&self) -> String {
        self.ordered().encode()
    }

    /// The message tree in template order.
    pub fn into_message(self) -> Message {
        self.ordered()
    }

    fn ordered(&self) -> Message {
        let rank = |segment: &Segment| {
            self.template
                .iter()
                .position(|name| name == segment.name())
                .unwrap_or(self.template.len())
        };

        let mut segments = self.segments.clone();
        // Stable sort keeps insertion order within a segment type.
        segments.sort_by_key(|s| rank(s));
        segments.iter_mut().for_each(Segment::normalize);

        Message::from_parts(self.delimiters, segments)
    }

    fn write(&mut self, path: &FieldPath, value: Value<'_>) -> Hl7Result<()> {
        if path.field == 0 || (path.segment == MSH && path.field <= 2) {
            return Err(Hl7Error::InvalidPath(format!(
                "{path} is derived from the delimiters and cannot be written"
            )));
        }

        let delimiters = self.delimiters;
        let field = self
            .segment_mut(&path.segment, path.occurrence)
            .field_mut(path.field);

        match (path.repetition, path.component, path.subcomponent) {
            (None, None, None) => {
                *field = match value {
                    Value::Literal(v) => Field::Scalar(v.to_string()),
                    Value::Encoded(v) => Field::parse(v, &delimiters),
                };
            }
            (Some(rep), None, None) => {
                *field.repetition_mut(rep) = match value {
                    Value::Literal(v) => Repetition::Scalar(v.to_string()),
                    Value::Encoded(v) => Repetition::parse(v, &delimiters),
                };
            }
            (rep, component, None) => {
                let component = field
                    .repetition_mut(rep.unwrap_or(0))
                    .component_mut(component.unwrap_or(1));
                *component = match value {
                    Value::Literal(v) => Component::Scalar(v.to_string()),
                    Value::Encoded(v) => Component::parse(v, &delimiters),
                };
            }
            (rep, component, Some(sub)) => {
                let slot = field
                    .repetition_mut(rep.unwrap_or(0))
                    .component_mut(component.unwrap_or(1))
                    .subcomponent_mut(sub);
                *slot = match value {
                    Value::Literal(v) => v.to_string(),
                    Value::Encoded(v) => crate::escape::unescape(v, &delimiters),
                };
            }
        }

        tracing::trace!(path = %path, "field written");
        Ok(())
    }

    fn segment_mut(&mut self, name: &str, occurrence: usize) -> &mut Segment {
        let existing = self
            .segments
            .iter()
            .filter(|s| s.name() == name)
            .count();
        for _ in existing..=occurrence {
            self.segments.push(Segment::new(name));
        }

        let index = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name() == name)
            .nth(occurrence)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &mut self.segments[index]
    }
}
