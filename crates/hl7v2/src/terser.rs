//! Path-based read access into a parsed message.
//!
//! Reads never fail. Any absent segment, field, repetition, component or sub-component reads
//! as the empty string, which is how HL7 represents "optional and not sent".

use crate::message::{ComponentRef, Message, RepetitionRef, Segment};
use crate::FieldPath;

/// Read-only accessor over a [`Message`].
#[derive(Clone, Copy, Debug)]
pub struct Terser<'a> {
    message: &'a Message,
}

enum Node<'a> {
    SegmentName(&'a str),
    Repetition(RepetitionRef<'a>),
    Component(ComponentRef<'a>),
    Subcomponent(&'a str),
}

impl<'a> Terser<'a> {
    pub fn new(message: &'a Message) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &'a Message {
        self.message
    }

    /// Value at `path`.
    ///
    /// A path that ends at a leaf returns the decoded value. A path that stops above the
    /// leaves (for example `PV1-3` on `WARD^101^1`) returns that node's encoded text with its
    /// delimiters intact. Without a repetition index the first repetition is read.
    pub fn get(&self, path: &FieldPath) -> String {
        let delimiters = self.message.delimiters();
        match self.resolve(path) {
            Some(Node::SegmentName(name)) => name.to_string(),
            Some(Node::Repetition(rep)) => rep.value(delimiters),
            Some(Node::Component(component)) => component.value(delimiters),
            Some(Node::Subcomponent(value)) => value.to_string(),
            None => String::new(),
        }
    }

    /// Encoded text of the node at `path`; leaves are escaped.
    ///
    /// A path naming a whole field without a repetition index encodes every repetition, the
    /// inverse of writing the same path with [`MessageBuilder::set_encoded`](crate::MessageBuilder::set_encoded).
    pub fn get_encoded(&self, path: &FieldPath) -> String {
        let delimiters = self.message.delimiters();
        let whole_field = path.field > 0
            && path.repetition.is_none()
            && path.component.is_none()
            && path.subcomponent.is_none();
        if whole_field {
            return self
                .segment(path)
                .and_then(|segment| segment.field(path.field))
                .map(|field| field.encode(delimiters))
                .unwrap_or_default();
        }

        match self.resolve(path) {
            Some(Node::SegmentName(name)) => name.to_string(),
            Some(Node::Repetition(rep)) => rep.encode(delimiters),
            Some(Node::Component(component)) => component.encode(delimiters),
            Some(Node::Subcomponent(value)) => crate::escape::escape(value, delimiters),
            None => String::new(),
        }
    }

    /// Every repetition of `segment`-`field` in the first occurrence of the segment.
    pub fn get_repeated(&self, segment: &str, field: usize) -> Vec<String> {
        self.get_repeated_at(&FieldPath::new(segment, field))
    }

    /// Every repetition addressed by `path`, ignoring its repetition index.
    ///
    /// Component and sub-component indices of `path` are applied to each repetition, so
    /// `PID-3-1` yields the identifier value of every repetition of PID-3.
    pub fn get_repeated_at(&self, path: &FieldPath) -> Vec<String> {
        (0..self.repetition_count(path))
            .map(|rep| self.get(&path.clone().with_repetition(rep)))
            .collect()
    }

    /// Number of repetitions of the field addressed by `path` (0 when empty or absent).
    pub fn repetition_count(&self, path: &FieldPath) -> usize {
        self.segment(path)
            .and_then(|segment| segment.field(path.field))
            .map(|field| field.repetition_count())
            .unwrap_or(0)
    }

    /// Number of segments with the given type code.
    pub fn segment_count(&self, name: &str) -> usize {
        self.message.segments_named(name).count()
    }

    fn segment(&self, path: &FieldPath) -> Option<&'a Segment> {
        self.message.segment(&path.segment, path.occurrence)
    }

    fn resolve(&self, path: &FieldPath) -> Option<Node<'a>> {
        let segment = self.segment(path)?;
        if path.field == 0 {
            return Some(Node::SegmentName(segment.name()));
        }

        let field = segment.field(path.field)?;
        let rep = field.repetition(path.repetition.unwrap_or(0))?;

        let component_index = match (path.component, path.subcomponent) {
            (None, None) => return Some(Node::Repetition(rep)),
            (component, _) => component.unwrap_or(1),
        };
        let component = rep.component(component_index)?;

        match path.subcomponent {
            None => Some(Node::Component(component)),
            Some(sub) => component.subcomponent(sub).map(Node::Subcomponent),
        }
    }
}
