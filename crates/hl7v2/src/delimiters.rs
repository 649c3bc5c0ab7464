//! Delimiter table resolution.
//!
//! Every HL7 v2 message declares its own control characters in the MSH header: MSH-1 is the
//! field separator and MSH-2 carries the component, repetition, escape and sub-component
//! characters, in that order. All other parts of the crate read them from a [`Delimiters`]
//! value by reference.

use crate::{Hl7Error, Hl7Result};

/// The five HL7 control characters of one message.
///
/// Immutable once resolved. All five characters are pairwise distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// Resolve the delimiter table from an MSH segment header.
    ///
    /// `header` is the raw MSH segment text (at least `MSH|^~\&`). Only the characters
    /// immediately following `MSH` are read.
    ///
    /// # Errors
    ///
    /// Returns [`Hl7Error::MalformedHeader`] if:
    /// - the text does not start with `MSH`,
    /// - the field separator or any of the four encoding characters is missing,
    /// - any two delimiters are the same character, or one is a segment terminator.
    pub fn resolve(header: &str) -> Hl7Result<Self> {
        Self::resolve_at(header, 1)
    }

    /// Same as [`Delimiters::resolve`], reporting errors against `line`.
    pub(crate) fn resolve_at(header: &str, line: usize) -> Hl7Result<Self> {
        let malformed = |reason: &str| Hl7Error::MalformedHeader {
            line,
            reason: reason.to_string(),
        };

        let rest = header
            .strip_prefix("MSH")
            .ok_or_else(|| malformed("header does not start with MSH"))?;

        let mut chars = rest.chars();
        let field = chars
            .next()
            .ok_or_else(|| malformed("missing field separator"))?;

        let encoding: Vec<char> = chars.take_while(|c| *c != field).take(4).collect();
        if encoding.len() < 4 {
            return Err(malformed(&format!(
                "expected 4 encoding characters, found {}",
                encoding.len()
            )));
        }

        let delimiters = Self {
            field,
            component: encoding[0],
            repetition: encoding[1],
            escape: encoding[2],
            subcomponent: encoding[3],
        };
        delimiters.check().map_err(|reason| malformed(&reason))?;

        Ok(delimiters)
    }

    fn check(&self) -> Result<(), String> {
        let all = self.as_array();
        for (i, a) in all.iter().enumerate() {
            if matches!(a, '\r' | '\n') {
                return Err("segment terminator used as delimiter".into());
            }
            if all[i + 1..].contains(a) {
                return Err(format!("delimiter '{a}' is used more than once"));
            }
        }
        Ok(())
    }

    fn as_array(&self) -> [char; 5] {
        [
            self.field,
            self.component,
            self.repetition,
            self.escape,
            self.subcomponent,
        ]
    }

    /// The MSH-2 value for this table (`^~\&` for the defaults).
    pub fn encoding_characters(&self) -> String {
        [
            self.component,
            self.repetition,
            self.escape,
            self.subcomponent,
        ]
        .iter()
        .collect()
    }

    /// Whether `ch` is one of the five control characters.
    pub fn is_delimiter(&self, ch: char) -> bool {
        self.as_array().contains(&ch)
    }
}
