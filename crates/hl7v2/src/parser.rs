//! Raw text to message tree.
//!
//! Segments are terminated by CR, LF or CRLF; blank lines only separate segments. Optional
//! MLLP framing characters around the payload are ignored. Every structural error is
//! reported with the 1-based physical line it was found on.

use crate::message::{Field, Message, Segment, MSH};
use crate::{Delimiters, Hl7Error, Hl7Result};

const MLLP_START: char = '\u{0b}';
const MLLP_END: char = '\u{1c}';

/// Parse raw message text using an already resolved delimiter table.
///
/// # Errors
///
/// Returns [`Hl7Error`] if:
/// - the input contains no segments ([`Hl7Error::Empty`]),
/// - the first segment is not MSH,
/// - a segment code is not three upper-case alphanumeric characters, or is not followed by
///   the field separator,
/// - the MSH header is too short to carry its encoding characters.
pub fn parse(raw: &str, delimiters: &Delimiters) -> Hl7Result<Message> {
    let mut segments = Vec::new();

    for (line_no, line) in lines(raw) {
        if segments.is_empty() && !line.starts_with(MSH) {
            return Err(Hl7Error::Parse {
                line: line_no,
                reason: "missing MSH segment".into(),
            });
        }
        segments.push(parse_segment(line, line_no, delimiters)?);
    }

    if segments.is_empty() {
        return Err(Hl7Error::Empty);
    }

    tracing::trace!(segments = segments.len(), "parsed HL7 message");
    Ok(Message::from_parts(*delimiters, segments))
}

/// Parse raw message text, resolving delimiters from the MSH header first.
pub(crate) fn parse_message(raw: &str) -> Hl7Result<Message> {
    let (delimiters, _) = read_header(raw)?;
    parse(raw, &delimiters)
}

/// Locate the MSH header line and resolve its delimiters without parsing the message.
///
/// Returns the delimiter table and the raw header line.
pub fn read_header(raw: &str) -> Hl7Result<(Delimiters, &str)> {
    let (line_no, header) = lines(raw).next().ok_or(Hl7Error::Empty)?;
    if !header.starts_with(MSH) {
        return Err(Hl7Error::Parse {
            line: line_no,
            reason: "missing MSH segment".into(),
        });
    }
    let delimiters = Delimiters::resolve_at(header, line_no)?;
    Ok((delimiters, header))
}

/// Non-blank lines with their 1-based line numbers.
fn lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    let raw = raw.trim_start_matches(MLLP_START);
    let raw = raw.trim_end_matches([MLLP_END, '\r', '\n']);

    raw.split('\n')
        .flat_map(|chunk| {
            let chunk = chunk.strip_suffix('\r').unwrap_or(chunk);
            chunk.split('\r')
        })
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
}

fn parse_segment(line: &str, line_no: usize, delimiters: &Delimiters) -> Hl7Result<Segment> {
    let parse_error = |reason: String| Hl7Error::Parse {
        line: line_no,
        reason,
    };

    let name: String = line.chars().take(3).collect();
    let valid_name = name.len() == 3
        && name.starts_with(|c: char| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid_name {
        return Err(parse_error(format!("invalid segment code '{name}'")));
    }

    let rest = &line[3..];
    if name == MSH {
        return parse_header(name, rest, line_no, delimiters);
    }

    if rest.is_empty() {
        return Ok(Segment::with_fields(name, Vec::new()));
    }
    let Some(body) = rest.strip_prefix(delimiters.field) else {
        return Err(parse_error(format!(
            "segment code '{name}' is not followed by the field separator"
        )));
    };

    let fields = body
        .split(delimiters.field)
        .map(|f| Field::parse(f, delimiters))
        .collect();
    Ok(Segment::with_fields(name, fields))
}

fn parse_header(
    name: String,
    rest: &str,
    line_no: usize,
    delimiters: &Delimiters,
) -> Hl7Result<Segment> {
    let malformed = |reason: &str| Hl7Error::MalformedHeader {
        line: line_no,
        reason: reason.to_string(),
    };

    let body = rest
        .strip_prefix(delimiters.field)
        .ok_or_else(|| malformed("MSH-1 does not match the field separator"))?;

    let mut parts = body.split(delimiters.field);
    let encoding = parts.next().unwrap_or_default();
    if encoding.chars().count() < 4 {
        return Err(malformed("MSH-2 must carry four encoding characters"));
    }

    let mut fields = vec![
        Field::Scalar(delimiters.field.to_string()),
        Field::Scalar(encoding.to_string()),
    ];
    fields.extend(parts.map(|f| Field::parse(f, delimiters)));

    Ok(Segment::with_fields(name, fields))
}
