//! Escape sequence codec.
//!
//! HL7 v2 escapes delimiter characters inside values as `\F\`, `\S\`, `\R\`, `\T\` and
//! `\E\` (shown here with the default escape character). Values are stored decoded in the
//! message tree and encoded again only when a message is emitted.
//!
//! Escape sequences this crate does not interpret (highlighting `\H\`, hex data `\X0D\`,
//! formatting commands `\.br\`, ...) are passed through verbatim in both directions.

use crate::Delimiters;

/// Decode the escape sequences of a single leaf value.
///
/// Never fails: unknown or unterminated sequences are kept as-is.
pub fn unescape(raw: &str, delimiters: &Delimiters) -> String {
    let esc = delimiters.escape;
    if !raw.contains(esc) {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find(esc) {
        out.push_str(&rest[..start]);
        let after = &rest[start + esc.len_utf8()..];

        let Some(end) = after.find(esc) else {
            // Unterminated sequence: keep the remainder literally.
            out.push_str(&rest[start..]);
            return out;
        };

        let code = &after[..end];
        match decode_code(code, delimiters) {
            Some(ch) => out.push(ch),
            None => {
                out.push(esc);
                out.push_str(code);
                out.push(esc);
            }
        }
        rest = &after[end + esc.len_utf8()..];
    }

    out.push_str(rest);
    out
}

fn decode_code(code: &str, delimiters: &Delimiters) -> Option<char> {
    match code {
        "F" => Some(delimiters.field),
        "S" => Some(delimiters.component),
        "R" => Some(delimiters.repetition),
        "T" => Some(delimiters.subcomponent),
        "E" => Some(delimiters.escape),
        _ => None,
    }
}

/// Encode every delimiter and escape character of a decoded value.
///
/// Sequences [`unescape`] leaves untouched (`\H\`, `\X0D\`, ...) are emitted as they are,
/// so they keep their meaning on the wire.
pub fn escape(value: &str, delimiters: &Delimiters) -> String {
    escape_text(value, delimiters, &[], false)
}

/// Make already encoded text safe to write at a single level of the tree.
///
/// Delimiters listed in `structural` are left in place; every other delimiter and any stray
/// escape character is escaped. Well-formed escape sequences are kept as they are.
pub fn escape_except(encoded: &str, structural: &[char], delimiters: &Delimiters) -> String {
    escape_text(encoded, delimiters, structural, true)
}

fn escape_text(
    value: &str,
    delimiters: &Delimiters,
    structural: &[char],
    keep_known: bool,
) -> String {
    let esc = delimiters.escape;
    let needs_work = value
        .chars()
        .any(|c| delimiters.is_delimiter(c) && !structural.contains(&c));
    if !needs_work {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 8);
    let mut rest = value;
    while let Some(ch) = rest.chars().next() {
        let after = &rest[ch.len_utf8()..];

        if ch == esc {
            if let Some(code) = sequence_code(after, esc) {
                if keep_known || decode_code(code, delimiters).is_none() {
                    out.push(esc);
                    out.push_str(code);
                    out.push(esc);
                    rest = &after[code.len() + esc.len_utf8()..];
                    continue;
                }
            }
        }

        match code_for(ch, delimiters) {
            Some(code) if !structural.contains(&ch) => {
                out.push(esc);
                out.push(code);
                out.push(esc);
            }
            _ => out.push(ch),
        }
        rest = after;
    }
    out
}

/// Code of an escape sequence starting right after an escape character, if well formed.
fn sequence_code(after: &str, esc: char) -> Option<&str> {
    let end = after.find(esc)?;
    let code = &after[..end];
    let well_formed = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    well_formed.then_some(code)
}

fn code_for(ch: char, delimiters: &Delimiters) -> Option<char> {
    if ch == delimiters.field {
        Some('F')
    } else if ch == delimiters.component {
        Some('S')
    } else if ch == delimiters.repetition {
        Some('R')
    } else if ch == delimiters.subcomponent {
        Some('T')
    } else if ch == delimiters.escape {
        Some('E')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d() -> Delimiters {
        Delimiters::default()
    }

    #[test]
    fn decodes_known_sequences() {
        assert_eq!(unescape(r"a\F\b", &d()), "a|b");
        assert_eq!(unescape(r"\S\\R\\T\\E\", &d()), r"^~&\");
        assert_eq!(unescape("plain", &d()), "plain");
    }

    #[test]
    fn passes_unknown_sequences_through() {
        assert_eq!(unescape(r"\H\bold\N\", &d()), r"\H\bold\N\");
        assert_eq!(unescape(r"line\.br\next", &d()), r"line\.br\next");
        assert_eq!(unescape(r"\X0D\", &d()), r"\X0D\");
    }

    #[test]
    fn keeps_unterminated_sequence() {
        assert_eq!(unescape(r"abc\F", &d()), r"abc\F");
        assert_eq!(unescape(r"\S\tail\", &d()), r"^tail\");
    }

    #[test]
    fn escapes_all_delimiters() {
        assert_eq!(escape("a|b^c~d&e\\f", &d()), r"a\F\b\S\c\R\d\T\e\E\f");
        assert_eq!(escape("Kumar", &d()), "Kumar");
    }

    #[test]
    fn escape_then_unescape_is_identity() {
        for value in ["WARD^101", r"\H\", "a~b|c", "x&y", r"trailing\"] {
            assert_eq!(unescape(&escape(value, &d()), &d()), value);
        }
    }

    #[test]
    fn unknown_sequences_survive_emission() {
        assert_eq!(escape(r"\H\bold\N\ a&b", &d()), r"\H\bold\N\ a\T\b");
        assert_eq!(escape(r"line\.br\next", &d()), r"line\.br\next");
        assert_eq!(escape(r"\T\", &d()), r"\E\T\E\");
        assert_eq!(escape(r"a\b c\d", &d()), r"a\E\b c\E\d");
    }

    #[test]
    fn escape_except_keeps_structure() {
        let structural = [d().component, d().repetition];
        assert_eq!(
            escape_except("A^Alpha^LN~B^Beta^LN", &structural, &d()),
            "A^Alpha^LN~B^Beta^LN"
        );
        assert_eq!(
            escape_except("X-ray & Imaging^2", &structural, &d()),
            r"X-ray \T\ Imaging^2"
        );
        assert_eq!(
            escape_except(r"Tall \T\ thin|C:\temp", &structural, &d()),
            r"Tall \T\ thin\F\C:\E\temp"
        );
    }

    #[test]
    fn honours_custom_escape_character() {
        let custom = Delimiters {
            escape: '!',
            ..Delimiters::default()
        };
        assert_eq!(unescape("a!S!b", &custom), "a^b");
        assert_eq!(escape("a^b!", &custom), "a!S!b!E!");
    }
}
