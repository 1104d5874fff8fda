//! Minimal N-Triples line splitting.
//!
//! The bulk path never builds an RDF term model: it splits a line on single
//! spaces into at most four fields and compares tokens as raw strings. Literal
//! objects that contain spaces are truncated at the first space, which is fine
//! because only instance-of objects (always IRIs) are ever looked up.

use crate::config::ParseMode;
use crate::error::{PartitionError, Result};

/// Borrowed view of one statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTriple<'a> {
    pub subject: &'a str,
    pub predicate: &'a str,
    pub object: &'a str,
}

/// Split one (already trimmed, non-empty) line.
///
/// Returns `Ok(None)` for a line the lenient path skips.
pub fn split_line<'a>(line: &'a str, mode: ParseMode, line_no: u64) -> Result<Option<RawTriple<'a>>> {
    let mut parts = line.splitn(4, ' ');
    let subject = parts.next();
    let predicate = parts.next();
    let object = parts.next();
    let rest = parts.next();

    match (subject, predicate, object, rest) {
        (Some(subject), Some(predicate), Some(object), rest) => {
            if mode == ParseMode::Strict && rest.is_none() {
                return Err(malformed(line, line_no, "expected `subject predicate object .`"));
            }
            Ok(Some(RawTriple {
                subject,
                predicate,
                object,
            }))
        }
        _ => match mode {
            ParseMode::Lenient => Ok(None),
            ParseMode::Strict => Err(malformed(line, line_no, "fewer than 3 fields")),
        },
    }
}

/// Strict-mode shape check for statements headed to the backbone side.
pub fn check_backbone_shape(triple: &RawTriple<'_>, line: &str, line_no: u64) -> Result<()> {
    if !is_iri_token(triple.subject) {
        return Err(malformed(line, line_no, "subject is not an IRI"));
    }
    if !is_iri_token(triple.predicate) {
        return Err(malformed(line, line_no, "predicate is not an IRI"));
    }
    if !is_iri_token(triple.object) && !is_literal_token(triple.object) {
        return Err(malformed(line, line_no, "object is neither IRI nor literal"));
    }
    Ok(())
}

/// `<...>` with at least one character inside.
pub fn is_iri_token(token: &str) -> bool {
    token.len() > 2 && token.starts_with('<') && token.ends_with('>')
}

/// Literal tokens start with a double quote; suffixes are not inspected.
pub fn is_literal_token(token: &str) -> bool {
    token.starts_with('"')
}

fn malformed(line: &str, line_no: u64, reason: &'static str) -> PartitionError {
    PartitionError::MalformedLine {
        line_no,
        reason,
        line: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "<http://x/Q1> <http://x/P31> <http://x/Q5> .";

    #[test]
    fn splits_four_field_line() {
        let t = split_line(LINE, ParseMode::Strict, 1).unwrap().unwrap();
        assert_eq!(t.subject, "<http://x/Q1>");
        assert_eq!(t.predicate, "<http://x/P31>");
        assert_eq!(t.object, "<http://x/Q5>");
    }

    #[test]
    fn lenient_accepts_three_fields_and_skips_two() {
        let t = split_line("<a> <b> <c>", ParseMode::Lenient, 1).unwrap();
        assert!(t.is_some());
        assert_eq!(split_line("<a> <b>", ParseMode::Lenient, 1).unwrap(), None);
    }

    #[test]
    fn strict_requires_terminator_field() {
        let err = split_line("<a> <b> <c>", ParseMode::Strict, 7).unwrap_err();
        match err {
            PartitionError::MalformedLine { line_no, .. } => assert_eq!(line_no, 7),
            other => panic!("unexpected error: {other}"),
        }
        assert!(split_line("<a>", ParseMode::Strict, 1).is_err());
    }

    #[test]
    fn literal_objects_pass_shape_check() {
        let line = r#"<http://x/Q1> <http://x/label> "hello world"@en ."#;
        let t = split_line(line, ParseMode::Strict, 1).unwrap().unwrap();
        assert_eq!(t.object, "\"hello");
        check_backbone_shape(&t, line, 1).unwrap();
    }

    #[test]
    fn rejects_bare_subject() {
        let line = "Q1 <http://x/P279> <http://x/Q2> .";
        let t = split_line(line, ParseMode::Strict, 1).unwrap().unwrap();
        assert!(check_backbone_shape(&t, line, 1).is_err());

        let line = "<http://x/Q1> <http://x/P279> _:b0 .";
        let t = split_line(line, ParseMode::Strict, 2).unwrap().unwrap();
        assert!(check_backbone_shape(&t, line, 2).is_err());
    }
}
