//! XML filter.
//!
//! The dangerous part of standalone XML is the DOCTYPE: external
//! entities exfiltrate local files and recursive entity definitions
//! blow up parsers. Cleaning removes every DOCTYPE declaration,
//! internal subset included, and leaves the document content alone.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Filter for standalone XML documents.
pub struct XmlFilter;

impl ContentFilter for XmlFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Xml]
    }

    fn scrub(&self, bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        // A removal can splice its neighbors into a new declaration, so
        // strip until a pass changes nothing.
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        loop {
            let next = strip_doctypes(&text);
            if next == text {
                break;
            }
            text = next;
        }
        if text.as_bytes() == bytes {
            Ok(FilterOutcome::Allow)
        } else {
            Ok(FilterOutcome::Clean(text.into_bytes()))
        }
    }
}

fn strip_doctypes(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    loop {
        let Some(pos) = find_doctype(rest) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..pos]);
        rest = &rest[pos + doctype_len(&rest[pos..])..];
    }
}

fn find_doctype(xml: &str) -> Option<usize> {
    let upper = xml.to_ascii_uppercase();
    upper.find("<!DOCTYPE")
}

/// Length of the declaration starting at `<!DOCTYPE`, honoring an
/// internal subset in square brackets. An unterminated declaration
/// swallows the rest of the input.
fn doctype_len(decl: &str) -> usize {
    let mut depth = 0i32;
    for (pos, c) in decl.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            '>' if depth <= 0 => return pos + 1,
            _ => {}
        }
    }
    decl.len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn run(xml: &str) -> FilterOutcome {
        XmlFilter.scrub(xml.as_bytes(), &Policy::default()).unwrap()
    }

    #[test]
    fn test_plain_xml_allowed() {
        let xml = "<?xml version=\"1.0\"?><root><child a=\"1\"/></root>";
        assert_eq!(run(xml), FilterOutcome::Allow);
    }

    #[test]
    fn test_simple_doctype_removed() {
        let xml = "<?xml version=\"1.0\"?><!DOCTYPE html SYSTEM \"x.dtd\"><root/>";
        let FilterOutcome::Clean(out) = run(xml) else {
            panic!("expected a rewrite");
        };
        assert_eq!(out, b"<?xml version=\"1.0\"?><root/>");
    }

    #[test]
    fn test_internal_subset_removed_whole() {
        let xml = concat!(
            "<?xml version=\"1.0\"?>",
            "<!DOCTYPE r [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]>",
            "<r>&xxe;</r>"
        );
        let FilterOutcome::Clean(out) = run(xml) else {
            panic!("expected a rewrite");
        };
        assert_eq!(out, b"<?xml version=\"1.0\"?><r>&xxe;</r>");
    }

    #[test]
    fn test_lowercase_doctype_removed() {
        let xml = "<!doctype note><note/>";
        let FilterOutcome::Clean(out) = run(xml) else {
            panic!("expected a rewrite");
        };
        assert_eq!(out, b"<note/>");
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let xml = "<!DOCTYPE a [<!ENTITY e \"v\">]><a>&e;</a>";
        let FilterOutcome::Clean(once) = run(xml) else {
            panic!("expected a rewrite");
        };
        let text = String::from_utf8(once).unwrap();
        assert_eq!(run(&text), FilterOutcome::Allow);
    }
}
