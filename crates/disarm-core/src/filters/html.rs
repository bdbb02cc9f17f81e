//! HTML filter.
//!
//! A tolerant tag-level rewriter, not a conforming HTML parser: real
//! input is full of unclosed tags and broken nesting, and a strict
//! parser would reject exactly the files that most need cleaning.
//!
//! Three rewrites, all driven by [`crate::policy::HtmlRules`]:
//! script-capable elements are removed with their content, `on*` event
//! handler attributes are dropped, and URI attributes using an
//! executable scheme are dropped. Everything else passes through
//! byte-identical, including comments and malformed markup.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::{HtmlRules, Policy};

use super::{ContentFilter, FilterOutcome};

/// Filter for HTML markup.
pub struct HtmlFilter;

impl ContentFilter for HtmlFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Html]
    }

    fn scrub(&self, bytes: &[u8], policy: &Policy) -> Result<FilterOutcome> {
        // Removing a span can splice its neighbors into a new dangerous
        // construct, so rewrite until a pass changes nothing.
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        loop {
            let next = rewrite(&text, &policy.html);
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

struct Tag<'a> {
    /// Byte length of the whole tag including both angle brackets.
    len: usize,
    name: &'a str,
    is_close: bool,
    self_closing: bool,
    /// Attribute text between the name and the closing bracket.
    attrs: &'a str,
}

fn rewrite(html: &str, rules: &HtmlRules) -> String {
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if !rest.starts_with('<') {
            let next = rest.find('<').map_or(html.len(), |p| i + p);
            out.push_str(&html[i..next]);
            i = next;
            continue;
        }
        if rest.starts_with("<!--") {
            let end = rest[4..].find("-->").map_or(html.len(), |p| i + 4 + p + 3);
            out.push_str(&html[i..end]);
            i = end;
            continue;
        }
        let Some(tag) = parse_tag(rest) else {
            out.push('<');
            i += 1;
            continue;
        };

        let name_lc = tag.name.to_ascii_lowercase();
        let stripped = rules.strip_elements.iter().any(|e| *e == name_lc);
        if stripped {
            i += tag.len;
            if !tag.is_close && !tag.self_closing {
                // Content of a stripped element goes with it.
                i = skip_past_close(html, i, &name_lc);
            }
            continue;
        }

        match cleaned_attrs(&tag, rules) {
            None => out.push_str(&rest[..tag.len]),
            Some(kept) => {
                out.push('<');
                if tag.is_close {
                    out.push('/');
                }
                out.push_str(tag.name);
                for attr in kept {
                    out.push(' ');
                    out.push_str(attr);
                }
                if tag.self_closing {
                    out.push('/');
                }
                out.push('>');
            }
        }
        i += tag.len;
    }
    out
}

/// Parses one tag starting at `<`. Returns `None` for text that only
/// looks like a bracket (`<3`, `<!DOCTYPE`, bare `<`).
fn parse_tag(rest: &str) -> Option<Tag<'_>> {
    let mut chars = rest.char_indices().skip(1).peekable();
    let (_, first) = chars.peek().copied()?;
    let is_close = first == '/';
    if is_close {
        chars.next();
    }
    let name_start = chars.peek()?.0;
    if !rest[name_start..].starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut name_end = name_start;
    for (pos, c) in chars.by_ref() {
        if c.is_ascii_alphanumeric() || c == '-' || c == ':' {
            name_end = pos + c.len_utf8();
        } else {
            break;
        }
    }

    // Find the closing bracket, ignoring any inside quoted values.
    let mut quote: Option<char> = None;
    let mut close = None;
    for (pos, c) in rest.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => {
                close = Some(pos);
                break;
            }
            _ => {}
        }
    }
    let close = close?;
    let body = rest[name_end..close].trim_end();
    let self_closing = body.ends_with('/');
    let attrs = if self_closing {
        &body[..body.len() - 1]
    } else {
        body
    };
    Some(Tag {
        len: close + 1,
        name: &rest[name_start..name_end],
        is_close,
        self_closing,
        attrs,
    })
}

/// Advances past the case-insensitive close tag for `name`, or to the
/// end of input when the element is never closed.
fn skip_past_close(html: &str, from: usize, name: &str) -> usize {
    let mut i = from;
    while i < html.len() {
        let Some(p) = html[i..].find('<') else {
            return html.len();
        };
        let at = i + p;
        let rest = &html[at..];
        // Compare on bytes: a fixed-width str slice could land inside a
        // multibyte character in the candidate tag name.
        let rest_bytes = rest.as_bytes();
        if rest_bytes.len() > 2 + name.len()
            && rest.starts_with("</")
            && rest_bytes[2..2 + name.len()].eq_ignore_ascii_case(name.as_bytes())
        {
            // The matched bytes are ASCII, so this offset is a boundary.
            let after = &rest[2 + name.len()..];
            if let Some(stripped) = after.trim_start().strip_prefix('>') {
                return html.len() - stripped.len();
            }
        }
        i = at + 1;
    }
    html.len()
}

/// Returns the kept attribute spans when at least one attribute was
/// removed, or `None` when the tag is untouched.
fn cleaned_attrs<'a>(tag: &Tag<'a>, rules: &HtmlRules) -> Option<Vec<&'a str>> {
    let mut kept = Vec::new();
    let mut removed = false;
    for (name, value, raw) in attr_spans(tag.attrs) {
        if dangerous_attr(&name, value, rules) {
            removed = true;
        } else {
            kept.push(raw);
        }
    }
    removed.then_some(kept)
}

const URI_ATTRS: &[&str] = &["href", "src", "action", "formaction", "background", "xlink:href"];

fn dangerous_attr(name: &str, value: Option<&str>, rules: &HtmlRules) -> bool {
    if name.len() > 2 && name.starts_with("on") {
        return true;
    }
    if URI_ATTRS.contains(&name) {
        if let Some(value) = value {
            // Scheme checks ignore embedded whitespace and control
            // characters ("java\nscript:" is still javascript).
            let compact: String = value
                .chars()
                .filter(|c| !c.is_whitespace() && !c.is_control())
                .collect::<String>()
                .to_ascii_lowercase();
            return rules
                .strip_uri_schemes
                .iter()
                .any(|scheme| compact.starts_with(&format!("{scheme}:")));
        }
    }
    false
}

/// Splits an attribute run into (lowercased name, unquoted value, raw
/// span) triples, tolerating missing values and unquoted values.
fn attr_spans(attrs: &str) -> Vec<(String, Option<&str>, &str)> {
    let mut out = Vec::new();
    let bytes = attrs.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let name = attrs[start..i].to_ascii_lowercase();
        let mut value = None;
        let mut end = i;
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let vstart = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                value = Some(&attrs[vstart..i]);
                if i < bytes.len() {
                    i += 1;
                }
            } else {
                let vstart = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = Some(&attrs[vstart..i]);
            }
            end = i;
        }
        if !name.is_empty() {
            out.push((name, value, &attrs[start..end]));
        }
    }
    out
}
