//! Office Open XML package container.
//!
//! An OOXML package is a ZIP archive with package-level bookkeeping: a
//! `[Content_Types].xml` part and `.rels` relationship parts that refer
//! to other parts by name. Dropping a part without touching those leaves
//! dangling references that make consumers reject the file, so rebuilds
//! rewrite both to forget dropped parts.
//!
//! The rewriting is a tolerant tag-level scan, not a full XML parse; it
//! removes whole `<Override>` and `<Relationship>` elements and leaves
//! everything else byte-identical.

use std::collections::HashSet;

use crate::Result;
use crate::error::DisarmError;
use crate::policy::Policy;

use super::zip::ZipContainer;
use super::{Container, Disposition, Member, Rebuilt};

const CONTENT_TYPES: &str = "[Content_Types].xml";

/// OOXML package over an in-memory ZIP archive.
pub struct OoxmlPackage {
    inner: ZipContainer,
}

impl OoxmlPackage {
    /// Opens the package, requiring the content-types part to exist.
    ///
    /// The identifier only saw `[Content_Types].xml` in a byte prefix; a
    /// crafted archive can fake that, so its absence as a real member
    /// downgrades the file to "looked like a package, is not one".
    pub fn open(bytes: Vec<u8>, policy: &Policy) -> Result<Self> {
        let inner = ZipContainer::open(bytes, policy)?;
        if !inner.members().iter().any(|m| m.name == CONTENT_TYPES) {
            return Err(DisarmError::AmbiguousType(
                "zip resembles an OOXML package but has no [Content_Types].xml part".into(),
            ));
        }
        Ok(Self { inner })
    }
}

impl Container for OoxmlPackage {
    fn kind_name(&self) -> &'static str {
        "ooxml"
    }

    fn members(&self) -> &[Member] {
        self.inner.members()
    }

    fn member_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        self.inner.member_bytes(index)
    }

    fn rebuild(&mut self, dispositions: &[Disposition]) -> Result<Rebuilt> {
        if dispositions.len() != self.members().len() {
            return Err(DisarmError::RebuildFailed(
                "disposition count does not match member count".into(),
            ));
        }

        let dropped: HashSet<String> = self
            .members()
            .iter()
            .zip(dispositions)
            .filter(|(_, d)| matches!(d, Disposition::Drop))
            .map(|(m, _)| m.name.clone())
            .collect();
        if dropped.is_empty() {
            return self.inner.rebuild(dispositions);
        }

        let mut adjusted = dispositions.to_vec();
        for i in 0..self.members().len() {
            let name = self.members()[i].name.clone();
            let is_content_types = name == CONTENT_TYPES;
            let is_rels = name.ends_with(".rels");
            if !is_content_types && !is_rels {
                continue;
            }
            let bytes = match &adjusted[i] {
                Disposition::Drop => continue,
                Disposition::Keep => self.member_bytes(i)?,
                Disposition::Replace(bytes) => bytes.clone(),
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let rewritten = if is_content_types {
                strip_overrides(&text, &dropped)
            } else {
                strip_relationships(&text, &name, &dropped)
            };
            if rewritten != text {
                adjusted[i] = Disposition::Replace(rewritten.into_bytes());
            }
        }

        self.inner.rebuild(&adjusted)
    }
}

/// Removes `<Override>` elements whose `PartName` names a dropped part.
fn strip_overrides(xml: &str, dropped: &HashSet<String>) -> String {
    remove_elements(xml, "Override", |attrs| {
        attr_value(attrs, "PartName")
            .is_some_and(|part| dropped.contains(part.trim_start_matches('/')))
    })
}

/// Removes `<Relationship>` elements whose resolved `Target` names a
/// dropped part. Targets are relative to the directory the `.rels` file
/// describes (its grandparent), or package-absolute with a leading `/`.
fn strip_relationships(xml: &str, rels_name: &str, dropped: &HashSet<String>) -> String {
    let base = rels_base(rels_name);
    remove_elements(xml, "Relationship", |attrs| {
        attr_value(attrs, "Target")
            .map(|target| resolve_target(&base, target))
            .is_some_and(|part| dropped.contains(&part))
    })
}

/// Directory the relationships apply to: `word/_rels/document.xml.rels`
/// describes parts relative to `word/`.
fn rels_base(rels_name: &str) -> String {
    let dir = rels_name.rsplit_once('/').map_or("", |(d, _)| d);
    let dir = dir.strip_suffix("_rels").unwrap_or(dir);
    dir.trim_end_matches('/').to_string()
}

fn resolve_target(base: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base.split('/').filter(|c| !c.is_empty()).collect();
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    parts.join("/")
}

/// Removes every `<{tag} ...>` element (self-closing or with a matching
/// close tag) for which `drop_it` returns `true` on its attribute text.
fn remove_elements(xml: &str, tag: &str, drop_it: impl Fn(&str) -> bool) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(pos) = rest.find(&open) {
        // The match must end the tag name: "<Relationship" should not
        // fire inside "<Relationships".
        let after = rest[pos + open.len()..].chars().next();
        if !matches!(after, Some(c) if c.is_whitespace() || c == '/' || c == '>') {
            let cut = pos + open.len();
            out.push_str(&rest[..cut]);
            rest = &rest[cut..];
            continue;
        }
        let Some(gt) = rest[pos..].find('>') else {
            break;
        };
        let tag_end = pos + gt + 1;
        let self_closing = rest[..tag_end].ends_with("/>");
        let element_end = if self_closing {
            tag_end
        } else {
            match rest[tag_end..].find(&close) {
                Some(off) => tag_end + off + close.len(),
                None => tag_end,
            }
        };

        let attrs = &rest[pos + open.len()..tag_end];
        if drop_it(attrs) {
            out.push_str(&rest[..pos]);
        } else {
            out.push_str(&rest[..element_end]);
        }
        rest = &rest[element_end..];
    }
    out.push_str(rest);
    out
}

/// Pulls `name="value"` out of an attribute run; double quotes only,
/// which is what package bookkeeping parts use in practice.
fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = attrs.find(&needle)? + needle.len();
    let end = attrs[start..].find('"')?;
    Some(&attrs[start..start + end])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::{SimpleFileOptions, ZipWriter};

    const CT_XML: &str = concat!(
        r#"<?xml version="1.0"?><Types xmlns="ct">"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Override PartName="/word/document.xml" ContentType="wml.document.main+xml"/>"#,
        r#"<Override PartName="/word/vbaProject.bin" ContentType="ms-office.vbaProject"/>"#,
        r#"</Types>"#
    );

    const RELS_XML: &str = concat!(
        r#"<?xml version="1.0"?><Relationships xmlns="r">"#,
        r#"<Relationship Id="rId1" Type="t/styles" Target="styles.xml"/>"#,
        r#"<Relationship Id="rId2" Type="t/vbaProject" Target="vbaProject.bin"/>"#,
        r#"</Relationships>"#
    );

    fn build_package() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, body) in [
            (CONTENT_TYPES, CT_XML.as_bytes()),
            ("word/document.xml", b"<w:document/>".as_slice()),
            ("word/styles.xml", b"<w:styles/>".as_slice()),
            ("word/vbaProject.bin", b"\xD0\xCF\x11\xE0fake".as_slice()),
            ("word/_rels/document.xml.rels", RELS_XML.as_bytes()),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_open_requires_content_types() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let err = OoxmlPackage::open(bytes, &Policy::default());
        assert!(matches!(err, Err(DisarmError::AmbiguousType(_))));
    }

    #[test]
    fn test_drop_rewrites_content_types_and_rels() {
        let mut package = OoxmlPackage::open(build_package(), &Policy::default()).unwrap();
        let dispositions: Vec<Disposition> = package
            .members()
            .iter()
            .map(|m| {
                if m.name == "word/vbaProject.bin" {
                    Disposition::Drop
                } else {
                    Disposition::Keep
                }
            })
            .collect();
        let Rebuilt::Bytes(rebuilt) = package.rebuild(&dispositions).unwrap() else {
            panic!("ooxml rebuild must produce bytes");
        };

        let mut reread = OoxmlPackage::open(rebuilt, &Policy::default()).unwrap();
        let names: Vec<String> = reread.members().iter().map(|m| m.name.clone()).collect();
        assert!(!names.contains(&"word/vbaProject.bin".to_string()));

        let ct_idx = names.iter().position(|n| n == CONTENT_TYPES).unwrap();
        let ct = String::from_utf8(reread.member_bytes(ct_idx).unwrap()).unwrap();
        assert!(!ct.contains("vbaProject"));
        assert!(ct.contains("/word/document.xml"));

        let rels_idx = names
            .iter()
            .position(|n| n == "word/_rels/document.xml.rels")
            .unwrap();
        let rels = String::from_utf8(reread.member_bytes(rels_idx).unwrap()).unwrap();
        assert!(!rels.contains("vbaProject"));
        assert!(rels.contains("styles.xml"));
    }

    #[test]
    fn test_keep_everything_leaves_bookkeeping_untouched() {
        let mut package = OoxmlPackage::open(build_package(), &Policy::default()).unwrap();
        let keep = vec![Disposition::Keep; package.members().len()];
        let Rebuilt::Bytes(rebuilt) = package.rebuild(&keep).unwrap() else {
            panic!("ooxml rebuild must produce bytes");
        };
        let mut reread = OoxmlPackage::open(rebuilt, &Policy::default()).unwrap();
        let idx = reread
            .members()
            .iter()
            .position(|m| m.name == CONTENT_TYPES)
            .unwrap();
        assert_eq!(reread.member_bytes(idx).unwrap(), CT_XML.as_bytes());
    }

    #[test]
    fn test_resolve_target_forms() {
        assert_eq!(resolve_target("word", "styles.xml"), "word/styles.xml");
        assert_eq!(resolve_target("word", "../media/i.png"), "media/i.png");
        assert_eq!(resolve_target("word", "/docProps/app.xml"), "docProps/app.xml");
        assert_eq!(resolve_target("", "document.xml"), "document.xml");
    }

    #[test]
    fn test_remove_elements_respects_tag_boundary() {
        let xml = r#"<Relationships><Relationship Id="a" Target="x"/></Relationships>"#;
        let out = remove_elements(xml, "Relationship", |attrs| {
            attr_value(attrs, "Target") == Some("x")
        });
        assert_eq!(out, "<Relationships></Relationships>");
    }
}
