//! Content-based format identification.
//!
//! Identification inspects a bounded prefix of the byte stream for magic
//! signatures and structural markers. The declared file name never drives
//! the detected kind; it is only consulted afterwards to flag a
//! type/extension mismatch, which the policy engine treats as grounds for
//! escalation.

/// Maximum number of prefix bytes the identifier will inspect.
pub const PREFIX_CAP: usize = 4096;

const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Detected content format, independent of the declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedType {
    /// Plain text (valid UTF-8, no structural markers).
    Text,
    /// HTML markup.
    Html,
    /// Generic XML document.
    Xml,
    /// Rich Text Format document.
    Rtf,
    /// PDF document.
    Pdf,
    /// PNG image.
    Png,
    /// RIFF/AVI video container.
    Avi,
    /// MPEG audio (frame sync or ID3 tag).
    Mp3,
    /// ZIP archive.
    Zip,
    /// ZIP-based Office package (OpenXML).
    OoxmlPackage,
    /// OLE2 compound file.
    Ole2,
    /// VBA project stream or embedded macro part.
    MacroPayload,
    /// Unrecognized binary content.
    Binary,
}

impl DetectedType {
    /// Returns `true` for kinds the traversal driver opens as containers.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Zip | Self::OoxmlPackage | Self::Ole2)
    }

    /// Short stable label for reporting and event emission.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Rtf => "rtf",
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Avi => "avi",
            Self::Mp3 => "mp3",
            Self::Zip => "zip",
            Self::OoxmlPackage => "ooxml_package",
            Self::Ole2 => "ole2",
            Self::MacroPayload => "macro_payload",
            Self::Binary => "binary",
        }
    }
}

/// Identification result: the detected kind plus the mismatch flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identified {
    /// Detected format.
    pub kind: DetectedType,
    /// `true` when the declared extension is recognized but implausible
    /// for the detected kind.
    pub mismatch: bool,
}

/// Identifies content from a bounded byte prefix and the declared name.
///
/// Pure function of its inputs; inspects at most [`PREFIX_CAP`] bytes.
#[must_use]
pub fn identify(prefix: &[u8], declared_name: &str) -> Identified {
    let prefix = &prefix[..prefix.len().min(PREFIX_CAP)];
    let kind = sniff(prefix, declared_name);
    Identified {
        kind,
        mismatch: is_mismatch(kind, declared_name),
    }
}

fn sniff(prefix: &[u8], declared_name: &str) -> DetectedType {
    if is_macro_stream_name(declared_name) {
        return DetectedType::MacroPayload;
    }
    if prefix.starts_with(&OLE2_MAGIC) {
        // A compound file delivered as an OpenXML part is always a VBA
        // project blob; standalone compound files are containers.
        if base_name(declared_name).eq_ignore_ascii_case("vbaProject.bin") {
            return DetectedType::MacroPayload;
        }
        return DetectedType::Ole2;
    }
    if prefix.starts_with(b"PK\x03\x04") || prefix.starts_with(b"PK\x05\x06") {
        if contains(prefix, b"[Content_Types].xml") {
            return DetectedType::OoxmlPackage;
        }
        return DetectedType::Zip;
    }
    if prefix.starts_with(&PNG_MAGIC) {
        return DetectedType::Png;
    }
    if prefix.starts_with(b"%PDF-") {
        return DetectedType::Pdf;
    }
    if prefix.starts_with(b"{\\rtf") {
        return DetectedType::Rtf;
    }
    if prefix.len() >= 12 && prefix.starts_with(b"RIFF") && &prefix[8..12] == b"AVI " {
        return DetectedType::Avi;
    }
    if prefix.starts_with(b"ID3")
        || (prefix.len() >= 2 && prefix[0] == 0xFF && prefix[1] & 0xE0 == 0xE0)
    {
        return DetectedType::Mp3;
    }
    sniff_textual(prefix)
}

fn sniff_textual(prefix: &[u8]) -> DetectedType {
    let body = skip_bom_and_space(prefix);
    if body.starts_with(b"<?xml") {
        // XHTML serves as HTML in browsers; treat it as markup.
        if contains_ignore_case(body, b"<html") {
            return DetectedType::Html;
        }
        return DetectedType::Xml;
    }
    if looks_like_html(body) {
        return DetectedType::Html;
    }
    if is_texty(prefix) {
        return DetectedType::Text;
    }
    DetectedType::Binary
}

/// Browser-like HTML heuristics: any of the common document-level tags in
/// the prefix counts, regardless of case or leading garbage.
fn looks_like_html(body: &[u8]) -> bool {
    const MARKERS: [&[u8]; 6] = [
        b"<!doctype html",
        b"<html",
        b"<head",
        b"<body",
        b"<script",
        b"<iframe",
    ];
    MARKERS.iter().any(|m| contains_ignore_case(body, m))
}

/// Text detection: valid UTF-8 prefix with no NUL and a low share of
/// control characters.
fn is_texty(prefix: &[u8]) -> bool {
    if prefix.contains(&0) {
        return false;
    }
    // A prefix may cut a multibyte sequence; tolerate a trailing fragment.
    let valid_len = match std::str::from_utf8(prefix) {
        Ok(_) => prefix.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => return false,
    };
    if valid_len < prefix.len().saturating_sub(3) {
        return false;
    }
    let control = prefix
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();
    control * 16 < prefix.len().max(1)
}

fn is_macro_stream_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.contains("_VBA_PROJECT")
        || upper.starts_with("MACROS/")
        || upper.contains("/MACROS/")
        || upper.starts_with("VBA/")
        || upper.contains("/VBA/")
}

/// Plausible detected kinds for a recognized extension.
///
/// Unknown extensions yield `None`, which never flags a mismatch.
fn plausible_kinds(ext: &str) -> Option<&'static [DetectedType]> {
    use DetectedType::{
        Avi, Binary, Html, MacroPayload, Mp3, Ole2, OoxmlPackage, Pdf, Png, Rtf, Text, Xml, Zip,
    };
    let kinds: &'static [DetectedType] = match ext {
        "txt" | "log" | "md" | "csv" => &[Text],
        "htm" | "html" | "xhtml" => &[Html, Text],
        "xml" | "svg" | "rels" => &[Xml, Text],
        "rtf" => &[Rtf, Text],
        "pdf" => &[Pdf],
        "png" => &[Png],
        "avi" => &[Avi],
        "mp3" => &[Mp3],
        "zip" => &[Zip, OoxmlPackage],
        "docx" | "xlsx" | "pptx" | "docm" | "xlsm" | "pptm" => &[OoxmlPackage, Zip],
        "doc" | "xls" | "ppt" | "msi" => &[Ole2, MacroPayload],
        // vbaProject.bin and friends are honest .bin files.
        "bin" => &[Binary, MacroPayload, Ole2],
        "dat" => &[Binary],
        _ => return None,
    };
    Some(kinds)
}

fn is_mismatch(kind: DetectedType, declared_name: &str) -> bool {
    let Some(ext) = extension_of(declared_name) else {
        return false;
    };
    match plausible_kinds(&ext) {
        Some(kinds) => !kinds.contains(&kind),
        None => false,
    }
}

/// Lowercased extension of the last path component, if any.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let base = base_name(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn skip_bom_and_space(mut b: &[u8]) -> &[u8] {
    if b.starts_with(&[0xEF, 0xBB, 0xBF]) {
        b = &b[3..];
    }
    while let Some((&first, rest)) = b.split_first() {
        if first.is_ascii_whitespace() {
            b = rest;
        } else {
            break;
        }
    }
    b
}

fn contains(hay: &[u8], needle: &[u8]) -> bool {
    hay.windows(needle.len()).any(|w| w == needle)
}

fn contains_ignore_case(hay: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || hay.len() < needle.len() {
        return false;
    }
    hay.windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
