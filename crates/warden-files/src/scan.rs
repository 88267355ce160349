//! Heuristic content scan
//!
//! This is pattern matching, NOT antivirus. A clean result only means none
//! of a small set of known-bad patterns was seen; it is never a guarantee
//! that a file is safe.

use crate::denylist::is_dangerous_extension;
use crate::signature::normalize_mime;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Whether heuristic findings are warnings or hard errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSeverity {
    #[default]
    Warning,
    Error,
}

/// One heuristic hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    /// Short stable name of the matched rule
    pub rule: String,
    pub message: String,
}

impl ScanFinding {
    fn new(rule: &str, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Characters that reorder how a name is displayed
const BIDI_OVERRIDES: &[char] = &['\u{202A}', '\u{202B}', '\u{202D}', '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}'];

static SCRIPT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("script-tag", r"(?i)<\s*script"),
        ("javascript-uri", r"(?i)javascript\s*:"),
        ("vbscript-uri", r"(?i)vbscript\s*:"),
        ("event-handler", r#"(?i)\bon[a-z]+\s*=\s*["']?"#),
        ("eval-call", r"(?i)\beval\s*\("),
        ("cookie-access", r"(?i)document\s*\.\s*cookie"),
        ("iframe-tag", r"(?i)<\s*iframe"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid script pattern")))
    .collect()
});

static PDF_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("pdf-javascript", r"/JavaScript|/JS\s*[(<]"),
        ("pdf-launch", r"/Launch"),
        ("pdf-embedded-file", r"/EmbeddedFile"),
        ("pdf-open-action", r"/OpenAction"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid PDF pattern")))
    .collect()
});

const TEXT_LIKE_EXTENSIONS: &[&str] = &["txt", "csv", "rtf", "md", "json", "xml", "log"];

/// Whether the content is inspected as text
pub fn is_text_like(mime: &str, extension: Option<&str>) -> bool {
    let mime = normalize_mime(mime);
    mime.starts_with("text/")
        || mime == "application/rtf"
        || mime == "application/json"
        || mime.ends_with("+xml")
        || extension.is_some_and(|ext| TEXT_LIKE_EXTENSIONS.contains(&ext))
}

/// Suspicious file-name patterns
pub fn scan_filename(name: &str) -> Vec<ScanFinding> {
    let mut findings = Vec::new();

    if name.chars().any(|c| BIDI_OVERRIDES.contains(&c)) {
        findings.push(ScanFinding::new(
            "bidi-override",
            "file name contains a bidirectional override character",
        ));
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        if let Some(inner) = parts[1..parts.len() - 1]
            .iter()
            .find(|p| is_dangerous_extension(p.trim()))
        {
            findings.push(ScanFinding::new(
                "double-extension",
                format!("file name hides a '.{}' extension", inner.trim().to_ascii_lowercase()),
            ));
        }
    }

    let stem = parts[0].trim().to_ascii_lowercase();
    if RESERVED_DEVICE_NAMES.contains(&stem.as_str()) {
        findings.push(ScanFinding::new(
            "reserved-device-name",
            format!("'{}' is a reserved device name", stem),
        ));
    }

    findings
}

/// Script-injection and active-content patterns in the file body
pub fn scan_content(mime: &str, extension: Option<&str>, bytes: &[u8]) -> Vec<ScanFinding> {
    let patterns: &[(&str, Regex)] = if is_text_like(mime, extension) {
        SCRIPT_PATTERNS.as_slice()
    } else if normalize_mime(mime) == "application/pdf" || extension == Some("pdf") {
        PDF_PATTERNS.as_slice()
    } else {
        return Vec::new();
    };

    patterns
        .iter()
        .filter(|(_, regex)| regex.is_match(bytes))
        .map(|(rule, _)| ScanFinding::new(rule, format!("content matches the '{}' pattern", rule)))
        .collect()
}

/// Name and content findings together, name first
pub fn scan(name: &str, mime: &str, extension: Option<&str>, bytes: &[u8]) -> Vec<ScanFinding> {
    let mut findings = scan_filename(name);
    findings.extend(scan_content(mime, extension, bytes));
    findings
}
