//! Per-file verdict pipeline
//!
//! Stages run in a fixed order:
//!
//! 1. dangerous denylist (extension, MIME type, config file names)
//! 2. allowed-type match, which decides the [`FileCategory`]
//! 3. size, file name length, NUL bytes and traversal sequences
//! 4. image dimensions
//! 5. magic-byte signature against the declared MIME type
//! 6. heuristic scan of the name and content
//! 7. caller-supplied rules
//!
//! Validation stops at the first error unless `strict_mode` asks for every
//! error to be collected. A denylist hit always stops immediately. The
//! verdict is a pure function of name, declared MIME type, bytes and
//! options.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use warden_core::{Error, FileCategory, RejectionCode, Result};

use crate::denylist::{is_dangerous_extension, is_dangerous_filename, is_dangerous_mime};
use crate::image::read_dimensions;
use crate::scan::{ScanSeverity, scan};
use crate::signature::{SIGNATURE_READ_LEN, SignatureCheck, SignatureTable, normalize_mime};
use crate::source::{FileSource, load_with_timeout};
use crate::types::{FileTypeRule, FileTypeTable, TypeMatch, extension_of, mime_for_extension};

/// One error or warning in a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIssue {
    pub code: RejectionCode,
    pub message: String,
}

impl FileIssue {
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome of validating one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerdict {
    pub file_name: String,
    pub is_valid: bool,
    pub errors: Vec<FileIssue>,
    pub warnings: Vec<FileIssue>,
    pub category: Option<FileCategory>,
    /// MIME type recognised from the leading bytes, if any
    pub detected_mime: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub size: u64,
}

impl FileVerdict {
    pub fn first_error(&self) -> Option<&FileIssue> {
        self.errors.first()
    }

    pub fn error_codes(&self) -> Vec<RejectionCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    pub fn has_error(&self, code: RejectionCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// The verdict itself when valid, otherwise its first error
    pub fn into_result(self) -> Result<FileVerdict> {
        if let Some(issue) = self.errors.first() {
            return Err(Error::FileRejected {
                reason: issue.code,
                detail: format!("{}: {}", self.file_name, issue.message),
            });
        }
        Ok(self)
    }
}

/// What a custom rule gets to look at
#[derive(Debug, Clone, Copy)]
pub struct FileInput<'a> {
    pub name: &'a str,
    pub mime: &'a str,
    pub extension: Option<&'a str>,
    pub category: Option<FileCategory>,
    pub bytes: &'a [u8],
}

/// Errors and warnings added by a custom rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleOutcome {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            warnings: vec![message.into()],
        }
    }
}

/// Caller-supplied validation, run after every built-in stage
pub trait FileRule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, input: &FileInput<'_>) -> RuleOutcome;
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Collect every error instead of stopping at the first
    pub strict_mode: bool,
    /// Restrict accepted categories; `None` accepts every table entry
    pub allowed_categories: Option<Vec<FileCategory>>,
    pub max_filename_length: usize,
    /// Images narrower or shorter than this are rejected
    pub min_image_dimension: u32,
    pub check_dimensions: bool,
    pub verify_signatures: bool,
    pub scan_content: bool,
    pub heuristic_severity: ScanSeverity,
    pub read_timeout_ms: u64,
    #[serde(skip)]
    pub custom_rules: Vec<Arc<dyn FileRule>>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            allowed_categories: None,
            max_filename_length: 255,
            min_image_dimension: 10,
            check_dimensions: true,
            verify_signatures: true,
            scan_content: true,
            heuristic_severity: ScanSeverity::Warning,
            read_timeout_ms: 10_000,
            custom_rules: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules: Vec<&str> = self.custom_rules.iter().map(|r| r.name()).collect();
        f.debug_struct("ValidationOptions")
            .field("strict_mode", &self.strict_mode)
            .field("allowed_categories", &self.allowed_categories)
            .field("max_filename_length", &self.max_filename_length)
            .field("min_image_dimension", &self.min_image_dimension)
            .field("check_dimensions", &self.check_dimensions)
            .field("verify_signatures", &self.verify_signatures)
            .field("scan_content", &self.scan_content)
            .field("heuristic_severity", &self.heuristic_severity)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("custom_rules", &rules)
            .finish()
    }
}

impl ValidationOptions {
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: Arc<dyn FileRule>) -> Self {
        self.custom_rules.push(rule);
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_filename_length == 0 {
            problems.push("max_filename_length must be positive".to_string());
        }
        if self.read_timeout_ms == 0 {
            problems.push("read_timeout_ms must be positive".to_string());
        }
        if self.allowed_categories.as_ref().is_some_and(|c| c.is_empty()) {
            problems.push("allowed_categories must not be empty when set".to_string());
        }
        problems
    }
}

/// Accumulates issues while the stages run
struct Collector {
    strict: bool,
    verdict: FileVerdict,
}

impl Collector {
    fn new(name: &str, size: u64, strict: bool) -> Self {
        Self {
            strict,
            verdict: FileVerdict {
                file_name: name.to_string(),
                is_valid: false,
                errors: Vec::new(),
                warnings: Vec::new(),
                category: None,
                detected_mime: None,
                dimensions: None,
                size,
            },
        }
    }

    fn error(&mut self, code: RejectionCode, message: impl Into<String>) {
        self.verdict.errors.push(FileIssue::new(code, message));
    }

    fn warning(&mut self, code: RejectionCode, message: impl Into<String>) {
        self.verdict.warnings.push(FileIssue::new(code, message));
    }

    /// Whether the next stage should be skipped
    fn halted(&self) -> bool {
        !self.strict && !self.verdict.errors.is_empty()
    }

    fn finish(mut self) -> FileVerdict {
        self.verdict.is_valid = self.verdict.errors.is_empty();
        match self.verdict.first_error() {
            Some(issue) => warn!(
                file = %self.verdict.file_name,
                reason = %issue.code,
                errors = self.verdict.errors.len(),
                "File rejected"
            ),
            None => debug!(
                file = %self.verdict.file_name,
                category = ?self.verdict.category,
                warnings = self.verdict.warnings.len(),
                "File accepted"
            ),
        }
        self.verdict
    }
}

/// Name-level facts shared by every stage
struct Meta<'a> {
    name: &'a str,
    mime: String,
    extension: Option<String>,
    size: u64,
}

/// Validates uploads against the allowed types and signatures
#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    types: FileTypeTable,
    signatures: SignatureTable,
}

impl FileValidator {
    pub fn new(types: FileTypeTable, signatures: SignatureTable) -> Self {
        Self { types, signatures }
    }

    pub fn types(&self) -> &FileTypeTable {
        &self.types
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Validate content already in memory
    pub fn validate_bytes(
        &self,
        name: &str,
        declared_mime: &str,
        bytes: &[u8],
        options: &ValidationOptions,
    ) -> FileVerdict {
        let meta = Meta::new(name, declared_mime, bytes.len() as u64);
        let mut verdict = Collector::new(name, meta.size, options.strict_mode);

        let rule = self.check_metadata(&meta, options, &mut verdict);
        if !verdict.halted() && !denylisted(&verdict) {
            self.check_content(&meta, rule, bytes, options, &mut verdict);
        }
        verdict.finish()
    }

    /// Validate a file source, reading its content only when the metadata
    /// stages pass and the declared size is within the category limit
    pub async fn validate(&self, source: &dyn FileSource, options: &ValidationOptions) -> FileVerdict {
        let meta = Meta::new(source.name(), source.declared_mime(), source.size());
        let mut verdict = Collector::new(source.name(), meta.size, options.strict_mode);

        let rule = self.check_metadata(&meta, options, &mut verdict);
        if verdict.halted()
            || denylisted(&verdict)
            || verdict.verdict.has_error(RejectionCode::SizeExceeded)
        {
            return verdict.finish();
        }

        let bytes = match load_with_timeout(source, options.read_timeout()).await {
            Ok(bytes) => bytes,
            Err(Error::Timeout(limit)) => {
                verdict.error(
                    RejectionCode::ReadTimeout,
                    format!("reading the file took longer than {:?}", limit),
                );
                return verdict.finish();
            }
            Err(e) => {
                verdict.error(RejectionCode::UnreadableContent, format!("file could not be read: {}", e));
                return verdict.finish();
            }
        };

        // The source may have changed size since it was listed
        let actual = bytes.len() as u64;
        if actual != meta.size {
            verdict.verdict.size = actual;
            if let Some(rule) = rule {
                check_size(rule, actual, &mut verdict);
                if verdict.halted() {
                    return verdict.finish();
                }
            }
        }

        self.check_content(&meta, rule, &bytes, options, &mut verdict);
        verdict.finish()
    }

    /// Stages 1 to 3
    fn check_metadata(
        &self,
        meta: &Meta<'_>,
        options: &ValidationOptions,
        verdict: &mut Collector,
    ) -> Option<&FileTypeRule> {
        // Stage 1: denylist, never accumulated past
        if is_dangerous_filename(meta.name) {
            verdict.error(
                RejectionCode::DangerousExtension,
                format!("'{}' is a server configuration file", meta.name),
            );
            return None;
        }
        if let Some(ext) = meta.extension.as_deref().filter(|ext| is_dangerous_extension(ext)) {
            verdict.error(
                RejectionCode::DangerousExtension,
                format!("'.{}' files are not allowed", ext),
            );
            return None;
        }
        if is_dangerous_mime(&meta.mime) {
            verdict.error(
                RejectionCode::DangerousExtension,
                format!("'{}' content is not allowed", meta.mime),
            );
            return None;
        }

        // Stage 2: allowed types
        let rule = match self.types.match_file(meta.extension.as_deref(), &meta.mime) {
            Some(matched) => {
                let rule = matched.rule();
                if let TypeMatch::Extension(_) = matched {
                    if let Some(other) = self.types.match_file(None, &meta.mime) {
                        verdict.warning(
                            RejectionCode::TypeNotAllowed,
                            format!(
                                "extension suggests {} but declared type '{}' suggests {}",
                                rule.category,
                                meta.mime,
                                other.rule().category
                            ),
                        );
                    }
                }
                let allowed = options
                    .allowed_categories
                    .as_ref()
                    .is_none_or(|categories| categories.contains(&rule.category));
                if allowed {
                    verdict.verdict.category = Some(rule.category);
                    Some(rule)
                } else {
                    verdict.error(
                        RejectionCode::TypeNotAllowed,
                        format!("{} files are not accepted here", rule.category),
                    );
                    None
                }
            }
            None => {
                verdict.error(
                    RejectionCode::TypeNotAllowed,
                    format!(
                        "type '{}' with extension '{}' is not allowed",
                        meta.mime,
                        meta.extension.as_deref().unwrap_or("")
                    ),
                );
                None
            }
        };
        if verdict.halted() {
            return rule;
        }

        // Stage 3: size and name
        if meta.size == 0 {
            verdict.error(RejectionCode::UnreadableContent, "file is empty");
        } else if let Some(rule) = rule {
            check_size(rule, meta.size, verdict);
        }
        if verdict.halted() {
            return rule;
        }

        if meta.name.trim().is_empty() {
            verdict.error(RejectionCode::InvalidFilename, "file name is empty");
        } else if meta.name.chars().count() > options.max_filename_length {
            verdict.error(
                RejectionCode::InvalidFilename,
                format!("file name is longer than {} characters", options.max_filename_length),
            );
        }
        if !verdict.halted() && meta.name.contains('\0') {
            verdict.error(RejectionCode::InvalidFilename, "file name contains a NUL byte");
        }
        if !verdict.halted() && (meta.name.contains(['/', '\\']) || meta.name.contains("..")) {
            verdict.error(
                RejectionCode::InvalidFilename,
                "file name contains a path separator or traversal sequence",
            );
        }

        rule
    }

    /// Stages 4 to 7
    fn check_content(
        &self,
        meta: &Meta<'_>,
        rule: Option<&FileTypeRule>,
        bytes: &[u8],
        options: &ValidationOptions,
        verdict: &mut Collector,
    ) {
        let header = &bytes[..bytes.len().min(SIGNATURE_READ_LEN)];
        verdict.verdict.detected_mime = self.signatures.detect(header).map(str::to_string);

        // Stage 4: image dimensions
        if let Some(rule) = rule.filter(|r| r.category == FileCategory::Image) {
            if options.check_dimensions {
                match read_dimensions(bytes) {
                    Some((width, height)) => {
                        verdict.verdict.dimensions = Some((width, height));
                        let too_wide = rule.max_width.is_some_and(|max| width > max);
                        let too_tall = rule.max_height.is_some_and(|max| height > max);
                        if too_wide || too_tall {
                            verdict.error(
                                RejectionCode::DimensionExceeded,
                                format!(
                                    "image is {}x{}, larger than {}x{}",
                                    width,
                                    height,
                                    rule.max_width.unwrap_or(width),
                                    rule.max_height.unwrap_or(height)
                                ),
                            );
                        } else if width < options.min_image_dimension
                            || height < options.min_image_dimension
                        {
                            verdict.error(
                                RejectionCode::DimensionTooSmall,
                                format!(
                                    "image is {}x{}, smaller than {}x{}",
                                    width,
                                    height,
                                    options.min_image_dimension,
                                    options.min_image_dimension
                                ),
                            );
                        }
                    }
                    None => verdict.warning(
                        RejectionCode::UnreadableContent,
                        "image dimensions could not be read",
                    ),
                }
            }
        }
        if verdict.halted() {
            return;
        }

        // Stage 5: signature
        if options.verify_signatures {
            let mime = self.signature_mime(meta);
            if self.signatures.verify(&mime, header) == SignatureCheck::Mismatch {
                let detected = match &verdict.verdict.detected_mime {
                    Some(detected) => format!(" (looks like {})", detected),
                    None => String::new(),
                };
                verdict.error(
                    RejectionCode::SignatureMismatch,
                    format!("content does not match declared type '{}'{}", mime, detected),
                );
            }
        }
        if verdict.halted() {
            return;
        }

        // Stage 6: heuristics
        if options.scan_content {
            for finding in scan(meta.name, &meta.mime, meta.extension.as_deref(), bytes) {
                let message = format!("{} ({})", finding.message, finding.rule);
                match options.heuristic_severity {
                    ScanSeverity::Warning => verdict.warning(RejectionCode::HeuristicFlag, message),
                    ScanSeverity::Error => verdict.error(RejectionCode::HeuristicFlag, message),
                }
            }
        }
        if verdict.halted() {
            return;
        }

        // Stage 7: custom rules
        let input = FileInput {
            name: meta.name,
            mime: &meta.mime,
            extension: meta.extension.as_deref(),
            category: verdict.verdict.category,
            bytes,
        };
        for custom in &options.custom_rules {
            let outcome = custom.check(&input);
            for message in outcome.warnings {
                verdict.warning(RejectionCode::CustomRule, format!("{}: {}", custom.name(), message));
            }
            for message in outcome.errors {
                verdict.error(RejectionCode::CustomRule, format!("{}: {}", custom.name(), message));
            }
            if verdict.halted() {
                return;
            }
        }
    }

    /// Declared type, or the extension's type when the declared one has no
    /// registered signature (`application/octet-stream` uploads)
    fn signature_mime(&self, meta: &Meta<'_>) -> String {
        if self.signatures.is_registered(&meta.mime) {
            return meta.mime.clone();
        }
        meta.extension
            .as_deref()
            .and_then(mime_for_extension)
            .filter(|mime| self.signatures.is_registered(mime))
            .map(str::to_string)
            .unwrap_or_else(|| meta.mime.clone())
    }
}

impl<'a> Meta<'a> {
    fn new(name: &'a str, declared_mime: &str, size: u64) -> Self {
        Self {
            name,
            mime: normalize_mime(declared_mime),
            extension: extension_of(name),
            size,
        }
    }
}

fn denylisted(verdict: &Collector) -> bool {
    verdict.verdict.has_error(RejectionCode::DangerousExtension)
}

fn check_size(rule: &FileTypeRule, size: u64, verdict: &mut Collector) {
    if size > rule.max_size {
        verdict.error(
            RejectionCode::SizeExceeded,
            format!("{} bytes exceeds the {} limit of {} bytes", size, rule.category, rule.max_size),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::UploadedFile;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    fn validator() -> FileValidator {
        FileValidator::default()
    }

    #[test]
    fn test_spoofed_executable_is_rejected() {
        let verdict = validator().validate_bytes(
            "resume.exe",
            "application/pdf",
            b"%PDF-1.4 not really",
            &ValidationOptions::default(),
        );
        assert!(!verdict.is_valid);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension]);

        let err = verdict.into_result().unwrap_err();
        assert!(matches!(err, Error::FileRejected { reason: RejectionCode::DangerousExtension, .. }));
    }

    #[test]
    fn test_denylist_stops_even_in_strict_mode() {
        let verdict = validator().validate_bytes("shell.php", "image/png", &[], &ValidationOptions::strict());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension]);

        let verdict = validator().validate_bytes(".htaccess", "text/plain", b"x", &ValidationOptions::strict());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension]);

        let verdict = validator().validate_bytes("photo.jpg", "application/x-msdownload", b"MZ", &ValidationOptions::default());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension]);
    }

    #[test]
    fn test_trailing_dots_and_spaces_do_not_hide_extension() {
        let mut payload = png(100, 100);
        payload.extend_from_slice(b"<?php system($_GET['c']); ?>");

        for name in ["shell.php.", "shell.php ", "run.exe.", "shell.pHp . "] {
            for options in [ValidationOptions::default(), ValidationOptions::strict()] {
                let verdict = validator().validate_bytes(name, "image/png", &payload, &options);
                assert!(!verdict.is_valid, "{:?} was accepted", name);
                assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension], "{:?}", name);
            }
        }
    }

    #[test]
    fn test_signature_mismatch() {
        let verdict = validator().validate_bytes(
            "photo.jpg",
            "image/jpeg",
            b"GIF89a\x40\x00\x40\x00\x00\x00\x00",
            &ValidationOptions::default(),
        );
        assert!(!verdict.is_valid);
        assert!(verdict.has_error(RejectionCode::SignatureMismatch));
        assert_eq!(verdict.detected_mime.as_deref(), Some("image/gif"));
    }

    #[test]
    fn test_valid_jpeg_without_readable_dimensions_warns() {
        let verdict = validator().validate_bytes("photo.jpg", "image/jpeg", JPEG_HEADER, &ValidationOptions::default());
        assert!(verdict.is_valid, "{:?}", verdict.errors);
        assert_eq!(verdict.category, Some(FileCategory::Image));
        assert_eq!(verdict.warnings[0].code, RejectionCode::UnreadableContent);
    }

    #[test]
    fn test_image_dimensions() {
        let options = ValidationOptions::default();

        let verdict = validator().validate_bytes("ok.png", "image/png", &png(800, 600), &options);
        assert!(verdict.is_valid);
        assert_eq!(verdict.dimensions, Some((800, 600)));

        let verdict = validator().validate_bytes("huge.png", "image/png", &png(5000, 100), &options);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DimensionExceeded]);

        let verdict = validator().validate_bytes("pixel.png", "image/png", &png(1, 1), &options);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DimensionTooSmall]);
    }

    #[test]
    fn test_type_not_allowed() {
        let verdict = validator().validate_bytes("data.xyz", "application/x-unknown", b"abc", &ValidationOptions::default());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::TypeNotAllowed]);
        assert_eq!(verdict.category, None);

        let options = ValidationOptions {
            allowed_categories: Some(vec![FileCategory::Image]),
            ..Default::default()
        };
        let verdict = validator().validate_bytes("doc.pdf", "application/pdf", b"%PDF-1.4", &options);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::TypeNotAllowed]);
    }

    #[test]
    fn test_size_limits() {
        let mut types = FileTypeTable::default();
        types.rules.iter_mut().for_each(|r| r.max_size = 16);
        let validator = FileValidator::new(types, SignatureTable::default());

        let verdict = validator.validate_bytes("notes.txt", "text/plain", &[b'a'; 17], &ValidationOptions::default());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::SizeExceeded]);

        let verdict = validator.validate_bytes("notes.txt", "text/plain", &[], &ValidationOptions::default());
        assert_eq!(verdict.error_codes(), vec![RejectionCode::UnreadableContent]);
    }

    #[test]
    fn test_strict_mode_accumulates() {
        let name = format!("{}..txt", "n".repeat(300));
        let body = b"<script>alert(1)</script>";

        let lenient = validator().validate_bytes(&name, "text/plain", body, &ValidationOptions::default());
        assert_eq!(lenient.errors.len(), 1);

        let strict = ValidationOptions {
            heuristic_severity: ScanSeverity::Error,
            ..ValidationOptions::strict()
        };
        let verdict = validator().validate_bytes(&name, "text/plain", body, &strict);
        let codes = verdict.error_codes();
        assert_eq!(codes.iter().filter(|c| **c == RejectionCode::InvalidFilename).count(), 2);
        assert!(codes.contains(&RejectionCode::HeuristicFlag));
    }

    #[test]
    fn test_heuristic_severity() {
        let body = b"hello <iframe src=x></iframe>";
        let verdict = validator().validate_bytes("note.txt", "text/plain", body, &ValidationOptions::default());
        assert!(verdict.is_valid);
        assert_eq!(verdict.warnings[0].code, RejectionCode::HeuristicFlag);

        let options = ValidationOptions {
            heuristic_severity: ScanSeverity::Error,
            ..Default::default()
        };
        let verdict = validator().validate_bytes("note.txt", "text/plain", body, &options);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::HeuristicFlag]);
    }

    #[test]
    fn test_octet_stream_uses_extension_signature() {
        let verdict = validator().validate_bytes(
            "report.pdf",
            "application/octet-stream",
            b"PK\x03\x04 zipped",
            &ValidationOptions::default(),
        );
        assert!(verdict.has_error(RejectionCode::SignatureMismatch));
    }

    #[test]
    fn test_extension_and_mime_disagree_warns() {
        let verdict = validator().validate_bytes("clip.mp4", "audio/mpeg", b"\x00\x00\x00\x18ftypmp42", &ValidationOptions::default());
        assert!(verdict.warnings.iter().any(|w| w.code == RejectionCode::TypeNotAllowed));
        assert_eq!(verdict.category, Some(FileCategory::Video));
    }

    struct NoEmptyLines;

    impl FileRule for NoEmptyLines {
        fn name(&self) -> &str {
            "no-empty-lines"
        }

        fn check(&self, input: &FileInput<'_>) -> RuleOutcome {
            if input.bytes.windows(2).any(|w| w == b"\n\n") {
                RuleOutcome::error("blank lines are not allowed")
            } else {
                RuleOutcome::warning("checked")
            }
        }
    }

    #[test]
    fn test_custom_rules_run_last() {
        let options = ValidationOptions::default().with_rule(Arc::new(NoEmptyLines));

        let verdict = validator().validate_bytes("a.txt", "text/plain", b"one\n\ntwo", &options);
        assert_eq!(verdict.error_codes(), vec![RejectionCode::CustomRule]);
        assert!(verdict.errors[0].message.starts_with("no-empty-lines:"));

        let verdict = validator().validate_bytes("a.txt", "text/plain", b"one\ntwo", &options);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warnings[0].code, RejectionCode::CustomRule);
    }

    #[test]
    fn test_deterministic() {
        let options = ValidationOptions::strict();
        let bytes = png(4000, 5000);
        let first = validator().validate_bytes("scan.final.png", "image/png", &bytes, &options);
        let second = validator().validate_bytes("scan.final.png", "image/png", &bytes, &options);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_async_matches_bytes_path() {
        let validator = validator();
        let options = ValidationOptions::default();
        let file = UploadedFile::new("photo.jpg", "image/jpeg", b"not a jpeg".to_vec());

        let from_source = validator.validate(&file, &options).await;
        let from_bytes = validator.validate_bytes("photo.jpg", "image/jpeg", b"not a jpeg", &options);
        assert_eq!(from_source, from_bytes);
        assert!(from_source.has_error(RejectionCode::SignatureMismatch));
    }

    struct Oversized;

    #[async_trait::async_trait]
    impl FileSource for Oversized {
        fn name(&self) -> &str {
            "movie.mp4"
        }

        fn declared_mime(&self) -> &str {
            "video/mp4"
        }

        fn size(&self) -> u64 {
            u64::MAX
        }

        async fn read_all(&self) -> Result<Vec<u8>> {
            Err(Error::Internal("oversized content must not be read".into()))
        }
    }

    #[tokio::test]
    async fn test_oversized_source_is_never_read() {
        let verdict = validator().validate(&Oversized, &ValidationOptions::strict()).await;
        assert_eq!(verdict.error_codes(), vec![RejectionCode::SizeExceeded]);
    }

    #[test]
    fn test_options_from_json() {
        let options: ValidationOptions =
            serde_json::from_str(r#"{"strict_mode": true, "heuristic_severity": "error"}"#).unwrap();
        assert!(options.strict_mode);
        assert_eq!(options.heuristic_severity, ScanSeverity::Error);
        assert_eq!(options.max_filename_length, 255);
        assert!(options.problems().is_empty());
    }
}
