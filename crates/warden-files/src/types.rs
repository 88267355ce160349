//! Allowed file types per category
//!
//! The table is external configuration: extensions, MIME types and size
//! limits per [`FileCategory`], plus image dimension limits. Durations for
//! audio and video are advisory and never verified here.

use crate::signature::normalize_mime;
use serde::{Deserialize, Serialize};
use warden_core::FileCategory;

const MB: u64 = 1024 * 1024;

/// Constraints for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeRule {
    pub category: FileCategory,
    /// Lowercase extensions without the leading dot
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    /// Maximum size in bytes
    pub max_size: u64,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    /// Advisory only
    #[serde(default)]
    pub max_duration_secs: Option<u32>,
}

impl FileTypeRule {
    fn new(category: FileCategory, extensions: &[&str], mime_types: &[&str], max_size: u64) -> Self {
        Self {
            category,
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            mime_types: mime_types.iter().map(|s| s.to_string()).collect(),
            max_size,
            max_width: None,
            max_height: None,
            max_duration_secs: None,
        }
    }

    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn matches_mime(&self, mime: &str) -> bool {
        let mime = normalize_mime(mime);
        self.mime_types.iter().any(|m| m.eq_ignore_ascii_case(&mime))
    }
}

/// How a file was matched against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMatch<'a> {
    /// Extension and MIME type agree on one rule
    Both(&'a FileTypeRule),
    /// Only the extension matched; the MIME type is unknown or points elsewhere
    Extension(&'a FileTypeRule),
    /// Only the declared MIME type matched
    Mime(&'a FileTypeRule),
}

impl<'a> TypeMatch<'a> {
    pub fn rule(&self) -> &'a FileTypeRule {
        match self {
            TypeMatch::Both(rule) | TypeMatch::Extension(rule) | TypeMatch::Mime(rule) => rule,
        }
    }
}

/// The allowed types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypeTable {
    pub rules: Vec<FileTypeRule>,
}

impl Default for FileTypeTable {
    fn default() -> Self {
        let mut image = FileTypeRule::new(
            FileCategory::Image,
            &["jpg", "jpeg", "png", "gif", "webp", "bmp"],
            &["image/jpeg", "image/jpg", "image/pjpeg", "image/png", "image/gif", "image/webp", "image/bmp"],
            10 * MB,
        );
        image.max_width = Some(4096);
        image.max_height = Some(4096);

        let mut video = FileTypeRule::new(
            FileCategory::Video,
            &["mp4", "mov", "webm", "mpeg", "mpg", "avi"],
            &["video/mp4", "video/quicktime", "video/webm", "video/mpeg", "video/x-msvideo"],
            100 * MB,
        );
        video.max_duration_secs = Some(600);

        let document = FileTypeRule::new(
            FileCategory::Document,
            &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "rtf"],
            &[
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "text/plain",
                "text/csv",
                "application/rtf",
            ],
            25 * MB,
        );

        let mut audio = FileTypeRule::new(
            FileCategory::Audio,
            &["mp3", "wav", "ogg", "m4a", "flac"],
            &["audio/mpeg", "audio/wav", "audio/x-wav", "audio/wave", "audio/ogg", "audio/mp4", "audio/x-m4a", "audio/flac"],
            50 * MB,
        );
        audio.max_duration_secs = Some(600);

        Self {
            rules: vec![image, video, document, audio],
        }
    }
}

impl FileTypeTable {
    /// Keep only the given categories
    pub fn only(mut self, categories: &[FileCategory]) -> Self {
        self.rules.retain(|r| categories.contains(&r.category));
        self
    }

    pub fn rule(&self, category: FileCategory) -> Option<&FileTypeRule> {
        self.rules.iter().find(|r| r.category == category)
    }

    /// Match by extension OR declared MIME type, preferring a rule both agree on
    pub fn match_file(&self, extension: Option<&str>, mime: &str) -> Option<TypeMatch<'_>> {
        let by_extension = extension.and_then(|ext| self.rules.iter().find(|r| r.matches_extension(ext)));

        if let Some(rule) = by_extension {
            if rule.matches_mime(mime) {
                return Some(TypeMatch::Both(rule));
            }
        }
        if let Some(ext) = extension {
            if let Some(rule) = self
                .rules
                .iter()
                .find(|r| r.matches_extension(ext) && r.matches_mime(mime))
            {
                return Some(TypeMatch::Both(rule));
            }
        }

        by_extension
            .map(TypeMatch::Extension)
            .or_else(|| self.rules.iter().find(|r| r.matches_mime(mime)).map(TypeMatch::Mime))
    }

    /// Every invalid entry, reported together
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for rule in &self.rules {
            if rule.max_size == 0 {
                problems.push(format!("{} max_size must be positive", rule.category));
            }
            if rule.extensions.is_empty() && rule.mime_types.is_empty() {
                problems.push(format!("{} has no extensions or MIME types", rule.category));
            }
            for ext in &rule.extensions {
                if ext.starts_with('.') || ext.is_empty() {
                    problems.push(format!("{} extension '{}' must not be empty or start with '.'", rule.category, ext));
                }
            }
        }
        for category in FileCategory::ALL {
            if self.rules.iter().filter(|r| r.category == category).count() > 1 {
                problems.push(format!("{} is declared more than once", category));
            }
        }
        problems
    }
}

/// Final extension of a file name, lowercased
///
/// Trailing dots and whitespace are ignored, since many filesystems drop
/// them on write and `shell.php.` lands on disk as `shell.php`.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let base = base.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() && !base.starts_with('.') || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Best-effort MIME type for a known extension
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mpeg" | "mpg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "rtf" => "application/rtf",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "exe" | "dll" => "application/x-msdownload",
        "sh" => "application/x-sh",
        "php" => "application/x-php",
        "js" => "text/javascript",
        _ => return None,
    };
    Some(mime)
}
