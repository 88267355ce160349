//! Plain-string sanitizers: text, email, URL, filename and SQL

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;
use warden_core::{Error, Result};

/// Filenames are capped at this many bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// RFC 5321 upper bound on an address
pub const MAX_EMAIL_LENGTH: usize = 254;

static SQL_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:select|insert|update|delete|drop|create|alter|truncate|exec|execute|union|grant|revoke|merge|declare|shutdown|xp_\w+|sp_\w+)\b",
    )
    .expect("valid SQL keyword pattern")
});

static SQL_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--|/\*|\*/|#").expect("valid SQL comment pattern"));

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace pattern"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank line pattern"));

/// Options for the `text` context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Hard cap in characters, applied after trimming
    pub max_length: usize,
    /// Keep line breaks; otherwise they become spaces
    pub allow_newlines: bool,
    /// Collapse runs of spaces and of blank lines
    pub collapse_whitespace: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            allow_newlines: true,
            collapse_whitespace: false,
        }
    }
}

impl TextOptions {
    /// Single-line field such as a title or a name
    pub fn single_line(max_length: usize) -> Self {
        Self {
            max_length,
            allow_newlines: false,
            collapse_whitespace: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::Configuration("text max_length must be positive".into()));
        }
        Ok(())
    }
}

/// Options for the `url` context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlOptions {
    pub allowed_schemes: Vec<String>,
}

impl Default for UrlOptions {
    fn default() -> Self {
        Self {
            allowed_schemes: vec![
                "http".to_string(),
                "https".to_string(),
                "mailto".to_string(),
                "tel".to_string(),
            ],
        }
    }
}

impl UrlOptions {
    pub fn validate(&self) -> Result<()> {
        if self.allowed_schemes.is_empty() {
            return Err(Error::Configuration("url allowed_schemes is empty".into()));
        }
        for scheme in &self.allowed_schemes {
            let lower = scheme.to_ascii_lowercase();
            if matches!(lower.as_str(), "javascript" | "vbscript" | "data" | "file") {
                return Err(Error::Configuration(format!(
                    "url scheme '{}' cannot be allowed",
                    scheme
                )));
            }
        }
        Ok(())
    }
}

/// Invisible formatting characters used to disguise text
fn is_invisible_format(c: char) -> bool {
    matches!(c,
        '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{2066}'..='\u{2069}'
        | '\u{FEFF}')
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Strip control characters, normalize line breaks, trim and truncate
pub fn sanitize_text(input: &str, options: &TextOptions) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        match c {
            '\n' if options.allow_newlines => out.push('\n'),
            '\n' | '\t' => out.push(' '),
            c if c.is_control() || is_invisible_format(c) => {}
            c => out.push(c),
        }
    }

    if options.collapse_whitespace {
        out = HORIZONTAL_SPACE.replace_all(&out, " ").into_owned();
        out = BLANK_LINES.replace_all(&out, "\n\n").into_owned();
    }

    let trimmed = out.trim();
    truncate_chars(trimmed, options.max_length).trim_end().to_string()
}

/// Lowercase, trim and restrict to `[A-Za-z0-9_@.-]`
pub fn sanitize_email(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '.' | '-'))
        .take(MAX_EMAIL_LENGTH)
        .collect()
}

/// Re-serialized URL, or an empty string if it does not parse or uses a
/// scheme outside the allow-list
pub fn sanitize_url(input: &str, options: &UrlOptions) -> String {
    let cleaned: String = input.trim().chars().filter(|c| !c.is_control()).collect();

    match Url::parse(&cleaned) {
        Ok(url)
            if options
                .allowed_schemes
                .iter()
                .any(|s| s.eq_ignore_ascii_case(url.scheme())) =>
        {
            url.to_string()
        }
        _ => String::new(),
    }
}

/// Path-safe file name
///
/// Separators and reserved characters become `_`, `..` sequences are removed
/// until none remain, leading dots are stripped and the result is capped at
/// [`MAX_FILENAME_BYTES`] by shortening the base name before the extension.
pub fn sanitize_filename(input: &str) -> String {
    let mut name: String = input
        .chars()
        .filter(|c| !c.is_control() && !is_invisible_format(*c))
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();

    while name.contains("..") {
        name = name.replace("..", "");
    }

    let name = name
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end();
    if name.is_empty() {
        return "unnamed".to_string();
    }

    truncate_preserving_extension(name, MAX_FILENAME_BYTES)
}

/// Shorten `name` to at most `max_bytes`, cutting the base name first
pub fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let (base, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= 16 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let room = max_bytes.saturating_sub(ext.len());
    let mut cut = room.min(base.len());
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &base[..cut], ext)
}

/// Best-effort removal of SQL keywords, comment markers and quotes.
///
/// Defense in depth only; queries must still be parameterized.
pub fn sanitize_sql(input: &str) -> String {
    let mut current: String = input
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`' | ';' | '\\') && !c.is_control())
        .collect();

    loop {
        let next = SQL_COMMENTS.replace_all(&current, " ");
        let next = SQL_KEYWORDS.replace_all(&next, " ").into_owned();
        if next == current {
            break;
        }
        current = next;
    }

    current.split_whitespace().collect::<Vec<_>>().join(" ")
}
