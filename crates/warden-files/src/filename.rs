//! Storage names for uploaded files
//!
//! A generated name contains only `[A-Za-z0-9_-]` plus one `.` before the
//! extension, so it can never traverse a path. The timestamp and random
//! suffix keep concurrently uploaded files with the same original name
//! apart.

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::types::extension_of;

/// Length of the random suffix
pub const RANDOM_SUFFIX_LEN: usize = 8;

/// Longest extension carried over from the original name
const MAX_EXTENSION_LEN: usize = 16;

/// Shortest accepted `max_length`: the longest tail (`_` + 13-digit
/// millisecond timestamp, `_` + random suffix, `.` + extension) plus a
/// four-character stem
pub const MIN_LENGTH: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureFilenameOptions {
    /// Cap on the whole generated name
    pub max_length: usize,
    /// Append the upload time in milliseconds
    pub timestamp: bool,
    /// Append a random lowercase alphanumeric suffix
    pub random_suffix: bool,
}

impl SecureFilenameOptions {
    /// Everything wrong with these options
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_length < MIN_LENGTH {
            problems.push(format!(
                "filenames.max_length {} is below the minimum of {}",
                self.max_length, MIN_LENGTH
            ));
        }
        problems
    }
}

impl Default for SecureFilenameOptions {
    fn default() -> Self {
        Self {
            max_length: 100,
            timestamp: true,
            random_suffix: true,
        }
    }
}

/// Generate a storage name stamped with the current time
pub fn generate_secure_filename(original: &str, options: &SecureFilenameOptions) -> String {
    generate_secure_filename_at(original, options, Utc::now())
}

/// Generate a storage name stamped with the given time
///
/// The result never exceeds `max_length`, which is raised to
/// [`MIN_LENGTH`] when set lower.
pub fn generate_secure_filename_at(
    original: &str,
    options: &SecureFilenameOptions,
    now: DateTime<Utc>,
) -> String {
    let base_name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    let extension = extension_of(base_name)
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .take(MAX_EXTENSION_LEN)
                .collect::<String>()
        })
        .filter(|ext| !ext.is_empty());

    let stem = match &extension {
        Some(_) => base_name.rsplit_once('.').map_or(base_name, |(stem, _)| stem),
        None => base_name,
    };

    let mut suffix = String::new();
    if options.timestamp {
        suffix.push('_');
        suffix.push_str(&now.timestamp_millis().to_string());
    }
    if options.random_suffix {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        suffix.push('_');
        suffix.push_str(&random);
    }
    let tail = match &extension {
        Some(ext) => format!("{}.{}", suffix, ext),
        None => suffix,
    };

    let max_length = options.max_length.max(MIN_LENGTH);
    let room = max_length.saturating_sub(tail.len());

    let mut base = clean_stem(stem);
    base.truncate(room);
    let base = base.trim_end_matches('_');
    let base = if base.is_empty() { "file" } else { base };

    format!("{}{}", base, tail)
}

/// Map everything outside `[A-Za-z0-9_-]` to `_` and collapse runs of `_`
fn clean_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_report_name() {
        let name = generate_secure_filename("My Report (Final).docx", &SecureFilenameOptions::default());
        assert!(name.len() <= 100);
        assert!(name.ends_with(".docx"));
        assert!(!name.contains(' '));
        assert!(!name.contains('(') && !name.contains(')'));
        assert!(name.starts_with("My_Report_Final_"));
    }

    #[test]
    fn test_layout() {
        let name = generate_secure_filename_at("photo.JPG", &SecureFilenameOptions::default(), fixed_time());
        let rest = name.strip_prefix("photo_1700000000123_").unwrap();
        let (random, ext) = rest.split_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(random.len(), RANDOM_SUFFIX_LEN);
        assert!(random.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_no_traversal() {
        let options = SecureFilenameOptions {
            random_suffix: false,
            ..Default::default()
        };
        let name = generate_secure_filename_at("../../etc/passwd", &options, fixed_time());
        assert_eq!(name, "passwd_1700000000123");

        let name = generate_secure_filename_at("..\\..\\boot.ini", &options, fixed_time());
        assert_eq!(name, "boot_1700000000123.ini");

        let name = generate_secure_filename_at("...", &options, fixed_time());
        assert!(!name.contains(".."));
        assert!(name.starts_with("file_"));
    }

    #[test]
    fn test_long_names_are_capped() {
        let original = format!("{}.pdf", "a".repeat(500));
        let options = SecureFilenameOptions {
            max_length: 60,
            ..Default::default()
        };
        let name = generate_secure_filename(&original, &options);
        assert_eq!(name.len(), 60);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_length_floor() {
        let options = SecureFilenameOptions {
            max_length: 10,
            ..Default::default()
        };
        assert_eq!(options.problems().len(), 1);
        assert!(SecureFilenameOptions::default().problems().is_empty());

        let long = format!("{}.abcdefghijklmnopqrstuvwxyz", "b".repeat(200));
        let name = generate_secure_filename(&long, &options);
        assert!(name.len() <= MIN_LENGTH, "{} is {} bytes", name, name.len());
        assert!(name.ends_with(".abcdefghijklmnop"));

        let exact = SecureFilenameOptions {
            max_length: MIN_LENGTH,
            ..Default::default()
        };
        for original in ["", "...", "x", long.as_str()] {
            assert!(generate_secure_filename(original, &exact).len() <= MIN_LENGTH);
        }
    }

    #[test]
    fn test_trailing_dots_are_dropped() {
        let options = SecureFilenameOptions {
            timestamp: false,
            random_suffix: false,
            ..Default::default()
        };
        assert_eq!(generate_secure_filename_at("shell.php. ", &options, fixed_time()), "shell.php");
    }

    #[test]
    fn test_unique_names() {
        let options = SecureFilenameOptions::default();
        let a = generate_secure_filename_at("same.png", &options, fixed_time());
        let b = generate_secure_filename_at("same.png", &options, fixed_time());
        assert_ne!(a, b);
    }

    #[test]
    fn test_plain_name() {
        let options = SecureFilenameOptions {
            timestamp: false,
            random_suffix: false,
            ..Default::default()
        };
        assert_eq!(generate_secure_filename_at("Été à Paris.png", &options, fixed_time()), "t_Paris.png");
        assert_eq!(generate_secure_filename_at("", &options, fixed_time()), "file");
    }
}
