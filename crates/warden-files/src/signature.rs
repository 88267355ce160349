//! Magic-byte signatures per MIME type
//!
//! Only the first [`SIGNATURE_READ_LEN`] bytes of a file are consulted. A
//! MIME type without a registered signature (plain text, CSV ...) cannot be
//! verified and is passed through.

use std::collections::HashMap;

/// Bytes of file header consulted for signature checks
pub const SIGNATURE_READ_LEN: usize = 32;

/// One file signature: every part must match at its offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    parts: Vec<(usize, Vec<u8>)>,
}

impl Signature {
    /// Signature matched at the start of the file
    pub fn prefix(bytes: &[u8]) -> Self {
        Self::at(0, bytes)
    }

    /// Signature matched at a fixed offset
    pub fn at(offset: usize, bytes: &[u8]) -> Self {
        Self {
            parts: vec![(offset, bytes.to_vec())],
        }
    }

    /// Add another part that must also match
    pub fn and(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.parts.push((offset, bytes.to_vec()));
        self
    }

    pub fn matches(&self, header: &[u8]) -> bool {
        let header = &header[..header.len().min(SIGNATURE_READ_LEN)];
        self.parts.iter().all(|(offset, bytes)| {
            header
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice())
        })
    }
}

/// Result of checking a header against the declared MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// One of the registered signatures matched
    Matched,
    /// Signatures are registered but none matched
    Mismatch,
    /// No signature is registered for the MIME type
    Unregistered,
}

/// MIME type → accepted signatures
#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: HashMap<String, Vec<Signature>>,
    /// Registration order, for deterministic detection
    order: Vec<String>,
}

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY: &[u8] = b"PK\x05\x06";

impl Default for SignatureTable {
    fn default() -> Self {
        let mut table = Self::empty();

        table.register_all(&["image/jpeg", "image/jpg", "image/pjpeg"], vec![Signature::prefix(JPEG)]);
        table.register("image/png", vec![Signature::prefix(PNG)]);
        table.register(
            "image/gif",
            vec![Signature::prefix(b"GIF87a"), Signature::prefix(b"GIF89a")],
        );
        table.register("image/webp", vec![Signature::prefix(b"RIFF").and(8, b"WEBP")]);
        table.register_all(&["image/bmp", "image/x-ms-bmp"], vec![Signature::prefix(b"BM")]);
        table.register(
            "image/tiff",
            vec![Signature::prefix(b"II*\0"), Signature::prefix(b"MM\0*")],
        );

        table.register("application/pdf", vec![Signature::prefix(b"%PDF")]);
        table.register("application/rtf", vec![Signature::prefix(b"{\\rtf")]);
        table.register_all(
            &[
                "application/zip",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ],
            vec![Signature::prefix(ZIP), Signature::prefix(ZIP_EMPTY)],
        );
        table.register_all(
            &[
                "application/msword",
                "application/vnd.ms-excel",
                "application/vnd.ms-powerpoint",
            ],
            vec![Signature::prefix(OLE)],
        );

        table.register_all(
            &["video/mp4", "audio/mp4", "audio/x-m4a", "audio/m4a"],
            vec![Signature::at(4, b"ftyp")],
        );
        table.register(
            "video/quicktime",
            vec![
                Signature::at(4, b"ftyp"),
                Signature::at(4, b"moov"),
                Signature::at(4, b"mdat"),
                Signature::at(4, b"wide"),
                Signature::at(4, b"free"),
            ],
        );
        table.register_all(&["video/webm", "audio/webm"], vec![Signature::prefix(EBML)]);
        table.register(
            "video/mpeg",
            vec![
                Signature::prefix(&[0x00, 0x00, 0x01, 0xBA]),
                Signature::prefix(&[0x00, 0x00, 0x01, 0xB3]),
            ],
        );
        table.register(
            "video/x-msvideo",
            vec![Signature::prefix(b"RIFF").and(8, b"AVI ")],
        );

        table.register(
            "audio/mpeg",
            vec![
                Signature::prefix(b"ID3"),
                Signature::prefix(&[0xFF, 0xFB]),
                Signature::prefix(&[0xFF, 0xF3]),
                Signature::prefix(&[0xFF, 0xF2]),
            ],
        );
        table.register_all(
            &["audio/wav", "audio/x-wav", "audio/wave"],
            vec![Signature::prefix(b"RIFF").and(8, b"WAVE")],
        );
        table.register_all(&["audio/ogg", "video/ogg"], vec![Signature::prefix(b"OggS")]);
        table.register_all(&["audio/flac", "audio/x-flac"], vec![Signature::prefix(b"fLaC")]);

        table
    }
}

impl SignatureTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register (or replace) the signatures of a MIME type
    pub fn register(&mut self, mime: &str, signatures: Vec<Signature>) {
        let mime = mime.to_ascii_lowercase();
        if !self.entries.contains_key(&mime) {
            self.order.push(mime.clone());
        }
        self.entries.insert(mime, signatures);
    }

    fn register_all(&mut self, mimes: &[&str], signatures: Vec<Signature>) {
        for mime in mimes {
            self.register(mime, signatures.clone());
        }
    }

    pub fn is_registered(&self, mime: &str) -> bool {
        self.entries.contains_key(&normalize_mime(mime))
    }

    /// Check a header against the declared MIME type
    pub fn verify(&self, mime: &str, header: &[u8]) -> SignatureCheck {
        match self.entries.get(&normalize_mime(mime)) {
            None => SignatureCheck::Unregistered,
            Some(signatures) if signatures.iter().any(|s| s.matches(header)) => {
                SignatureCheck::Matched
            }
            Some(_) => SignatureCheck::Mismatch,
        }
    }

    /// First registered MIME type whose signature matches the header
    pub fn detect(&self, header: &[u8]) -> Option<&str> {
        self.order
            .iter()
            .find(|mime| {
                self.entries
                    .get(*mime)
                    .is_some_and(|sigs| sigs.iter().any(|s| s.matches(header)))
            })
            .map(String::as_str)
    }
}

/// Lowercase, with parameters such as `; charset=utf-8` removed
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
