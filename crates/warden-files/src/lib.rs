//! Warden Files
//!
//! Upload validation for the security core. Every file goes through the
//! same staged pipeline and gets a [`FileVerdict`]; batches are validated
//! under a fixed concurrency cap.
//!
//! # Modules
//!
//! - `signature`: magic-byte table keyed by MIME type
//! - `types`: allowed extensions, MIME types and limits per category
//! - `denylist`: executables, scripts and server config files
//! - `image`: pixel dimensions from image headers
//! - `scan`: heuristic pattern scan (not antivirus)
//! - `filename`: collision-free, path-safe storage names
//! - `source`: in-memory and on-disk upload sources
//! - `validator`: the per-file pipeline
//! - `batch`: capped batch execution and summaries

pub mod batch;
pub mod denylist;
pub mod filename;
pub mod image;
pub mod scan;
pub mod signature;
pub mod source;
pub mod types;
pub mod validator;

pub use batch::{BatchExecutor, BatchIssue, BatchLimits, BatchSummary};
pub use filename::{
    MIN_LENGTH as MIN_FILENAME_LENGTH, SecureFilenameOptions, generate_secure_filename,
    generate_secure_filename_at,
};
pub use image::read_dimensions;
pub use scan::{ScanFinding, ScanSeverity};
pub use signature::{SIGNATURE_READ_LEN, Signature, SignatureCheck, SignatureTable};
pub use source::{DiskFile, FileSource, UploadedFile, load_with_timeout};
pub use types::{FileTypeRule, FileTypeTable, TypeMatch, mime_for_extension};
pub use validator::{
    FileInput, FileIssue, FileRule, FileValidator, FileVerdict, RuleOutcome, ValidationOptions,
};
