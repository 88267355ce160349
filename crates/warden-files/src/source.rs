//! Where upload bytes come from
//!
//! The validator only needs a name, a declared MIME type, a size and,
//! when it gets that far, the content. Reading the content is the one
//! suspension point in validation and is bounded by a read timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use warden_core::{Error, Result};

use crate::types::{extension_of, mime_for_extension};

/// MIME type assumed when nothing better is known
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// A file offered for validation
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Name as supplied by the uploader
    fn name(&self) -> &str;

    /// MIME type as declared by the uploader
    fn declared_mime(&self) -> &str;

    /// Size in bytes, known without reading the content
    fn size(&self) -> u64;

    /// Full content
    async fn read_all(&self) -> Result<Vec<u8>>;
}

/// Read a source's content, failing with [`Error::Timeout`] past `limit`
pub async fn load_with_timeout(source: &dyn FileSource, limit: Duration) -> Result<Vec<u8>> {
    match tokio::time::timeout(limit, source.read_all()).await {
        Ok(result) => result,
        Err(_) => {
            warn!(file = %source.name(), timeout = ?limit, "File read timed out");
            Err(Error::Timeout(limit))
        }
    }
}

/// An upload already held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl FileSource for UploadedFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_mime(&self) -> &str {
        &self.mime
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// A file on local disk; its MIME type is guessed from the extension
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    mime: String,
    size: u64,
}

impl DiskFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = extension_of(&name)
            .and_then(|ext| mime_for_extension(&ext))
            .unwrap_or(DEFAULT_MIME)
            .to_string();

        Ok(Self {
            path,
            name,
            mime,
            size: metadata.len(),
        })
    }

    /// Override the guessed MIME type
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_mime(&self) -> &str {
        &self.mime
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct StalledFile;

    #[async_trait]
    impl FileSource for StalledFile {
        fn name(&self) -> &str {
            "stalled.txt"
        }

        fn declared_mime(&self) -> &str {
            "text/plain"
        }

        fn size(&self) -> u64 {
            10
        }

        async fn read_all(&self) -> Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_uploaded_file() {
        let file = UploadedFile::new("a.txt", "text/plain", b"hello".to_vec());
        assert_eq!(file.size(), 5);
        let bytes = load_with_timeout(&file, Duration::from_secs(1)).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_disk_file() {
        let mut temp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        temp.write_all(b"\x89PNG\r\n\x1a\n").unwrap();

        let file = DiskFile::open(temp.path()).await.unwrap();
        assert_eq!(file.declared_mime(), "image/png");
        assert_eq!(file.size(), 8);
        assert!(file.name().ends_with(".png"));
        assert_eq!(file.read_all().await.unwrap().len(), 8);

        let plain = NamedTempFile::new().unwrap();
        let file = DiskFile::open(plain.path()).await.unwrap();
        assert_eq!(file.declared_mime(), DEFAULT_MIME);
    }

    #[tokio::test]
    async fn test_disk_file_missing_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DiskFile::open(dir.path()).await.is_err());
        assert!(DiskFile::open(dir.path().join("missing.txt")).await.is_err());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let err = load_with_timeout(&StalledFile, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(err.status_code(), 408);
    }
}
