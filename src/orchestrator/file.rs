//! The file a task will upload, and the client-side acceptance rule.

use crate::error::ClientError;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Where the bytes of a [`SelectedFile`] live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Memory(Vec<u8>),
    /// Read lazily at upload time.
    Path(PathBuf),
}

/// A file picked for conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    /// Display name; sent as the multipart file name.
    pub name: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Size in bytes.
    pub size: u64,
    #[serde(skip)]
    pub source: FileSource,
}

impl SelectedFile {
    /// Describe a file on disk.
    ///
    /// Reads metadata and the first four bytes; the content type is set to
    /// `application/pdf` only when the file starts with `%PDF`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let map_io = |e: std::io::Error| match e.kind() {
            ErrorKind::PermissionDenied => ClientError::PermissionDenied { path: path.clone() },
            _ => ClientError::FileNotFound { path: path.clone() },
        };

        let meta = tokio::fs::metadata(&path).await.map_err(map_io)?;
        if !meta.is_file() {
            return Err(ClientError::FileNotFound { path: path.clone() });
        }

        let mut magic = [0u8; 4];
        let mut f = tokio::fs::File::open(&path).await.map_err(map_io)?;
        let sniffed_pdf = f.read_exact(&mut magic).await.is_ok() && &magic == PDF_MAGIC;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Selected {} ({} bytes, pdf magic: {sniffed_pdf})", name, meta.len());

        Ok(Self {
            name,
            content_type: sniffed_pdf.then(|| PDF_MIME.to_string()),
            size: meta.len(),
            source: FileSource::Path(path),
        })
    }

    /// Describe an in-memory file.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type,
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    /// The file's bytes.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ClientError> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => tokio::fs::read(path).await.map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => ClientError::PermissionDenied { path: path.clone() },
                _ => ClientError::FileNotFound { path: path.clone() },
            }),
        }
    }

    /// Content type or extension says PDF (case-insensitive).
    pub fn looks_like_pdf(&self) -> bool {
        let by_type = self
            .content_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(PDF_MIME));
        let by_ext = Path::new(&self.name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        by_type || by_ext
    }

    /// Apply the acceptance rule: PDF by type or extension, and no larger
    /// than `max_size` bytes.
    pub fn accept(&self, max_size: u64) -> Result<(), ClientError> {
        if !self.looks_like_pdf() {
            return Err(ClientError::NotAPdf {
                name: self.name.clone(),
            });
        }
        if self.size > max_size {
            return Err(ClientError::FileTooLarge {
                name: self.name.clone(),
                size: self.size,
                max: max_size,
            });
        }
        Ok(())
    }
}

/// `512 B`, `1.5 KB`, `2.00 MB`, `1.20 GB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.2} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_or_type_is_enough() {
        let by_ext = SelectedFile::from_bytes("Report.PDF", None, vec![0; 10]);
        assert!(by_ext.accept(100).is_ok());

        let by_type =
            SelectedFile::from_bytes("upload.bin", Some("application/pdf".into()), vec![0; 10]);
        assert!(by_type.accept(100).is_ok());

        let neither = SelectedFile::from_bytes("notes.txt", Some("text/plain".into()), vec![]);
        assert!(matches!(neither.accept(100), Err(ClientError::NotAPdf { .. })));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let f = SelectedFile::from_bytes("a.pdf", None, vec![0; 100]);
        assert!(f.accept(100).is_ok());
        assert!(matches!(
            f.accept(99),
            Err(ClientError::FileTooLarge { size: 100, max: 99, .. })
        ));
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2.00 MB");
    }

    #[tokio::test]
    async fn from_path_sniffs_magic() {
        let mut pdf = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        pdf.write_all(b"%PDF-1.7\n").unwrap();
        let f = SelectedFile::from_path(pdf.path()).await.unwrap();
        assert_eq!(f.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(f.size, 9);
        assert!(f.accept(1024).is_ok());
        assert_eq!(f.read_bytes().await.unwrap(), b"%PDF-1.7\n");
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let err = SelectedFile::from_path("/definitely/not/here.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FileNotFound { .. }));
    }
}
