//! Local document selection
//!
//! Everything here runs before the backend is contacted: a document that
//! fails these checks never produces a network request.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions the backend knows how to ingest
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "pdf", "doc", "docx"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("File size must be less than {}", format_size(.limit.to_owned()))]
    TooLarge { size: u64, limit: u64 },
    #[error("Unsupported file type {0:?}. Supported formats: .txt, .pdf, .doc, .docx")]
    UnsupportedType(String),
    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("Could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A selected document, read into memory and ready to upload
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub size: u64,
    pub content: Vec<u8>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Validate and read a document from disk.
    ///
    /// The size ceiling is checked against metadata before the content is
    /// read, so an oversized file is never loaded.
    pub fn open(path: &Path, max_bytes: u64) -> Result<Self, DocumentError> {
        let io_err = |source| DocumentError::Io { path: path.to_path_buf(), source };

        let metadata = fs::metadata(path).map_err(io_err)?;
        if !metadata.is_file() {
            return Err(DocumentError::NotAFile(path.to_path_buf()));
        }
        if metadata.len() > max_bytes {
            return Err(DocumentError::TooLarge { size: metadata.len(), limit: max_bytes });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        check_extension(&name)?;

        let content = fs::read(path).map_err(io_err)?;
        // The file may have grown between the metadata call and the read
        if content.len() as u64 > max_bytes {
            return Err(DocumentError::TooLarge { size: content.len() as u64, limit: max_bytes });
        }

        Ok(Self {
            name,
            size: content.len() as u64,
            content,
        })
    }

    /// MIME type sent with the multipart upload
    pub fn mime_type(&self) -> &'static str {
        match extension(&self.name).as_deref() {
            Some("txt") => "text/plain",
            Some("pdf") => "application/pdf",
            Some("doc") => "application/msword",
            Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            _ => "application/octet-stream",
        }
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn check_extension(name: &str) -> Result<(), DocumentError> {
    match extension(name) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(DocumentError::UnsupportedType(format!(".{}", ext))),
        None => Err(DocumentError::UnsupportedType(name.to_string())),
    }
}

/// Human readable size, e.g. "10 MB" or "512 B"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        if bytes % MB == 0 {
            format!("{} MB", bytes / MB)
        } else {
            format!("{:.1} MB", bytes as f64 / MB as f64)
        }
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
