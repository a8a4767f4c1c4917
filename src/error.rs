use std::path::{Path, PathBuf};

use thiserror::Error;

/// Coarse failure category, independent of the payload carried by [`CompressError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    UnsupportedDocument,
    InvalidSettings,
    InvalidJob,
    EncodingFailure,
    Render,
    Pdf,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported document {}: {reason}", path.display())]
    UnsupportedDocument { path: PathBuf, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Image encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Job cancelled")]
    Cancelled,
}

impl CompressError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CompressError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn unsupported(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        CompressError::UnsupportedDocument {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompressError::Io { .. } => ErrorKind::Io,
            CompressError::UnsupportedDocument { .. } => ErrorKind::UnsupportedDocument,
            CompressError::InvalidSettings(_) => ErrorKind::InvalidSettings,
            CompressError::InvalidJob(_) => ErrorKind::InvalidJob,
            CompressError::EncodingFailure(_) => ErrorKind::EncodingFailure,
            CompressError::Render { .. } => ErrorKind::Render,
            CompressError::Pdf(_) => ErrorKind::Pdf,
            CompressError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T, E = CompressError> = std::result::Result<T, E>;
