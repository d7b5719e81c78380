//! Filesystem error types.

use std::io;

use thiserror::Error;

/// Errors raised by the unified filesystem.
#[derive(Debug, Error)]
pub enum FsError {
    /// No root contains the path, or the path is hidden by the blacklist.
    #[error("No such file or directory: {path}")]
    NotFound {
        /// The virtual path that was requested.
        path: String,
    },

    /// The unified view does not support this metadata mutation.
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// An fopen-style mode string could not be parsed.
    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),

    /// The filesystem was constructed from an unusable configuration.
    #[error("invalid filesystem configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O failure on a concrete path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an Unsupported error.
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound { .. } => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert FsError to std::io::Error for engines that speak io::Result.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound { path } => io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such file or directory: {}", path),
            ),
            FsError::Unsupported { operation } => io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Unsupported operation: {}", operation),
            ),
            FsError::InvalidMode(mode) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("invalid open mode: {}", mode))
            }
            FsError::InvalidConfig(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::Io(e) => e,
        }
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
