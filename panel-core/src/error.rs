//! Error taxonomy for console operations
//!
//! Every variant carries the caller's *relative* path only. The absolute
//! location under the confined root never appears in an error message.

use std::io;

/// Failure of a single confined filesystem operation
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// The requested path escapes the confined root
    #[error("Access denied")]
    AccessDenied,

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("The selected item is not a file: {path}")]
    NotAFile { path: String },

    #[error("The selected item is not a folder: {path}")]
    NotAFolder { path: String },

    /// User-supplied name is empty or has nothing left after sanitizing
    #[error("Invalid name: {name:?}")]
    InvalidName { name: String },

    #[error("I/O failure on {path:?}: {source}")]
    IoFailure {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ConsoleError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        ConsoleError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Map a failed `stat` on `path` to the matching variant
    pub(crate) fn from_stat(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ConsoleError::NotFound {
                path: path.to_string(),
            },
            _ => ConsoleError::io(path, source),
        }
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
