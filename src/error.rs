use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to decode '{}': {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("gpu error: {0}")]
    Gpu(String),
}

impl AssetError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode { path: path.into(), reason: reason.to_string() }
    }

    /// Truncated payload streams are a format problem, not an i/o one.
    pub fn from_payload_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::FormatMismatch(err.to_string())
        } else {
            Self::Io(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type AssetResult<T> = Result<T, AssetError>;
