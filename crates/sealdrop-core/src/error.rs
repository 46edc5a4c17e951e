use std::path::PathBuf;

use thiserror::Error;

use crate::types::Part;

pub type SealResult<T> = Result<T, SealError>;

#[derive(Debug, Error)]
pub enum SealError {
    #[error("file is {size} bytes, larger than the {limit_mb} MB limit")]
    SizeLimitExceeded { size: u64, limit_mb: u64 },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secure random source unavailable: {0}")]
    RandomSource(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Wrong passphrase or tampered ciphertext. The staged ciphertext is
    /// kept at `staged` so the caller can retry without re-downloading.
    #[error(
        "authentication failed: wrong passphrase or tampered ciphertext (staged copy kept at {})",
        staged.display()
    )]
    Authentication { staged: PathBuf },

    #[error("publishing {part} failed: {message}")]
    RemotePublish { part: Part, message: String },

    #[error("fetching {part} failed: {message}")]
    RemoteFetch { part: Part, message: String },

    #[error("checksum mismatch: header pins {expected}, staged body hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("cannot place {}: {reason}", path.display())]
    Placement { path: PathBuf, reason: String },

    #[error("invalid share link: {0}")]
    InvalidShareLink(String),

    #[error("config error: {0}")]
    Config(String),
}

impl SealError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SealError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn placement(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SealError::Placement {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when re-running the operation with different input can succeed
    /// without re-fetching anything (only a wrong passphrase qualifies).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SealError::Authentication { .. })
    }

    /// True when the failing pipeline leaves its staged file on disk.
    pub fn preserves_staged(&self) -> bool {
        matches!(self, SealError::Authentication { .. })
    }

    /// Short name of the stage that failed, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            SealError::SizeLimitExceeded { .. } => "size-guard",
            SealError::Io { .. } => "filesystem",
            SealError::RandomSource(_) => "staging",
            SealError::Encryption(_) => "encrypt",
            SealError::Decryption(_) | SealError::Authentication { .. } => "decrypt",
            SealError::RemotePublish { part: Part::Header, .. } => "put-header",
            SealError::RemotePublish { part: Part::Body, .. } => "put-body",
            SealError::RemoteFetch { part: Part::Header, .. } => "get-header",
            SealError::RemoteFetch { part: Part::Body, .. } => "get-body",
            SealError::ChecksumMismatch { .. } => "checksum",
            SealError::Placement { .. } => "place",
            SealError::InvalidShareLink(_) => "link",
            SealError::Config(_) => "config",
        }
    }
}
