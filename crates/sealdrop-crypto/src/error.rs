use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    /// Wrong passphrase, or ciphertext that was truncated, reordered, or altered.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Input that cannot be a sealdrop stream or header at all.
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CipherError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, CipherError::Authentication(_))
    }
}
