use serde::{Deserialize, Serialize};

/// Current `FileHeader` format version
pub const HEADER_VERSION: u32 = 1;

/// Which half of a sealed file a remote call moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Header,
    Body,
}

impl std::fmt::Display for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Part::Header => f.write_str("header"),
            Part::Body => f.write_str("body"),
        }
    }
}

/// Argon2id cost parameters recorded alongside the salt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSettings {
    pub mem_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// Non-secret parameters the decryption step needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    /// Algorithm tag, e.g. "xchacha20poly1305-stream-v1"
    pub algorithm: String,
    pub kdf: KdfSettings,
    /// KDF salt (base64)
    pub salt: String,
    /// Random per-file identifier bound into every chunk's AAD (base64)
    pub file_id: String,
    /// Plaintext bytes per chunk
    pub chunk_size: u32,
    /// The logical file name, sealed with the file key (base64)
    pub sealed_name: String,
}

/// Metadata describing a sealed file.
///
/// Produced by the encryption step, stamped with the staged ciphertext checksum
/// by the seal pipeline, and completed with remote locator fields by the
/// remote service. Each step returns a new value; none mutate in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: u32,
    /// Plaintext size in bytes
    pub size: u64,
    /// Staged ciphertext size in bytes
    pub ciphertext_size: u64,
    /// BLAKE3 of the staged ciphertext (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Service-assigned short identifier used in share links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub cipher: CipherParams,
}

impl FileHeader {
    pub fn new(size: u64, ciphertext_size: u64, cipher: CipherParams) -> Self {
        Self {
            version: HEADER_VERSION,
            size,
            ciphertext_size,
            checksum: None,
            short_id: None,
            upload_url: None,
            download_url: None,
            cipher,
        }
    }

    pub fn with_checksum(self, checksum: impl Into<String>) -> Self {
        Self {
            checksum: Some(checksum.into()),
            ..self
        }
    }

    pub fn with_locator(
        self,
        short_id: impl Into<String>,
        upload_url: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            short_id: Some(short_id.into()),
            upload_url: Some(upload_url.into()),
            download_url: Some(download_url.into()),
            ..self
        }
    }

    pub fn short_id(&self) -> Option<&str> {
        self.short_id.as_deref()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| anyhow::anyhow!("serializing header: {e}"))
    }

    /// Deserialize from JSON bytes, rejecting unknown versions
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        let header: FileHeader = serde_json::from_slice(data)
            .map_err(|e| anyhow::anyhow!("parsing header: {e}"))?;
        if header.version != HEADER_VERSION {
            anyhow::bail!(
                "unsupported header version {} (expected {HEADER_VERSION})",
                header.version
            );
        }
        Ok(header)
    }
}
