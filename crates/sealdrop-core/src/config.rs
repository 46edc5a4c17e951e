use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SealError;

/// Top-level configuration (loaded from sealdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub limits: LimitsConfig,
    pub service: ServiceConfig,
    pub staging: StagingConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub unseal: UnsealConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest plaintext accepted by `seal`, in MiB (default: 50)
    pub max_file_size_mb: u64,
}

impl LimitsConfig {
    /// The limit in bytes, saturating at `u64::MAX`.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root of the remote API; locators are `{api_base}/file/{id}`
    pub api_base: String,
    /// Root of public share links; links are `{share_base}/file/{id}`
    pub share_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Private per-user directory for staged files
    pub dir: PathBuf,
}

/// Object store backing the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Key prefix for headers and bodies
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Plaintext bytes per encrypted chunk, in KiB (default: 64)
    pub chunk_size_kib: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsealConfig {
    /// Replace an existing file at the destination (default: false)
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.share.example".into(),
            share_base: "https://share.example".into(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.sealdrop/staging"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "sealdrop".into(),
            prefix: "sealdrop".into(),
            enforce_tls: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            chunk_size_kib: 64,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Largest accepted chunk size, in KiB
pub const MAX_CHUNK_SIZE_KIB: u32 = 16 * 1024;

impl SealConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: SealConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config.normalized())
    }

    pub fn validate(&self) -> Result<(), SealError> {
        if self.limits.max_file_size_mb == 0 {
            return Err(SealError::Config("limits.max_file_size_mb must be > 0".into()));
        }
        if self.crypto.chunk_size_kib == 0 || self.crypto.chunk_size_kib > MAX_CHUNK_SIZE_KIB {
            return Err(SealError::Config(format!(
                "crypto.chunk_size_kib must be in 1..={MAX_CHUNK_SIZE_KIB}"
            )));
        }
        if self.crypto.argon2_time_cost == 0 || self.crypto.argon2_parallelism == 0 {
            return Err(SealError::Config(
                "crypto.argon2_time_cost and crypto.argon2_parallelism must be > 0".into(),
            ));
        }
        for (key, value) in [
            ("service.api_base", &self.service.api_base),
            ("service.share_base", &self.service.share_base),
        ] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(SealError::Config(format!("{key} must be an http(s) URL: {value}")));
            }
        }
        Ok(())
    }

    /// Strip trailing slashes from URL bases.
    pub fn normalized(mut self) -> Self {
        self.service.api_base = self.service.api_base.trim_end_matches('/').to_string();
        self.service.share_base = self.service.share_base.trim_end_matches('/').to_string();
        self
    }

    pub fn size_limit_bytes(&self) -> u64 {
        self.limits.max_file_size_bytes()
    }

    pub fn staging_dir(&self) -> PathBuf {
        expand_tilde(&self.staging.dir)
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
