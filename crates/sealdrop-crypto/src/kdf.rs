//! Key derivation: Argon2id passphrase → file key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sealdrop_core::KdfSettings;
use zeroize::Zeroize;

use crate::error::CipherError;
use crate::{KEY_SIZE, SALT_SIZE};

/// Upper bounds accepted from an untrusted header
pub const MAX_MEM_COST_KIB: u32 = 1024 * 1024;
pub const MAX_TIME_COST: u32 = 16;
pub const MAX_PARALLELISM: u32 = 16;

/// A 256-bit file key derived from a passphrase via Argon2id.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters for KDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Accept parameters read from a header only when they are within bounds.
    pub fn from_settings(settings: &KdfSettings) -> Result<Self, CipherError> {
        if settings.mem_cost_kib > MAX_MEM_COST_KIB
            || settings.time_cost == 0
            || settings.time_cost > MAX_TIME_COST
            || settings.parallelism == 0
            || settings.parallelism > MAX_PARALLELISM
        {
            return Err(CipherError::Malformed(format!(
                "KDF parameters out of bounds: {settings:?}"
            )));
        }
        Ok(Self {
            mem_cost_kib: settings.mem_cost_kib,
            time_cost: settings.time_cost,
            parallelism: settings.parallelism,
        })
    }

    pub fn to_settings(&self) -> KdfSettings {
        KdfSettings {
            mem_cost_kib: self.mem_cost_kib,
            time_cost: self.time_cost,
            parallelism: self.parallelism,
        }
    }
}

/// Derive a 256-bit file key from a passphrase and salt using Argon2id.
///
/// The salt is random per sealed file and stored in the header (it does not
/// need to be secret).
pub fn derive_file_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> Result<FileKey, CipherError> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CipherError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CipherError::Kdf(format!("Argon2id KDF failed: {e}")))?;

    let derived = FileKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}
