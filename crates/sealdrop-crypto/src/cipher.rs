//! The encryption transform consumed by the seal/unseal pipelines.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secrecy::SecretString;
use sealdrop_core::config::{CryptoConfig, MAX_CHUNK_SIZE_KIB};
use sealdrop_core::{CipherParams, FileHeader};

use crate::chunk::{name_aad, open_record, seal_record};
use crate::error::CipherError;
use crate::kdf::{derive_file_key, KdfParams};
use crate::stream::{decrypt_stream, encrypt_stream};
use crate::{FILE_ID_SIZE, SALT_SIZE};

/// Algorithm tag written into every header this module produces
pub const ALGORITHM: &str = "xchacha20poly1305-stream-v1";

/// Encrypts a plaintext stream into a ciphertext stream and back.
///
/// `decrypt` must report a wrong passphrase or tampered input as
/// [`CipherError::Authentication`] and nothing else.
pub trait SealCipher: Send + Sync + 'static {
    fn encrypt(
        &self,
        plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
        name: &str,
        passphrase: &SecretString,
    ) -> Result<FileHeader, CipherError>;

    /// Returns the logical file name recovered from the header.
    fn decrypt(
        &self,
        ciphertext: &mut dyn Read,
        plaintext: &mut dyn Write,
        passphrase: &SecretString,
        header: &FileHeader,
    ) -> Result<String, CipherError>;
}

/// Argon2id + XChaCha20-Poly1305 chunk stream
#[derive(Debug, Clone)]
pub struct PassphraseCipher {
    kdf: KdfParams,
    chunk_size: usize,
}

impl Default for PassphraseCipher {
    fn default() -> Self {
        Self::from_config(&CryptoConfig::default())
    }
}

impl PassphraseCipher {
    pub fn new(kdf: KdfParams, chunk_size: usize) -> Self {
        Self { kdf, chunk_size }
    }

    pub fn from_config(cfg: &CryptoConfig) -> Self {
        Self {
            kdf: KdfParams {
                mem_cost_kib: cfg.argon2_mem_cost_kib,
                time_cost: cfg.argon2_time_cost,
                parallelism: cfg.argon2_parallelism,
            },
            chunk_size: cfg.chunk_size_kib as usize * 1024,
        }
    }
}

impl SealCipher for PassphraseCipher {
    fn encrypt(
        &self,
        plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
        name: &str,
        passphrase: &SecretString,
    ) -> Result<FileHeader, CipherError> {
        // A header the receiver would refuse is not worth sealing.
        let kdf = KdfParams::from_settings(&self.kdf.to_settings())?;

        let mut salt = [0u8; SALT_SIZE];
        let mut file_id = [0u8; FILE_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut file_id);

        let key = derive_file_key(passphrase, &salt, &kdf)?;
        let sealed_name = seal_record(&key, &name_aad(&file_id), name.as_bytes())?;
        let stats = encrypt_stream(&key, &file_id, self.chunk_size, plaintext, ciphertext)?;

        tracing::debug!(
            chunks = stats.chunks,
            plaintext = stats.plaintext_bytes,
            ciphertext = stats.ciphertext_bytes,
            "encrypted stream"
        );

        Ok(FileHeader::new(
            stats.plaintext_bytes,
            stats.ciphertext_bytes,
            CipherParams {
                algorithm: ALGORITHM.to_string(),
                kdf: self.kdf.to_settings(),
                salt: STANDARD.encode(salt),
                file_id: STANDARD.encode(file_id),
                chunk_size: self.chunk_size as u32,
                sealed_name: STANDARD.encode(sealed_name),
            },
        ))
    }

    fn decrypt(
        &self,
        ciphertext: &mut dyn Read,
        plaintext: &mut dyn Write,
        passphrase: &SecretString,
        header: &FileHeader,
    ) -> Result<String, CipherError> {
        let params = &header.cipher;
        if params.algorithm != ALGORITHM {
            return Err(CipherError::Malformed(format!(
                "unsupported algorithm {:?}",
                params.algorithm
            )));
        }
        let chunk_size = params.chunk_size as usize;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE_KIB as usize * 1024 {
            return Err(CipherError::Malformed(format!(
                "chunk size {chunk_size} out of bounds"
            )));
        }

        let kdf = KdfParams::from_settings(&params.kdf)?;
        let salt: [u8; SALT_SIZE] = decode_fixed("salt", &params.salt)?;
        let file_id: [u8; FILE_ID_SIZE] = decode_fixed("file_id", &params.file_id)?;
        let sealed_name = decode("sealed_name", &params.sealed_name)?;

        let key = derive_file_key(passphrase, &salt, &kdf)?;
        let name_bytes = open_record(&key, &name_aad(&file_id), &sealed_name)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|e| CipherError::Malformed(format!("file name is not UTF-8: {e}")))?;

        let written = decrypt_stream(&key, &file_id, chunk_size, ciphertext, plaintext)?;
        if written != header.size {
            return Err(CipherError::Malformed(format!(
                "decrypted {written} bytes, header declares {}",
                header.size
            )));
        }
        Ok(name)
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(value)
        .map_err(|e| CipherError::Malformed(format!("header {field}: base64 decode: {e}")))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], CipherError> {
    let bytes = decode(field, value)?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CipherError::Malformed(format!("header {field}: {} bytes, expected {N}", b.len()))
    })
}
