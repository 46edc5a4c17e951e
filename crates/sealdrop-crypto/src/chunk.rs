//! Per-record XChaCha20-Poly1305 encryption/decryption
//!
//! Sealed record format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! chunk AAD = "sdc1" || chunk_index (8 bytes, big-endian) || final_flag (1 byte) || file_id (32 bytes)
//! name  AAD = "sdn1" || file_id (32 bytes)
//! ```
//!
//! The AAD binds each chunk to its position, to its file, and to whether it
//! ends the stream, so reordering, cross-file substitution and truncation all
//! fail authentication.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::CipherError;
use crate::kdf::FileKey;
use crate::{FILE_ID_SIZE, NONCE_SIZE, TAG_SIZE};

const CHUNK_DOMAIN: &[u8; 4] = b"sdc1";
const NAME_DOMAIN: &[u8; 4] = b"sdn1";

/// Encrypt one record. Returns `[24-byte nonce][ciphertext][16-byte tag]`.
pub fn seal_record(key: &FileKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CipherError::Malformed(format!("record encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt one record produced by [`seal_record`] with the same AAD.
pub fn open_record(key: &FileKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::Malformed(format!(
            "sealed record too short: {} bytes (minimum {})",
            sealed.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            CipherError::Authentication("wrong passphrase or tampered ciphertext".to_string())
        })
}

/// Build chunk AAD: domain || chunk_index (8 bytes BE) || final_flag || file_id
pub fn chunk_aad(chunk_index: u64, is_final: bool, file_id: &[u8; FILE_ID_SIZE]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + 8 + 1 + FILE_ID_SIZE);
    aad.extend_from_slice(CHUNK_DOMAIN);
    aad.extend_from_slice(&chunk_index.to_be_bytes());
    aad.push(u8::from(is_final));
    aad.extend_from_slice(file_id);
    aad
}

/// Build name AAD: domain || file_id
pub fn name_aad(file_id: &[u8; FILE_ID_SIZE]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + FILE_ID_SIZE);
    aad.extend_from_slice(NAME_DOMAIN);
    aad.extend_from_slice(file_id);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn key(b: u8) -> FileKey {
        FileKey::from_bytes([b; KEY_SIZE])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let file_id = [0xABu8; FILE_ID_SIZE];
        let aad = chunk_aad(0, true, &file_id);

        let sealed = seal_record(&key(1), &aad, b"hello, sealed world!").unwrap();
        let opened = open_record(&key(1), &aad, &sealed).unwrap();

        assert_eq!(opened, b"hello, sealed world!");
    }

    #[test]
    fn test_sealed_size() {
        let aad = name_aad(&[0u8; FILE_ID_SIZE]);
        let sealed = seal_record(&key(1), &aad, &[0u8; 1000]).unwrap();

        // nonce (24) + plaintext (1000) + tag (16) = 1040
        assert_eq!(sealed.len(), NONCE_SIZE + 1000 + TAG_SIZE);
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let aad = name_aad(&[0u8; FILE_ID_SIZE]);
        let sealed = seal_record(&key(1), &aad, b"notes.txt").unwrap();

        let err = open_record(&key(2), &aad, &sealed).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_final_flag_is_authenticated() {
        let file_id = [0u8; FILE_ID_SIZE];
        let sealed = seal_record(&key(1), &chunk_aad(3, false, &file_id), b"middle").unwrap();

        let err = open_record(&key(1), &chunk_aad(3, true, &file_id), &sealed).unwrap_err();
        assert!(err.is_authentication(), "flipping the final flag must fail");
    }

    #[test]
    fn test_wrong_index_or_file_id_fails() {
        let file_a = [0xAAu8; FILE_ID_SIZE];
        let file_b = [0xBBu8; FILE_ID_SIZE];
        let sealed = seal_record(&key(1), &chunk_aad(0, false, &file_a), b"data").unwrap();

        assert!(open_record(&key(1), &chunk_aad(1, false, &file_a), &sealed).is_err());
        assert!(open_record(&key(1), &chunk_aad(0, false, &file_b), &sealed).is_err());
    }

    #[test]
    fn test_name_and_chunk_domains_differ() {
        let file_id = [0u8; FILE_ID_SIZE];
        assert_ne!(name_aad(&file_id), chunk_aad(0, false, &file_id)[..36].to_vec());
    }

    #[test]
    fn test_too_short_is_malformed() {
        let err = open_record(&key(1), b"", &[0u8; 10]).unwrap_err();
        assert!(matches!(err, CipherError::Malformed(_)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let aad = name_aad(&[0u8; FILE_ID_SIZE]);
        let mut sealed = seal_record(&key(1), &aad, b"secret data").unwrap();
        sealed[NONCE_SIZE + 1] ^= 0xFF;

        assert!(open_record(&key(1), &aad, &sealed).unwrap_err().is_authentication());
    }
}
