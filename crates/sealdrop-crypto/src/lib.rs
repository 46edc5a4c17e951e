//! sealdrop-crypto: the passphrase encryption transform used by seal/unseal
//!
//! Pipeline: passphrase + random salt → Argon2id → file key
//!           plaintext → fixed-size chunks → XChaCha20-Poly1305 frames
//!
//! The logical file name is sealed as its own record under the same key and
//! carried in the `FileHeader`, so a wrong passphrase is detected before any
//! plaintext is produced.

pub mod chunk;
pub mod cipher;
pub mod error;
pub mod kdf;
pub mod stream;

pub use cipher::{PassphraseCipher, SealCipher, ALGORITHM};
pub use error::CipherError;
pub use kdf::{derive_file_key, FileKey, KdfParams};
pub use stream::{decrypt_stream, encrypt_stream, StreamStats};

/// Size of a file key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the KDF salt
pub const SALT_SIZE: usize = 16;

/// Size of the per-file identifier bound into chunk AAD
pub const FILE_ID_SIZE: usize = 32;
