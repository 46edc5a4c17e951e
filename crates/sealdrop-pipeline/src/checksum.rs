//! BLAKE3 digest over staged ciphertext
//!
//! Streams in 64 KiB reads so memory stays flat regardless of file size.

use std::path::Path;

use sealdrop_core::{SealError, SealResult};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUF: usize = 64 * 1024;

/// Hash everything `reader` yields; returns the lowercase hex digest.
pub async fn checksum<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub async fn checksum_file(path: &Path) -> SealResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SealError::io(format!("opening {} for checksum", path.display()), e))?;
    checksum(&mut file)
        .await
        .map_err(|e| SealError::io(format!("reading {} for checksum", path.display()), e))
}

/// Compare a pinned digest against a computed one.
///
/// A pinned value that is not a valid BLAKE3 hex digest never matches.
pub fn verify_checksum(expected: &str, actual: &str) -> SealResult<()> {
    let mismatch = || SealError::ChecksumMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    };
    let expected_hash = blake3::Hash::from_hex(expected).map_err(|_| mismatch())?;
    let actual_hash = blake3::Hash::from_hex(actual).map_err(|_| mismatch())?;
    // blake3::Hash equality is constant-time
    if expected_hash == actual_hash {
        Ok(())
    } else {
        Err(mismatch())
    }
}
