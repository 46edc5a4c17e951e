//! Framed chunk stream
//!
//! ```text
//! frame = [u32 BE: sealed length][u8: flags][sealed record]
//! flags = 0x01 on the final frame, 0x00 otherwise
//! ```
//!
//! The flag byte travels in the clear but is also bound into the record AAD.
//! A stream has exactly one final frame and nothing after it; an empty
//! plaintext is a single empty final frame.

use std::io::{ErrorKind, Read, Write};

use crate::chunk::{chunk_aad, open_record, seal_record};
use crate::error::CipherError;
use crate::kdf::FileKey;
use crate::{FILE_ID_SIZE, NONCE_SIZE, TAG_SIZE};

const FLAG_FINAL: u8 = 0x01;

/// Bytes a frame adds on top of its plaintext
pub const FRAME_OVERHEAD: usize = 4 + 1 + NONCE_SIZE + TAG_SIZE;

/// Byte counts produced by [`encrypt_stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub plaintext_bytes: u64,
    pub ciphertext_bytes: u64,
    pub chunks: u64,
}

/// Encrypt `reader` into `writer` as a framed chunk stream.
///
/// Memory use is bounded by two chunk buffers regardless of input size.
pub fn encrypt_stream(
    key: &FileKey,
    file_id: &[u8; FILE_ID_SIZE],
    chunk_size: usize,
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> Result<StreamStats, CipherError> {
    if chunk_size == 0 {
        return Err(CipherError::Malformed("chunk size must be > 0".into()));
    }

    let mut stats = StreamStats {
        plaintext_bytes: 0,
        ciphertext_bytes: 0,
        chunks: 0,
    };

    let mut current = vec![0u8; chunk_size];
    let mut next = vec![0u8; chunk_size];
    let mut filled = read_full(reader, &mut current)?;
    let mut index = 0u64;

    loop {
        // A short read means EOF; a full one needs a look-ahead to know.
        let (next_filled, is_final) = if filled < chunk_size {
            (0, true)
        } else {
            let n = read_full(reader, &mut next)?;
            (n, n == 0)
        };

        let sealed = seal_record(key, &chunk_aad(index, is_final, file_id), &current[..filled])?;
        let flags = if is_final { FLAG_FINAL } else { 0 };
        writer.write_all(&(sealed.len() as u32).to_be_bytes())?;
        writer.write_all(&[flags])?;
        writer.write_all(&sealed)?;

        stats.plaintext_bytes += filled as u64;
        stats.ciphertext_bytes += (4 + 1 + sealed.len()) as u64;
        stats.chunks += 1;

        if is_final {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        filled = next_filled;
        index += 1;
    }

    writer.flush()?;
    Ok(stats)
}

/// Decrypt a framed chunk stream from `reader` into `writer`.
///
/// Returns the number of plaintext bytes written. Plaintext of a chunk is
/// only written after that chunk authenticates; a caller that needs
/// all-or-nothing output must write into a scratch location.
pub fn decrypt_stream(
    key: &FileKey,
    file_id: &[u8; FILE_ID_SIZE],
    chunk_size: usize,
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> Result<u64, CipherError> {
    let max_sealed = chunk_size + NONCE_SIZE + TAG_SIZE;
    let mut written = 0u64;
    let mut index = 0u64;
    let mut sealed = Vec::with_capacity(max_sealed);

    loop {
        let mut prefix = [0u8; 5];
        match read_full(reader, &mut prefix)? {
            5 => {}
            _ => {
                return Err(CipherError::Authentication(
                    "stream truncated before its final chunk".into(),
                ))
            }
        }

        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let flags = prefix[4];
        if len < NONCE_SIZE + TAG_SIZE || len > max_sealed {
            return Err(CipherError::Malformed(format!(
                "frame {index} has length {len} (expected {}..={max_sealed})",
                NONCE_SIZE + TAG_SIZE
            )));
        }
        if flags & !FLAG_FINAL != 0 {
            return Err(CipherError::Malformed(format!(
                "frame {index} has unknown flags {flags:#04x}"
            )));
        }
        let is_final = flags & FLAG_FINAL != 0;

        sealed.resize(len, 0);
        reader.read_exact(&mut sealed).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                CipherError::Authentication(format!("frame {index} truncated"))
            }
            _ => CipherError::Io(e),
        })?;

        let plaintext = open_record(key, &chunk_aad(index, is_final, file_id), &sealed)?;
        writer.write_all(&plaintext)?;
        written += plaintext.len() as u64;

        if is_final {
            let mut extra = [0u8; 1];
            if read_full(reader, &mut extra)? != 0 {
                return Err(CipherError::Authentication(
                    "data after the final chunk".into(),
                ));
            }
            break;
        }
        index += 1;
    }

    writer.flush()?;
    Ok(written)
}

/// Read until `buf` is full or EOF; returns the bytes read.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> Result<usize, CipherError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CipherError::Io(e)),
        }
    }
    Ok(filled)
}
