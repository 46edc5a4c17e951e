//! Integration test: every failure path leaves the staging area clean
//!
//! Faults are injected per remote call; the only failure allowed to leave a
//! staged file behind is an authentication failure on unseal.

mod support;

use std::io::{Cursor, Read, Write};

use sealdrop_core::{FileHeader, Part, SealError};
use sealdrop_crypto::{CipherError, PassphraseCipher, SealCipher};
use sealdrop_pipeline::{checksum, Sealer};
use sealdrop_storage::RemoteService;
use secrecy::SecretString;
use support::{pass, staged_files, write_file, FaultyRemote, Harness};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn oversized_file_fails_before_any_side_effect() {
    let h = Harness::with_config(|c| c.limits.max_file_size_mb = 1);
    let src = write_file(h.root(), "big.bin", &vec![0u8; MIB + 1]);

    let err = h.sealer.seal(&src, &pass("pw")).await.unwrap_err();
    match err {
        SealError::SizeLimitExceeded { size, limit_mb } => {
            assert_eq!(size, (MIB + 1) as u64);
            assert_eq!(limit_mb, 1);
        }
        other => panic!("expected SizeLimitExceeded, got {other}"),
    }

    assert!(!h.staging_dir().exists(), "staging dir must not even be created");
    assert_eq!(FaultyRemote::count(&h.remote.calls.put_header), 0);
    assert_eq!(h.remote.object_count().await, 0);
}

#[tokio::test]
async fn file_at_exact_limit_is_accepted() {
    let h = Harness::with_config(|c| c.limits.max_file_size_mb = 1);
    let src = write_file(h.root(), "edge.bin", &vec![7u8; MIB]);
    assert!(h.sealer.seal(&src, &pass("pw")).await.is_ok());
}

#[tokio::test]
async fn missing_source_is_io_error() {
    let h = Harness::new();
    let err = h
        .sealer
        .seal(&h.root().join("absent.txt"), &pass("pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::Io { .. }));
    assert_eq!(err.stage(), "filesystem");
}

#[tokio::test]
async fn put_header_failure_cleans_up_and_skips_body() {
    let h = Harness::new();
    FaultyRemote::fail(&h.remote.faults.put_header);
    let src = write_file(h.root(), "notes.txt", b"hello");

    let err = h.sealer.seal(&src, &pass("pw")).await.unwrap_err();
    assert!(
        matches!(err, SealError::RemotePublish { part: Part::Header, .. }),
        "got {err}"
    );
    assert!(err.to_string().contains("injected put_header failure"));
    assert!(staged_files(&h.staging_dir()).is_empty());
    assert_eq!(FaultyRemote::count(&h.remote.calls.put_body), 0);
}

#[tokio::test]
async fn put_body_failure_cleans_up_and_leaves_dangling_header() {
    let h = Harness::new();
    FaultyRemote::fail(&h.remote.faults.put_body);
    let src = write_file(h.root(), "notes.txt", b"hello");

    let err = h.sealer.seal(&src, &pass("pw")).await.unwrap_err();
    assert!(matches!(err, SealError::RemotePublish { part: Part::Body, .. }));
    assert_eq!(err.stage(), "put-body");
    assert!(staged_files(&h.staging_dir()).is_empty());

    // The header went out before the body failed; nothing rolls it back.
    assert_eq!(FaultyRemote::count(&h.remote.calls.put_header), 1);
    assert_eq!(h.remote.object_count().await, 1);
}

#[tokio::test]
async fn abandon_header_removes_dangling_state() {
    let h = Harness::new();
    let src = write_file(h.root(), "notes.txt", b"hello");
    let sealed = h.sealer.seal(&src, &pass("pw")).await.unwrap();
    assert_eq!(h.remote.object_count().await, 2);

    h.remote.abandon_header(&sealed.header).await.unwrap();
    assert_eq!(h.remote.object_count().await, 0);

    let err = h
        .unsealer
        .unseal(sealed.link.as_str(), &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::RemoteFetch { part: Part::Header, .. }));
}

#[tokio::test]
async fn get_header_failure_cleans_up() {
    let h = Harness::new();
    let src = write_file(h.root(), "notes.txt", b"hello");
    let link = h.sealer.seal(&src, &pass("pw")).await.unwrap().link.to_string();

    FaultyRemote::fail(&h.remote.faults.get_header);
    let err = h
        .unsealer
        .unseal(&link, &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::RemoteFetch { part: Part::Header, .. }));
    assert!(!err.is_retryable());
    assert!(staged_files(&h.staging_dir()).is_empty());
    assert_eq!(FaultyRemote::count(&h.remote.calls.get_body), 0);
}

#[tokio::test]
async fn get_body_failure_cleans_up() {
    let h = Harness::new();
    let src = write_file(h.root(), "notes.txt", b"hello");
    let link = h.sealer.seal(&src, &pass("pw")).await.unwrap().link.to_string();

    FaultyRemote::fail(&h.remote.faults.get_body);
    let err = h
        .unsealer
        .unseal(&link, &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::RemoteFetch { part: Part::Body, .. }));
    assert_eq!(err.stage(), "get-body");
    assert!(staged_files(&h.staging_dir()).is_empty());
    assert!(!h.out_dir().join("notes.txt").exists());
}

/// Cipher whose encryption always fails after the staged file exists
struct FailingCipher;

impl SealCipher for FailingCipher {
    fn encrypt(
        &self,
        _plaintext: &mut dyn Read,
        ciphertext: &mut dyn Write,
        _name: &str,
        _passphrase: &SecretString,
    ) -> Result<FileHeader, CipherError> {
        ciphertext.write_all(b"partial")?;
        Err(CipherError::Kdf("boom".into()))
    }

    fn decrypt(
        &self,
        _ciphertext: &mut dyn Read,
        _plaintext: &mut dyn Write,
        _passphrase: &SecretString,
        _header: &FileHeader,
    ) -> Result<String, CipherError> {
        Err(CipherError::Malformed("never sealed".into()))
    }
}

#[tokio::test]
async fn encryption_failure_cleans_up_before_publish() {
    let h = Harness::new();
    let sealer = Sealer::with_cipher(h.remote.clone(), FailingCipher, &h.config);
    let src = write_file(h.root(), "notes.txt", b"hello");

    let err = sealer.seal(&src, &pass("pw")).await.unwrap_err();
    assert!(matches!(err, SealError::Encryption(_)), "got {err}");
    assert_eq!(err.stage(), "encrypt");
    assert!(err.to_string().contains("boom"));
    assert!(staged_files(&h.staging_dir()).is_empty());
    assert_eq!(FaultyRemote::count(&h.remote.calls.put_header), 0);
    assert_eq!(h.remote.object_count().await, 0);
}

#[tokio::test]
async fn non_authentication_decrypt_failure_removes_staged_ciphertext() {
    let h = Harness::new();
    let src = write_file(h.root(), "notes.txt", b"hello");
    let sealed = h.sealer.seal(&src, &pass("pw")).await.unwrap();
    let id = sealed.header.short_id().unwrap().to_string();

    // Swap the stored header for one naming an algorithm nobody implements.
    let op = h.remote.inner.operator();
    let path = format!("test/headers/{id}.json");
    let stored = op.read(&path).await.unwrap().to_vec();
    let mut header = FileHeader::from_bytes(&stored).unwrap();
    header.cipher.algorithm = "rot13".into();
    op.write(&path, header.to_bytes().unwrap()).await.unwrap();

    let err = h
        .unsealer
        .unseal(sealed.link.as_str(), &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::Decryption(_)), "got {err}");
    assert_eq!(err.stage(), "decrypt");
    assert!(!err.preserves_staged());
    assert!(staged_files(&h.staging_dir()).is_empty());
    assert!(!h.out_dir().join("notes.txt").exists());
}

#[tokio::test]
async fn corrupted_body_is_checksum_mismatch_not_retryable() {
    let h = Harness::new();
    let src = write_file(h.root(), "notes.txt", b"hello world");
    let link = h.sealer.seal(&src, &pass("pw")).await.unwrap().link.to_string();

    FaultyRemote::fail(&h.remote.faults.corrupt_body);
    let err = h
        .unsealer
        .unseal(&link, &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::ChecksumMismatch { .. }), "got {err}");
    assert!(!err.is_retryable());
    assert!(staged_files(&h.staging_dir()).is_empty());
}

#[tokio::test]
async fn invalid_link_fails_before_staging() {
    let h = Harness::new();
    let err = h
        .unsealer
        .unseal("https://share.example/nothing-here", &pass("pw"), &h.out_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::InvalidShareLink(_)));
    assert!(!h.staging_dir().exists());
    assert_eq!(FaultyRemote::count(&h.remote.calls.get_header), 0);
}

/// Publish a sealed body whose recovered name is hostile.
async fn publish_with_name(h: &Harness, name: &str, content: &[u8]) -> String {
    let cipher = PassphraseCipher::from_config(&h.config.crypto);
    let mut sealed: Vec<u8> = Vec::new();
    let header = cipher
        .encrypt(&mut Cursor::new(content), &mut sealed, name, &pass("pw"))
        .unwrap();
    let digest = checksum::checksum(&mut sealed.as_slice()).await.unwrap();

    let published = h
        .remote
        .put_header(&header.with_checksum(digest))
        .await
        .unwrap();
    h.remote
        .put_body(&published, &mut sealed.as_slice())
        .await
        .unwrap();
    format!("https://share.example/file/{}", published.short_id().unwrap())
}

#[tokio::test]
async fn traversal_name_cannot_escape_destination() {
    let h = Harness::new();
    let out = h.out_dir();

    for hostile in ["../../etc/passwd", "../escape.txt", "/abs/path", "..", "a/b"] {
        let link = publish_with_name(&h, hostile, b"payload").await;
        let err = h.unsealer.unseal(&link, &pass("pw"), &out).await.unwrap_err();
        assert!(
            matches!(err, SealError::Placement { .. }),
            "{hostile:?} must fail placement, got {err}"
        );
    }

    assert!(!h.root().join("escape.txt").exists());
    assert!(!h.root().join("etc").exists());
    assert!(staged_files(&h.staging_dir()).is_empty());
    let placed = std::fs::read_dir(&out).map(|d| d.count()).unwrap_or(0);
    assert_eq!(placed, 0, "nothing placed in the destination either");
}

#[tokio::test]
async fn header_without_checksum_is_still_unsealed() {
    let h = Harness::new();
    let cipher = PassphraseCipher::from_config(&h.config.crypto);
    let mut sealed: Vec<u8> = Vec::new();
    let header = cipher
        .encrypt(&mut Cursor::new(b"legacy"), &mut sealed, "legacy.txt", &pass("pw"))
        .unwrap();
    assert!(header.checksum.is_none());

    let published = h.remote.put_header(&header).await.unwrap();
    h.remote
        .put_body(&published, &mut sealed.as_slice())
        .await
        .unwrap();
    let link = format!("https://share.example/file/{}", published.short_id().unwrap());

    let unsealed = h
        .unsealer
        .unseal(&link, &pass("pw"), &h.out_dir())
        .await
        .unwrap();
    assert_eq!(std::fs::read(unsealed.path).unwrap(), b"legacy");
}
