//! Inbound pipeline: share link → fetched header + body → plaintext file
//!
//! Per invocation:
//! ```text
//! Staging → HeaderFetched → BodyFetched → Decrypted → Placed
//! ```
//! [`UnsealStage`] labels the debug events for each transition. A failure
//! can end the run from any non-terminal state; it is the returned
//! [`SealError`], and [`SealError::stage`] names the step that failed. The
//! staged ciphertext survives only an authentication failure (wrong
//! passphrase or tampering), and [`Unsealer::retry`] picks it up again.
//!
//! Decryption writes into a second staged file, which is renamed into
//! place. The destination never sees partial plaintext.

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sealdrop_core::{ApiLocator, FileHeader, Part, SealConfig, SealError, SealResult};
use sealdrop_crypto::{CipherError, PassphraseCipher, SealCipher};
use sealdrop_storage::RemoteService;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::checksum::{checksum_file, verify_checksum};
use crate::place;
use crate::rollback;
use crate::staging::{StagedFile, StagingArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsealStage {
    Staging,
    HeaderFetched,
    BodyFetched,
    Decrypted,
    Placed,
}

impl fmt::Display for UnsealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnsealStage::Staging => "staging",
            UnsealStage::HeaderFetched => "header-fetched",
            UnsealStage::BodyFetched => "body-fetched",
            UnsealStage::Decrypted => "decrypted",
            UnsealStage::Placed => "placed",
        })
    }
}

/// Result of a successful unseal
#[derive(Debug, Clone)]
pub struct UnsealOutcome {
    pub path: PathBuf,
    pub header: FileHeader,
    /// Plaintext bytes written
    pub bytes: u64,
}

pub struct Unsealer<R, C = PassphraseCipher> {
    remote: R,
    cipher: Arc<C>,
    staging: StagingArea,
    api_base: String,
    overwrite: bool,
}

impl<R: RemoteService> Unsealer<R, PassphraseCipher> {
    /// Decryption follows the parameters recorded in each header, so the
    /// configured crypto settings only matter for sealing.
    pub fn from_config(remote: R, config: &SealConfig) -> Self {
        Self::with_cipher(remote, PassphraseCipher::from_config(&config.crypto), config)
    }
}

impl<R: RemoteService, C: SealCipher> Unsealer<R, C> {
    pub fn with_cipher(remote: R, cipher: C, config: &SealConfig) -> Self {
        Self {
            remote,
            cipher: Arc::new(cipher),
            staging: StagingArea::new(config.staging_dir()),
            api_base: config.service.api_base.clone(),
            overwrite: config.unseal.overwrite,
        }
    }

    pub fn with_staging(mut self, staging: StagingArea) -> Self {
        self.staging = staging;
        self
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Fetch and decrypt the file behind `share_url` into `dest_dir`.
    pub async fn unseal(
        &self,
        share_url: &str,
        passphrase: &SecretString,
        dest_dir: &Path,
    ) -> SealResult<UnsealOutcome> {
        let locator = ApiLocator::from_share_url(share_url, &self.api_base)?;

        let (staged, mut file) = self.staging.create().await?;
        debug!(id = %locator.id, stage = %UnsealStage::Staging, staged = %staged.path().display());

        let result = async {
            let header = self.fetch_header(&locator).await?;

            self.remote
                .get_body(&header, &mut file)
                .await
                .map_err(|e| SealError::RemoteFetch {
                    part: Part::Body,
                    message: format!("{e:#}"),
                })?;
            file.flush()
                .await
                .map_err(|e| SealError::io("flushing staged body", e))?;
            debug!(id = %locator.id, stage = %UnsealStage::BodyFetched);

            self.verify_staged(staged.path(), &header).await?;
            self.decrypt_and_place(staged.path(), header, passphrase, dest_dir)
                .await
        }
        .await;
        drop(file);

        self.finish(staged, result).await
    }

    /// Unseal again from a ciphertext kept by an earlier authentication
    /// failure. Only the header is re-fetched.
    pub async fn retry(
        &self,
        staged_path: &Path,
        share_url: &str,
        passphrase: &SecretString,
        dest_dir: &Path,
    ) -> SealResult<UnsealOutcome> {
        let locator = ApiLocator::from_share_url(share_url, &self.api_base)?;
        let staged = self.staging.adopt(staged_path).await?;
        debug!(id = %locator.id, staged = %staged.path().display(), "retrying unseal");

        let result = async {
            let header = self.fetch_header(&locator).await?;
            self.verify_staged(staged.path(), &header).await?;
            self.decrypt_and_place(staged.path(), header, passphrase, dest_dir)
                .await
        }
        .await;

        self.finish(staged, result).await
    }

    async fn fetch_header(&self, locator: &ApiLocator) -> SealResult<FileHeader> {
        let header = self
            .remote
            .get_header(locator)
            .await
            .map_err(|e| SealError::RemoteFetch {
                part: Part::Header,
                message: format!("{e:#}"),
            })?;
        debug!(id = %locator.id, stage = %UnsealStage::HeaderFetched, size = header.size);
        Ok(header)
    }

    /// Check the staged ciphertext against the checksum pinned in the header.
    /// Headers without one are accepted as-is.
    async fn verify_staged(&self, staged: &Path, header: &FileHeader) -> SealResult<()> {
        match header.checksum.as_deref() {
            Some(expected) => {
                let actual = checksum_file(staged).await?;
                verify_checksum(expected, &actual)
            }
            None => {
                debug!("header carries no checksum; skipping verification");
                Ok(())
            }
        }
    }

    async fn decrypt_and_place(
        &self,
        ciphertext: &Path,
        header: FileHeader,
        passphrase: &SecretString,
        dest_dir: &Path,
    ) -> SealResult<UnsealOutcome> {
        let (plain, plain_file) = self.staging.create().await?;

        let placed = async {
            let (name, header) = self
                .decrypt(ciphertext, plain_file, header, passphrase)
                .await?;
            debug!(stage = %UnsealStage::Decrypted, bytes = header.size);

            let dest = place::confine(dest_dir, &name)?;
            place::persist(&plain, &dest, self.overwrite).await?;
            debug!(stage = %UnsealStage::Placed, path = %dest.display());
            Ok::<_, SealError>((dest, header))
        }
        .await;

        match placed {
            Ok((path, header)) => {
                // Renamed into place; nothing left to remove.
                let _ = plain.keep();
                Ok(UnsealOutcome {
                    path,
                    bytes: header.size,
                    header,
                })
            }
            Err(e) => {
                rollback::cleanup(plain, &e).await;
                Err(e)
            }
        }
    }

    async fn decrypt(
        &self,
        ciphertext: &Path,
        plain_file: tokio::fs::File,
        header: FileHeader,
        passphrase: &SecretString,
    ) -> SealResult<(String, FileHeader)> {
        let cipher = Arc::clone(&self.cipher);
        let passphrase = SecretString::from(passphrase.expose_secret().to_string());
        let source = tokio::fs::File::open(ciphertext)
            .await
            .map_err(|e| SealError::io(format!("opening {}", ciphertext.display()), e))?
            .into_std()
            .await;
        let plain_file = plain_file.into_std().await;

        let joined = tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(source);
            let mut writer = BufWriter::new(plain_file);
            let name = cipher.decrypt(&mut reader, &mut writer, &passphrase, &header)?;
            let plain_file = writer.into_inner().map_err(|e| e.into_error())?;
            plain_file.sync_all()?;
            Ok::<_, CipherError>((name, header))
        })
        .await
        .map_err(|e| SealError::Decryption(format!("decryption task failed: {e}")))?;

        joined.map_err(|e| match e {
            CipherError::Authentication(_) => SealError::Authentication {
                staged: ciphertext.to_path_buf(),
            },
            other => SealError::Decryption(other.to_string()),
        })
    }

    /// Apply the cleanup policy to the staged ciphertext exactly once.
    async fn finish(
        &self,
        staged: StagedFile,
        result: SealResult<UnsealOutcome>,
    ) -> SealResult<UnsealOutcome> {
        match result {
            Ok(outcome) => {
                rollback::discard(staged).await;
                info!(
                    id = outcome.header.short_id().unwrap_or_default(),
                    bytes = outcome.bytes,
                    "unsealed to {}",
                    outcome.path.display()
                );
                Ok(outcome)
            }
            Err(e) if e.preserves_staged() => {
                let kept = staged.keep();
                warn!(staged = %kept.display(), "authentication failed; staged ciphertext kept for retry");
                Err(e)
            }
            Err(e) => {
                rollback::cleanup(staged, &e).await;
                Err(e)
            }
        }
    }
}
