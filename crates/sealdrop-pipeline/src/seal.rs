//! Outbound pipeline: plaintext file → published header + body → share link

use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sealdrop_core::config::LimitsConfig;
use sealdrop_core::{FileHeader, Part, SealConfig, SealError, SealResult, ShareLink};
use sealdrop_crypto::{PassphraseCipher, SealCipher};
use sealdrop_storage::RemoteService;
use tracing::{debug, info, warn};

use crate::checksum::checksum_file;
use crate::guard::check_size;
use crate::rollback;
use crate::staging::StagingArea;

/// Result of a successful seal
#[derive(Debug, Clone)]
pub struct SealOutcome {
    pub link: ShareLink,
    /// The header as published, with service-assigned locator fields
    pub header: FileHeader,
    /// BLAKE3 of the published ciphertext (hex)
    pub checksum: String,
    /// Plaintext bytes sealed
    pub bytes: u64,
}

pub struct Sealer<R, C = PassphraseCipher> {
    remote: R,
    cipher: Arc<C>,
    staging: StagingArea,
    limits: LimitsConfig,
    share_base: String,
}

impl<R: RemoteService> Sealer<R, PassphraseCipher> {
    pub fn from_config(remote: R, config: &SealConfig) -> Self {
        Self::with_cipher(remote, PassphraseCipher::from_config(&config.crypto), config)
    }
}

impl<R: RemoteService, C: SealCipher> Sealer<R, C> {
    pub fn with_cipher(remote: R, cipher: C, config: &SealConfig) -> Self {
        Self {
            remote,
            cipher: Arc::new(cipher),
            staging: StagingArea::new(config.staging_dir()),
            limits: config.limits.clone(),
            share_base: config.service.share_base.clone(),
        }
    }

    pub fn with_staging(mut self, staging: StagingArea) -> Self {
        self.staging = staging;
        self
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Seal `source` under `passphrase` and publish it.
    ///
    /// Nothing is staged or sent before the size guard passes. Any failure
    /// after staging removes the staged file before returning. A body
    /// upload failure after a published header leaves that header on the
    /// remote; see [`RemoteService::abandon_header`].
    pub async fn seal(&self, source: &Path, passphrase: &SecretString) -> SealResult<SealOutcome> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| SealError::io(format!("opening {}", source.display()), e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| SealError::io(format!("stat {}", source.display()), e))?;
        if !meta.is_file() {
            return Err(SealError::io(
                format!("sealing {}", source.display()),
                std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        check_size(meta.len(), &self.limits)?;

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SealError::io(
                    format!("sealing {}", source.display()),
                    std::io::Error::new(ErrorKind::InvalidInput, "file name is not valid UTF-8"),
                )
            })?
            .to_string();

        let (staged, staged_file) = self.staging.create().await?;
        let result = self
            .publish(staged.path(), file, staged_file, name, passphrase)
            .await;

        match result {
            Ok(outcome) => {
                rollback::discard(staged).await;
                info!(
                    id = outcome.link.id(),
                    bytes = outcome.bytes,
                    ciphertext = outcome.header.ciphertext_size,
                    "sealed {}",
                    source.display()
                );
                Ok(outcome)
            }
            Err(e) => {
                rollback::cleanup(staged, &e).await;
                Err(e)
            }
        }
    }

    /// Steps 3..=7: encrypt into the staged file, pin its checksum, publish.
    async fn publish(
        &self,
        staged: &Path,
        source: tokio::fs::File,
        staged_file: tokio::fs::File,
        name: String,
        passphrase: &SecretString,
    ) -> SealResult<SealOutcome> {
        let header = self.encrypt(source, staged_file, name, passphrase).await?;
        debug!(staged = %staged.display(), size = header.size, "encrypted into staged file");

        let checksum = checksum_file(staged).await?;
        let header = header.with_checksum(&checksum);

        let published = self
            .remote
            .put_header(&header)
            .await
            .map_err(|e| SealError::RemotePublish {
                part: Part::Header,
                message: format!("{e:#}"),
            })?;
        let id = published
            .short_id()
            .ok_or_else(|| SealError::RemotePublish {
                part: Part::Header,
                message: "service assigned no short id".into(),
            })?
            .to_string();

        let mut body = tokio::fs::File::open(staged)
            .await
            .map_err(|e| SealError::io(format!("reopening {}", staged.display()), e))?;
        if let Err(e) = self.remote.put_body(&published, &mut body).await {
            warn!(
                id = %id,
                "body upload failed after header was published; remote header is dangling"
            );
            return Err(SealError::RemotePublish {
                part: Part::Body,
                message: format!("{e:#}"),
            });
        }

        Ok(SealOutcome {
            link: ShareLink::new(&self.share_base, &id),
            bytes: published.size,
            header: published,
            checksum,
        })
    }

    async fn encrypt(
        &self,
        source: tokio::fs::File,
        staged_file: tokio::fs::File,
        name: String,
        passphrase: &SecretString,
    ) -> SealResult<FileHeader> {
        let cipher = Arc::clone(&self.cipher);
        let passphrase = SecretString::from(passphrase.expose_secret().to_string());
        let source = source.into_std().await;
        let staged_file = staged_file.into_std().await;

        tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(source);
            let mut writer = BufWriter::new(staged_file);
            let header = cipher.encrypt(&mut reader, &mut writer, &name, &passphrase)?;
            let staged_file = writer.into_inner().map_err(|e| e.into_error())?;
            staged_file.sync_all()?;
            Ok::<_, sealdrop_crypto::CipherError>(header)
        })
        .await
        .map_err(|e| SealError::Encryption(format!("encryption task failed: {e}")))?
        .map_err(|e| SealError::Encryption(e.to_string()))
    }
}
