//! OpenDAL Operator factory for the remote service

use anyhow::{Context, Result};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

/// S3 credentials, read from the environment by the CLI
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl StorageCredentials {
    /// `SEALDROP_ACCESS_KEY_ID`/`SEALDROP_SECRET_ACCESS_KEY`, falling back to
    /// the `AWS_*` pair.
    pub fn from_env() -> Result<Self> {
        let access_key_id = env_either("SEALDROP_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID")?;
        let secret = env_either("SEALDROP_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY")?;
        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret),
        })
    }
}

fn env_either(primary: &str, fallback: &str) -> Result<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .with_context(|| format!("neither {primary} nor {fallback} is set"))
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Path-style addressing is the opendal 0.55 default, which MinIO and
/// SeaweedFS require.
pub fn build_operator(
    endpoint: &str,
    region: &str,
    bucket: &str,
    creds: &StorageCredentials,
) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(endpoint)
        .region(region)
        .bucket(bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(creds.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator from the `[storage]` config section.
///
/// A plaintext HTTP endpoint is an error when `enforce_tls` is set and a
/// warning otherwise.
pub fn build_from_core_config(
    storage: &sealdrop_core::config::StorageConfig,
    creds: &StorageCredentials,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "storage endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "storage endpoint uses plaintext HTTP; sealed bodies are encrypted but credentials are not"
        );
    }

    build_operator(&storage.endpoint, &storage.region, &storage.bucket, creds)
}

/// In-process operator for tests and offline use
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating in-memory operator")?
        .finish())
}
