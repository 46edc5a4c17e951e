//! The remote service collaborator: publishes and fetches sealed files.
//!
//! Every call is all-or-nothing from the caller's perspective: it either
//! completes or returns an error. Retries live in the operator's
//! `RetryLayer`, never in the pipelines.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use opendal::Operator;
use rand::RngCore;
use sealdrop_core::link::is_url_safe;
use sealdrop_core::{ApiLocator, FileHeader, STAGED_SUFFIX};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes moved per read/write call when streaming bodies
const PIECE_SIZE: usize = 256 * 1024;

/// Random bytes behind a short id (8 bytes -> 11 base64url chars)
const SHORT_ID_BYTES: usize = 8;

/// Attempts at drawing an unused short id before giving up
const MAX_ID_ATTEMPTS: usize = 4;

/// Writer chunking for bodies, large enough for S3 multipart part minimums
const UPLOAD_CHUNK: usize = 8 * 1024 * 1024;

pub trait RemoteService: Send + Sync {
    /// Publish a header. Returns it completed with the service-assigned
    /// `short_id`, `upload_url` and `download_url`.
    fn put_header(&self, header: &FileHeader) -> impl Future<Output = Result<FileHeader>> + Send;

    /// Upload the ciphertext body for a header returned by `put_header`.
    fn put_body<R>(
        &self,
        header: &FileHeader,
        body: &mut R,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        R: AsyncRead + Unpin + Send;

    fn get_header(&self, locator: &ApiLocator) -> impl Future<Output = Result<FileHeader>> + Send;

    /// Stream the ciphertext body into `sink`. Returns bytes written.
    fn get_body<W>(
        &self,
        header: &FileHeader,
        sink: &mut W,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    /// Remove a published header and any body stored for it.
    fn abandon_header(&self, header: &FileHeader) -> impl Future<Output = Result<()>> + Send;
}

impl<T: RemoteService> RemoteService for Arc<T> {
    fn put_header(&self, header: &FileHeader) -> impl Future<Output = Result<FileHeader>> + Send {
        (**self).put_header(header)
    }

    fn put_body<R>(
        &self,
        header: &FileHeader,
        body: &mut R,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        R: AsyncRead + Unpin + Send,
    {
        (**self).put_body(header, body)
    }

    fn get_header(&self, locator: &ApiLocator) -> impl Future<Output = Result<FileHeader>> + Send {
        (**self).get_header(locator)
    }

    fn get_body<W>(
        &self,
        header: &FileHeader,
        sink: &mut W,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        W: AsyncWrite + Unpin + Send,
    {
        (**self).get_body(header, sink)
    }

    fn abandon_header(&self, header: &FileHeader) -> impl Future<Output = Result<()>> + Send {
        (**self).abandon_header(header)
    }
}

/// `RemoteService` over any OpenDAL operator
#[derive(Clone)]
pub struct OpendalRemote {
    op: Operator,
    prefix: String,
}

impl OpendalRemote {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn header_path(&self, id: &str) -> String {
        format!("{}/headers/{id}.json", self.prefix)
    }

    fn body_path(&self, id: &str) -> String {
        format!("{}/bodies/{id}.{STAGED_SUFFIX}", self.prefix)
    }

    /// Resolve the body path for a header, refusing locators that do not
    /// point at this service's body for the header's own id.
    fn resolve_body(&self, header: &FileHeader, url: Option<&str>, which: &str) -> Result<String> {
        let id = header
            .short_id()
            .context("header has no short_id; it was never published")?;
        if !is_url_safe(id) || id.is_empty() {
            anyhow::bail!("header short_id {id:?} is not URL-safe");
        }
        let expected = self.body_path(id);
        match url {
            Some(url) if url == expected => Ok(expected),
            Some(url) => anyhow::bail!("header {which} {url:?} does not match {expected:?}"),
            None => anyhow::bail!("header has no {which}"),
        }
    }

    async fn fresh_id(&self) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let mut raw = [0u8; SHORT_ID_BYTES];
            rand::thread_rng().fill_bytes(&mut raw);
            let id = URL_SAFE_NO_PAD.encode(raw);
            let taken = self
                .op
                .exists(&self.header_path(&id))
                .await
                .context("checking short id availability")?;
            if !taken {
                return Ok(id);
            }
            tracing::debug!(id = %id, "short id collision, drawing another");
        }
        anyhow::bail!("no free short id after {MAX_ID_ATTEMPTS} attempts")
    }
}

impl RemoteService for OpendalRemote {
    async fn put_header(&self, header: &FileHeader) -> Result<FileHeader> {
        let id = self.fresh_id().await?;
        let body = self.body_path(&id);
        let published = header.clone().with_locator(&id, &body, &body);

        let path = self.header_path(&id);
        self.op
            .write(&path, published.to_bytes()?)
            .await
            .with_context(|| format!("writing header {path}"))?;

        tracing::debug!(id = %id, path = %path, "header published");
        Ok(published)
    }

    async fn put_body<R>(&self, header: &FileHeader, body: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.resolve_body(header, header.upload_url.as_deref(), "upload_url")?;
        let mut writer = self
            .op
            .writer_with(&path)
            .chunk(UPLOAD_CHUNK)
            .await
            .with_context(|| format!("opening writer for {path}"))?;

        let mut buf = vec![0u8; PIECE_SIZE];
        let mut sent = 0u64;
        loop {
            let n = match body.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e).context("reading staged body");
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(e).with_context(|| format!("uploading {path}"));
            }
            sent += n as u64;
        }
        writer
            .close()
            .await
            .with_context(|| format!("finishing upload of {path}"))?;

        tracing::debug!(path = %path, bytes = sent, "body published");
        Ok(sent)
    }

    async fn get_header(&self, locator: &ApiLocator) -> Result<FileHeader> {
        if !is_url_safe(&locator.id) || locator.id.is_empty() {
            anyhow::bail!("locator id {:?} is not URL-safe", locator.id);
        }
        let path = self.header_path(&locator.id);
        let data = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading header {path}"))?;
        let header = FileHeader::from_bytes(&data.to_bytes())
            .with_context(|| format!("decoding header {path}"))?;

        if header.short_id() != Some(locator.id.as_str()) {
            anyhow::bail!(
                "header at {path} carries short_id {:?}, expected {:?}",
                header.short_id(),
                locator.id
            );
        }
        Ok(header)
    }

    async fn get_body<W>(&self, header: &FileHeader, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let path = self.resolve_body(header, header.download_url.as_deref(), "download_url")?;
        let meta = self
            .op
            .stat(&path)
            .await
            .with_context(|| format!("stat {path}"))?;
        let len = meta.content_length();
        if len != header.ciphertext_size {
            anyhow::bail!(
                "remote body {path} is {len} bytes, header declares {}",
                header.ciphertext_size
            );
        }

        let reader = self
            .op
            .reader(&path)
            .await
            .with_context(|| format!("opening reader for {path}"))?;
        let mut offset = 0u64;
        while offset < len {
            let end = (offset + PIECE_SIZE as u64).min(len);
            let piece = reader
                .read(offset..end)
                .await
                .with_context(|| format!("downloading {path} at {offset}"))?;
            sink.write_all(&piece.to_bytes())
                .await
                .context("writing staged body")?;
            offset = end;
        }
        sink.flush().await.context("flushing staged body")?;

        tracing::debug!(path = %path, bytes = len, "body fetched");
        Ok(len)
    }

    async fn abandon_header(&self, header: &FileHeader) -> Result<()> {
        let id = header
            .short_id()
            .context("header has no short_id; nothing to abandon")?;
        let header_path = self.header_path(id);
        let body_path = self.body_path(id);
        self.op
            .delete(&body_path)
            .await
            .with_context(|| format!("deleting {body_path}"))?;
        self.op
            .delete(&header_path)
            .await
            .with_context(|| format!("deleting {header_path}"))?;
        tracing::info!(id = %id, "abandoned published header");
        Ok(())
    }
}
