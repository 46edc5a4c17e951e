//! Shared fixtures: fast config, in-memory remote, and fault injection.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use sealdrop_core::{ApiLocator, FileHeader, SealConfig};
use sealdrop_pipeline::{Sealer, Unsealer};
use sealdrop_storage::{memory_operator, OpendalRemote, RemoteService};
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub const SHARE_BASE: &str = "https://share.example";

/// Config with cheap Argon2 parameters and a staging dir under `root`
pub fn fast_config(root: &Path) -> SealConfig {
    let mut config = SealConfig::default();
    config.staging.dir = root.join("staging");
    config.service.share_base = SHARE_BASE.into();
    config.service.api_base = "https://api.share.example".into();
    config.crypto.argon2_mem_cost_kib = 1024;
    config.crypto.argon2_time_cost = 1;
    config.crypto.argon2_parallelism = 1;
    config.crypto.chunk_size_kib = 4;
    config
}

pub fn pass(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

pub fn staged_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Which remote call should fail
#[derive(Default)]
pub struct Faults {
    pub put_header: AtomicBool,
    pub put_body: AtomicBool,
    pub get_header: AtomicBool,
    pub get_body: AtomicBool,
    /// Flip one byte of every fetched body
    pub corrupt_body: AtomicBool,
}

#[derive(Default)]
pub struct Calls {
    pub put_header: AtomicUsize,
    pub put_body: AtomicUsize,
    pub get_header: AtomicUsize,
    pub get_body: AtomicUsize,
}

/// In-memory remote that fails chosen calls and counts every call
pub struct FaultyRemote {
    pub inner: OpendalRemote,
    pub faults: Faults,
    pub calls: Calls,
}

impl FaultyRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: OpendalRemote::new(memory_operator().expect("memory operator"), "test"),
            faults: Faults::default(),
            calls: Calls::default(),
        })
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Number of objects stored under the remote prefix
    pub async fn object_count(&self) -> usize {
        self.inner
            .operator()
            .list_with("test/")
            .recursive(true)
            .await
            .map(|entries| entries.iter().filter(|e| !e.path().ends_with('/')).count())
            .unwrap_or(0)
    }
}

fn injected(what: &str) -> anyhow::Error {
    anyhow::anyhow!("injected {what} failure")
}

impl RemoteService for FaultyRemote {
    async fn put_header(&self, header: &FileHeader) -> Result<FileHeader> {
        self.calls.put_header.fetch_add(1, Ordering::SeqCst);
        if self.faults.put_header.load(Ordering::SeqCst) {
            return Err(injected("put_header"));
        }
        self.inner.put_header(header).await
    }

    async fn put_body<R>(&self, header: &FileHeader, body: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.calls.put_body.fetch_add(1, Ordering::SeqCst);
        if self.faults.put_body.load(Ordering::SeqCst) {
            return Err(injected("put_body"));
        }
        self.inner.put_body(header, body).await
    }

    async fn get_header(&self, locator: &ApiLocator) -> Result<FileHeader> {
        self.calls.get_header.fetch_add(1, Ordering::SeqCst);
        if self.faults.get_header.load(Ordering::SeqCst) {
            return Err(injected("get_header"));
        }
        self.inner.get_header(locator).await
    }

    async fn get_body<W>(&self, header: &FileHeader, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.calls.get_body.fetch_add(1, Ordering::SeqCst);
        if self.faults.get_body.load(Ordering::SeqCst) {
            return Err(injected("get_body"));
        }
        if self.faults.corrupt_body.load(Ordering::SeqCst) {
            let mut body: Vec<u8> = Vec::new();
            let n = self.inner.get_body(header, &mut body).await?;
            if let Some(last) = body.last_mut() {
                *last ^= 0x01;
            }
            sink.write_all(&body).await?;
            return Ok(n);
        }
        self.inner.get_body(header, sink).await
    }

    async fn abandon_header(&self, header: &FileHeader) -> Result<()> {
        self.inner.abandon_header(header).await
    }
}

/// A temp root with a sealer and an unsealer sharing one faulty remote
pub struct Harness {
    pub tmp: TempDir,
    pub config: SealConfig,
    pub remote: Arc<FaultyRemote>,
    pub sealer: Sealer<Arc<FaultyRemote>>,
    pub unsealer: Unsealer<Arc<FaultyRemote>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut SealConfig)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = fast_config(tmp.path());
        tweak(&mut config);
        let remote = FaultyRemote::new();
        let sealer = Sealer::from_config(Arc::clone(&remote), &config);
        let unsealer = Unsealer::from_config(Arc::clone(&remote), &config);
        Self {
            tmp,
            config,
            remote,
            sealer,
            unsealer,
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.config.staging_dir()
    }

    pub fn out_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }
}
