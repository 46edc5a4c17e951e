//! Temp staging area: a private directory of randomly named scratch files.
//!
//! Staged files are named `<32-char token>.enn`. The token is drawn from the
//! OS random source, so concurrent pipelines never share a file and need no
//! coordination beyond the (idempotent) directory creation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sealdrop_core::link::is_url_safe;
use sealdrop_core::{SealError, SealResult, STAGED_SUFFIX};

/// Length of a staged file token
pub const TOKEN_LEN: usize = 32;

/// 24 random bytes encode to exactly 32 base64url characters
const TOKEN_BYTES: usize = 24;

/// Source of staged file tokens
pub trait TokenSource: Send + Sync {
    fn token(&self) -> SealResult<String>;
}

/// Tokens from the operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn token(&self) -> SealResult<String> {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|e| SealError::RandomSource(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}

/// A file in the staging area owned by one pipeline invocation.
///
/// Dropping it leaves the file on disk; the pipeline hands it to
/// [`crate::rollback`] or calls [`StagedFile::keep`].
#[must_use = "a staged file must be cleaned up, discarded, or kept"]
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give up ownership and leave the file where it is.
    pub fn keep(self) -> PathBuf {
        self.path
    }

    pub(crate) async fn remove(self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// A leftover staged file found by [`StagingArea::list`]
#[derive(Debug, Clone)]
pub struct StagedEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Clone)]
pub struct StagingArea {
    dir: PathBuf,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea").field("dir", &self.dir).finish()
    }
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_token_source(dir, Arc::new(OsTokenSource))
    }

    pub fn with_token_source(dir: impl Into<PathBuf>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            dir: dir.into(),
            tokens,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> SealResult<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&self.dir).await.map_err(|e| {
            SealError::io(format!("creating staging dir {}", self.dir.display()), e)
        })
    }

    /// Create a new empty staged file, open for read and write.
    pub async fn create(&self) -> SealResult<(StagedFile, tokio::fs::File)> {
        self.ensure_dir().await?;
        let token = self.tokens.token()?;
        let path = self.dir.join(format!("{token}.{STAGED_SUFFIX}"));

        let mut options = tokio::fs::OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let file = options
            .open(&path)
            .await
            .map_err(|e| SealError::io(format!("creating staged file {}", path.display()), e))?;

        tracing::trace!(path = %path.display(), "staged file created");
        Ok((StagedFile { path }, file))
    }

    /// Take ownership of a staged file left behind by an earlier invocation.
    ///
    /// Only `<token>.enn` regular files directly inside this staging
    /// directory are accepted.
    pub async fn adopt(&self, path: &Path) -> SealResult<StagedFile> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_staged_name(n))
            .ok_or_else(|| not_staged(path, "name is not a staged file name"))?;

        let dir = tokio::fs::canonicalize(&self.dir).await.map_err(|e| {
            SealError::io(format!("resolving staging dir {}", self.dir.display()), e)
        })?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let parent = tokio::fs::canonicalize(parent)
            .await
            .map_err(|e| SealError::io(format!("resolving {}", parent.display()), e))?;
        if parent != dir {
            return Err(not_staged(path, "not inside the staging directory"));
        }

        let adopted = dir.join(name);
        let meta = tokio::fs::symlink_metadata(&adopted)
            .await
            .map_err(|e| SealError::io(format!("stat {}", adopted.display()), e))?;
        if !meta.is_file() {
            return Err(not_staged(path, "not a regular file"));
        }
        Ok(StagedFile { path: adopted })
    }

    /// Staged files currently on disk, sorted by path. A missing staging
    /// directory has none.
    pub async fn list(&self) -> SealResult<Vec<StagedEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(SealError::io(
                    format!("reading staging dir {}", self.dir.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SealError::io(format!("reading staging dir {}", self.dir.display()), e))?
        {
            let name = entry.file_name();
            if !name.to_str().is_some_and(is_staged_name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            entries.push(StagedEntry {
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().ok(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Delete every staged file. Returns how many were removed.
    pub async fn purge(&self) -> SealResult<usize> {
        let mut removed = 0;
        for entry in self.list().await? {
            StagedFile { path: entry.path }
                .remove()
                .await
                .map_err(|e| SealError::io("purging staged file", e))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// `<TOKEN_LEN url-safe chars>.enn`
pub fn is_staged_name(name: &str) -> bool {
    name.strip_suffix(STAGED_SUFFIX)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|token| token.len() == TOKEN_LEN && is_url_safe(token))
}

fn not_staged(path: &Path, reason: &str) -> SealError {
    SealError::io(
        format!("adopting {}", path.display()),
        std::io::Error::new(ErrorKind::InvalidInput, reason.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct NoEntropy;

    impl TokenSource for NoEntropy {
        fn token(&self) -> SealResult<String> {
            Err(SealError::RandomSource("entropy pool unavailable".into()))
        }
    }

    #[tokio::test]
    async fn create_makes_dir_and_unique_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("a/b/staging"));

        let mut names = HashSet::new();
        for _ in 0..20 {
            let (staged, _file) = area.create().await.unwrap();
            let name = staged.path().file_name().unwrap().to_str().unwrap().to_string();
            assert!(is_staged_name(&name), "{name}");
            assert!(names.insert(name));
            let _ = staged.keep();
        }
        assert_eq!(area.list().await.unwrap().len(), 20);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn permissions_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        let (staged, _file) = area.create().await.unwrap();

        let dir_mode = std::fs::metadata(area.dir()).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o077, 0, "dir mode {dir_mode:o}");
        assert_eq!(file_mode & 0o077, 0, "file mode {file_mode:o}");
        staged.remove().await.unwrap();
    }

    #[tokio::test]
    async fn random_source_failure_creates_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let area = StagingArea::with_token_source(tmp.path().join("staging"), Arc::new(NoEntropy));

        let err = area.create().await.unwrap_err();
        assert!(matches!(err, SealError::RandomSource(_)));
        assert!(area.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unwritable_dir_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = StagingArea::new(blocker.join("staging")).create().await.unwrap_err();
        assert!(matches!(err, SealError::Io { .. }));
    }

    #[tokio::test]
    async fn adopt_accepts_only_own_staged_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        let (staged, _file) = area.create().await.unwrap();
        let path = staged.keep();

        let adopted = area.adopt(&path).await.unwrap();
        assert_eq!(adopted.path().file_name(), path.file_name());

        let outside = tmp.path().join(path.file_name().unwrap());
        std::fs::write(&outside, b"x").unwrap();
        assert!(area.adopt(&outside).await.is_err());

        let wrong_name = area.dir().join("notes.txt");
        std::fs::write(&wrong_name, b"x").unwrap();
        assert!(area.adopt(&wrong_name).await.is_err());

        let sneaky = area.dir().join("..").join("staging").join("..").join(path.file_name().unwrap());
        assert!(area.adopt(&sneaky).await.is_err());
    }

    #[tokio::test]
    async fn list_ignores_foreign_files_and_purge_removes_staged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        assert!(area.list().await.unwrap().is_empty(), "missing dir lists empty");

        for _ in 0..3 {
            let (staged, _file) = area.create().await.unwrap();
            let _ = staged.keep();
        }
        std::fs::write(area.dir().join("README"), b"keep me").unwrap();

        assert_eq!(area.list().await.unwrap().len(), 3);
        assert_eq!(area.purge().await.unwrap(), 3);
        assert!(area.list().await.unwrap().is_empty());
        assert!(area.dir().join("README").exists());
    }

    #[test]
    fn staged_name_shape() {
        let token = "A".repeat(TOKEN_LEN);
        assert!(is_staged_name(&format!("{token}.enn")));
        assert!(!is_staged_name(&format!("{token}.txt")));
        assert!(!is_staged_name(&format!("{token}enn")));
        assert!(!is_staged_name("short.enn"));
        assert!(!is_staged_name(&format!("{}.enn", "/".repeat(TOKEN_LEN))));
    }

    #[test]
    fn os_tokens_are_url_safe_and_fixed_length() {
        let token = OsTokenSource.token().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(is_url_safe(&token));
    }
}
