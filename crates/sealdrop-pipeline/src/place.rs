//! Placement of recovered plaintext at its final destination.
//!
//! The logical file name comes out of a decrypted header and is untrusted:
//! it must reduce to exactly one normal path component, or placement fails
//! closed.

use std::path::{Component, Path, PathBuf};

use sealdrop_core::{SealError, SealResult};
use tracing::warn;

use crate::staging::StagedFile;

/// Join `dest_dir` with an untrusted file name, refusing anything that could
/// land outside `dest_dir`.
pub fn confine(dest_dir: &Path, name: &str) -> SealResult<PathBuf> {
    let reject = |reason: &str| SealError::placement(dest_dir, format!("{reason}: {name:?}"));

    if name.is_empty() {
        return Err(reject("empty file name"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(reject("file name contains a path separator"));
    }
    if has_drive_prefix(name) {
        return Err(reject("file name carries a drive prefix"));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(dest_dir.join(part)),
        _ => Err(reject("file name is not a single plain component")),
    }
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Move a staged plaintext file to `dest`.
///
/// The destination directory is created if absent. Without `overwrite` the
/// staged file is hard-linked to `dest`, which fails if anything already
/// sits there, and the staged name is then unlinked. With `overwrite` it is
/// renamed over `dest`. Either move fails across filesystems; the staged
/// file stays with the caller for cleanup.
pub async fn persist(staged: &StagedFile, dest: &Path, overwrite: bool) -> SealResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SealError::placement(parent, format!("creating destination dir: {e}")))?;
    }

    if overwrite {
        return tokio::fs::rename(staged.path(), dest).await.map_err(|e| {
            SealError::placement(dest, format!("renaming staged file into place: {e}"))
        });
    }

    match tokio::fs::hard_link(staged.path(), dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(SealError::placement(
                dest,
                "destination exists (set unseal.overwrite = true to replace it)",
            ));
        }
        Err(e) => {
            return Err(SealError::placement(
                dest,
                format!("linking staged file into place: {e}"),
            ));
        }
    }

    if let Err(e) = tokio::fs::remove_file(staged.path()).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(
                staged = %staged.path().display(),
                error = %e,
                "placed file but could not unlink staged copy"
            );
        }
    }
    Ok(())
}
