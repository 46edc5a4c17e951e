//! Cleanup of staged files on the way out of a pipeline.
//!
//! Removal is best-effort: a failure is logged and never replaces the error
//! the caller is about to see.

use sealdrop_core::SealError;

use crate::staging::StagedFile;

/// Remove a staged file after `cause` aborted the pipeline.
pub async fn cleanup(staged: StagedFile, cause: &SealError) {
    let path = staged.path().to_path_buf();
    match staged.remove().await {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            stage = cause.stage(),
            "removed staged file after failure"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            stage = cause.stage(),
            error = %e,
            "could not remove staged file; original error still returned"
        ),
    }
}

/// Remove a staged file that is no longer needed after success.
pub async fn discard(staged: StagedFile) {
    let path = staged.path().to_path_buf();
    if let Err(e) = staged.remove().await {
        tracing::warn!(path = %path.display(), error = %e, "could not remove staged file");
    }
}
