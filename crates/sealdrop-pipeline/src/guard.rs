use sealdrop_core::config::LimitsConfig;
use sealdrop_core::{SealError, SealResult};

/// Reject a plaintext strictly larger than the configured limit. A file of
/// exactly the limit passes.
pub fn check_size(size: u64, limits: &LimitsConfig) -> SealResult<()> {
    if size > limits.max_file_size_bytes() {
        return Err(SealError::SizeLimitExceeded {
            size,
            limit_mb: limits.max_file_size_mb,
        });
    }
    Ok(())
}
