//! Storage health check

use std::time::{Duration, Instant};

use anyhow::Result;
use opendal::Operator;

/// List the prefix once and report the round-trip time.
pub async fn check_health(op: &Operator, prefix: &str) -> Result<Duration> {
    let started = Instant::now();
    let dir = format!("{}/", prefix.trim_matches('/'));
    op.list(&dir)
        .await
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))?;
    Ok(started.elapsed())
}

pub async fn is_healthy(op: &Operator, prefix: &str) -> bool {
    check_health(op, prefix).await.is_ok()
}
