//! Time source for the transport
//!
//! Every wait the transport performs (rate-limit reset, backoff, inter-request
//! delay) goes through a [`Sleeper`], so tests can observe the waits without
//! actually sleeping.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Sleeps and reads the wall clock on behalf of the HTTP client
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);

    /// Current Unix epoch in seconds
    fn now_epoch(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
