//! Rate limiting implementation
//!
//! Two halves: a proactive client-side token bucket (governor) and the
//! reactive side, which reads the server's rate-limit headers and works out
//! how long to wait before retrying a throttled request.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for client-side rate limiting
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per second
    pub requests_per_second: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }
}

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit, returning immediately
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

// ============================================================================
// Server-declared rate limit state
// ============================================================================

/// Rate limit headers of a single response. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// `X-RateLimit-Limit`
    pub limit: Option<u32>,
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u32>,
    /// `X-RateLimit-Reset`, Unix epoch seconds
    pub reset: Option<i64>,
    /// `Retry-After`, seconds
    pub retry_after: Option<u64>,
}

impl RateLimitState {
    /// Read the rate limit headers of a response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: read_header(headers, "x-ratelimit-limit"),
            remaining: read_header(headers, "x-ratelimit-remaining"),
            reset: read_header(headers, "x-ratelimit-reset"),
            retry_after: read_header(headers, "retry-after"),
        }
    }

    /// How long to wait before retrying, given the current epoch
    ///
    /// `Retry-After` wins when present, otherwise the wait runs one second past
    /// the reset epoch. Never shorter than `min_wait`.
    pub fn wait_duration(&self, now_epoch: i64, min_wait: Duration) -> Duration {
        let declared = match (self.retry_after, self.reset) {
            (Some(retry_after), _) => retry_after,
            (None, Some(reset)) => u64::try_from(reset - now_epoch + 1).unwrap_or(0),
            (None, None) => 0,
        };
        Duration::from_secs(declared).max(min_wait)
    }
}

fn read_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Check whether a response signals rate limiting
///
/// A 429 always does. A 403 only does when its body mentions the rate limit;
/// other 403s are permission errors.
pub fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => body.to_lowercase().contains("rate limit"),
        _ => false,
    }
}
