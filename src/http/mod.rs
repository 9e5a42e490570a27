//! HTTP client module
//!
//! Provides the rate-limited transport used by every paginator.
//!
//! # Features
//!
//! - **Rate Limit Waits**: 403/429 throttling sleeps until the declared reset
//! - **Bounded Retries**: 5xx and connection faults back off exponentially
//! - **Fail Fast**: other 4xx responses surface immediately
//! - **Pluggable Time**: all waits go through a [`Sleeper`]

mod client;
mod rate_limit;
mod sleeper;

pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, JsonResponse, RawResponse, RequestConfig,
    DEFAULT_BASE_URL,
};
pub use rate_limit::{is_rate_limited, RateLimitState, RateLimiter, RateLimiterConfig};
pub use sleeper::{Sleeper, TokioSleeper};
