//! HTTP client with retry and rate limiting
//!
//! Provides the transport every paginator goes through. It handles:
//! - Rate limiting: sleeps until the server-declared reset, unbounded in count
//! - Transient faults (5xx, connect errors, timeouts): capped exponential
//!   backoff with jitter, bounded by `max_retries`
//! - Client faults (other 4xx): raised immediately, never retried
//! - A fixed pause after every success to stay under secondary limits

use super::rate_limit::{is_rate_limited, RateLimitState, RateLimiter, RateLimiterConfig};
use super::sleeper::{Sleeper, TokioSleeper};
use crate::error::{is_retryable_status, Error, Result};
use crate::types::StringMap;
use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Configuration for the HTTP client
#[derive(Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative paths
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries for transient faults
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
    /// Upper bound on the backoff delay (jitter excluded)
    pub max_backoff: Duration,
    /// Upper bound of the uniform jitter added to each backoff
    pub jitter: Duration,
    /// Pause after each successful response
    pub request_delay: Duration,
    /// Floor for rate limit waits
    pub min_rate_limit_wait: Duration,
    /// Client-side rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
    /// Bearer token sent in the Authorization header
    pub token: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        let mut default_headers = HashMap::new();
        default_headers.insert(
            "Accept".to_string(),
            "application/vnd.github+json".to_string(),
        );

        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(30),
            max_retries: 6,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: Duration::from_millis(1500),
            request_delay: Duration::from_millis(300),
            min_rate_limit_wait: Duration::from_secs(5),
            rate_limit: None,
            default_headers,
            user_agent: format!("repo-harvest/{}", env!("CARGO_PKG_VERSION")),
            token: None,
        }
    }
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("jitter", &self.jitter)
            .field("request_delay", &self.request_delay)
            .field("min_rate_limit_wait", &self.min_rate_limit_wait)
            .field("rate_limit", &self.rate_limit)
            .field("default_headers", &self.default_headers)
            .field("user_agent", &self.user_agent)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max retries for transient faults
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff bounds
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set the jitter upper bound
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Set the pause after each successful response
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.config.request_delay = delay;
        self
    }

    /// Set the floor for rate limit waits
    pub fn min_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.config.min_rate_limit_wait = wait;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set the bearer token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: StringMap,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Override timeout for this request
    pub timeout: Option<Duration>,
    /// Override max retries for this request
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add every parameter of a map
    #[must_use]
    pub fn query_map(mut self, params: &StringMap) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set max retries
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// A response whose body has been read in full
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code
    pub status: StatusCode,
    /// Final request URL
    pub url: String,
    /// Response headers
    pub headers: HeaderMap,
    /// Body text
    pub body: String,
}

/// A decoded JSON response together with its headers
#[derive(Debug, Clone)]
pub struct JsonResponse {
    /// Final request URL
    pub url: String,
    /// Response headers (pagination links, rate limit state)
    pub headers: HeaderMap,
    /// Parsed body
    pub body: Value,
}

/// HTTP client with retry and rate limiting
///
/// Cloning is cheap and shares the connection pool, so every paginator of a
/// job can hold its own handle.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<HttpClientConfig>,
    rate_limiter: Option<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config: Arc::new(config),
            rate_limiter,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the time source
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<RawResponse> {
        self.request(Method::GET, url, RequestConfig::default())
            .await
    }

    /// Make a GET request with config
    pub async fn get_with_config(&self, url: &str, config: RequestConfig) -> Result<RawResponse> {
        self.request(Method::GET, url, config).await
    }

    /// Make a request, retrying until success or a non-retryable failure
    ///
    /// The body is read inside the retry loop, so a connection dropped while
    /// the body is streaming is retried like any other transport fault.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<RawResponse> {
        let full_url = self.build_url(url)?;
        let max_retries = config.max_retries.unwrap_or(self.config.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut retries = 0u32;

        loop {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let req = self.build_request(&method, &full_url, &config, timeout);

            let response = match read_response(req).await {
                Ok(response) => response,
                Err(e) => {
                    let message = e.to_string();
                    let err = Error::Http(e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if retries < max_retries {
                        let delay = self.retry_delay(retries);
                        warn!(
                            "Transport error ({message}), attempt {}/{}, retrying in {:.1}s",
                            retries + 1,
                            max_retries + 1,
                            delay.as_secs_f64()
                        );
                        self.sleeper.sleep(delay).await;
                        retries += 1;
                        continue;
                    }
                    return Err(Error::fetch_failure(
                        full_url.as_str(),
                        None,
                        retries + 1,
                        message,
                    ));
                }
            };

            let status = response.status;
            if status.is_success() {
                debug!("Request succeeded: {} {}", method, response.url);
                self.sleeper.sleep(self.config.request_delay).await;
                return Ok(response);
            }

            if is_rate_limited(status, &response.body) {
                let state = RateLimitState::from_headers(&response.headers);
                let wait = state
                    .wait_duration(self.sleeper.now_epoch(), self.config.min_rate_limit_wait);
                warn!(
                    "Rate limited ({}) on {}, sleeping {}s",
                    status.as_u16(),
                    full_url,
                    wait.as_secs()
                );
                self.sleeper.sleep(wait).await;
                continue;
            }

            if is_retryable_status(status.as_u16()) {
                if retries < max_retries {
                    let delay = self.retry_delay(retries);
                    warn!(
                        "Request failed with {}, attempt {}/{}, retrying in {:.1}s",
                        status.as_u16(),
                        retries + 1,
                        max_retries + 1,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                    retries += 1;
                    continue;
                }
                return Err(Error::fetch_failure(
                    full_url.as_str(),
                    Some(status.as_u16()),
                    retries + 1,
                    truncate(&response.body),
                ));
            }

            return Err(Error::request_rejected(
                full_url.as_str(),
                status.as_u16(),
                &response.body,
            ));
        }
    }

    /// Make a GET request and decode the body as JSON, keeping the headers
    pub async fn get_json_response(&self, url: &str, config: RequestConfig) -> Result<JsonResponse> {
        let response = self.get_with_config(url, config).await?;
        let body = serde_json::from_str(&response.body).map_err(|e| {
            Error::unexpected_shape(&response.url, format!("body is not valid JSON: {e}"))
        })?;

        Ok(JsonResponse {
            url: response.url,
            headers: response.headers,
            body,
        })
    }

    /// Make a GET request and parse the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get_json_response(url, RequestConfig::default()).await?;
        serde_json::from_value(response.body)
            .map_err(|e| Error::unexpected_shape(response.url, e.to_string()))
    }

    /// Check if client-side rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                Ok(Url::parse(&format!("{base}/{path}"))?)
            }
            None => Ok(Url::parse(path)?),
        }
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        config: &RequestConfig,
        timeout: Duration,
    ) -> RequestBuilder {
        let mut req = self.client.request(method.clone(), url.clone());

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(ref token) = self.config.token {
            req = req.bearer_auth(token);
        }
        for (key, value) in &config.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            req = req.query(&config.query);
        }

        req.timeout(timeout)
    }

    /// Calculate backoff delay for a given retry, jitter excluded
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        std::cmp::min(
            self.config.initial_backoff.saturating_mul(factor),
            self.config.max_backoff,
        )
    }

    /// Backoff for a retry plus uniform jitter
    pub(crate) fn retry_delay(&self, retry: u32) -> Duration {
        let backoff = self.calculate_backoff(retry);
        let max_jitter = self.config.jitter.as_secs_f64();
        if max_jitter <= 0.0 {
            return backoff;
        }
        backoff + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max_jitter))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .field("sleeper", &self.sleeper)
            .finish_non_exhaustive()
    }
}

/// Send a request and read its whole body
async fn read_response(req: RequestBuilder) -> reqwest::Result<RawResponse> {
    let response = req.send().await?;
    let status = response.status();
    let url = response.url().to_string();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(RawResponse {
        status,
        url,
        headers,
        body,
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(crate::error::MAX_ERROR_BODY_CHARS).collect()
}
