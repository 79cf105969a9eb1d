use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default User-Agent string for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("restkit-http/", env!("CARGO_PKG_VERSION"));

/// Standard idempotency key header name (display form)
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Header carrying the 1-based retry number on retried attempts
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Check if HTTP method is idempotent (safe to retry) per RFC 9110.
///
/// Idempotent methods: GET, HEAD, PUT, DELETE, OPTIONS, TRACE.
/// Non-idempotent methods: POST, PATCH.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Exponential backoff configuration for retries
///
/// Computes delay as `min(initial * multiplier^attempt, max)` with optional
/// jitter. A server-provided wait hint larger than the computed delay wins,
/// capped at `max_server_delay`. See [`ExponentialBackoff::delay`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExponentialBackoff {
    /// Base delay for the first retry (default: 500ms)
    #[serde(with = "humantime_serde")]
    pub initial: Duration,

    /// Upper bound on the computed delay (default: 30s)
    #[serde(with = "humantime_serde")]
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Upper bound on a server-provided `Retry-After` / reset hint (default: 120s)
    #[serde(with = "humantime_serde")]
    pub max_server_delay: Duration,

    /// Enable jitter to prevent thundering herd (default: true)
    ///
    /// When enabled, adds random delay of 0-25% to each computed backoff.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            max_server_delay: Duration::from_secs(120),
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create fast backoff for testing (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            max_server_delay: Duration::from_secs(120),
            jitter: false,
        }
    }
}

/// Retry policy configuration
///
/// Rate-limited responses (429) are retried for every method. Transport
/// failures and server errors are retried only for idempotent methods or
/// when the request carries an `Idempotency-Key` header.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 3)
    /// Total attempts = 1 (initial) + `max_retries`
    pub max_retries: usize,

    /// Backoff strategy configuration
    pub backoff: ExponentialBackoff,

    /// Status codes that make a response retry-eligible (default: 429, 500, 502, 503, 504)
    pub retryable_statuses: BTreeSet<u16>,

    /// Master switch for automatic retries (default: true)
    ///
    /// When `false`, every request is sent exactly once.
    pub auto_retry_rate_limit: bool,

    /// Attach a generated `Idempotency-Key` to POST/PUT/PATCH requests (default: false)
    pub auto_idempotency_keys: bool,

    /// Ignore `Retry-After` and `RateLimit` reset hints and use pure backoff (default: false)
    pub ignore_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            retryable_statuses: BTreeSet::from([429, 500, 502, 503, 504]),
            auto_retry_rate_limit: true,
            auto_idempotency_keys: false,
            ignore_retry_after: false,
        }
    }
}

impl RetryConfig {
    /// Create a config that sends every request exactly once
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            auto_retry_rate_limit: false,
            ..Default::default()
        }
    }

    /// Fast retries for tests (1ms backoff, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            backoff: ExponentialBackoff::fast(),
            ..Default::default()
        }
    }

    /// Total number of attempts one `execute` call may make
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        if self.auto_retry_rate_limit {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// Offset/limit pagination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    /// Items requested per page (default: 100)
    pub page_size: u64,

    /// Upper bound on pages fetched by one traversal (default: 10 000)
    ///
    /// Guards against servers reporting an inconsistent `total`.
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10_000,
        }
    }
}

/// Transport security mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// Only `https://` base URLs are accepted (default)
    #[default]
    TlsOnly,
    /// Plain `http://` is accepted; for tests against local mock servers only
    AllowInsecureHttp,
}

/// Source of trusted TLS root certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots (default)
    #[default]
    WebPki,
    /// OS certificate store
    Native,
}

/// Client configuration
///
/// Deserializable from the application's config file:
///
/// ```yaml
/// base_url: "https://api.example.com/v2/"
/// request_timeout: "10s"
/// total_timeout: "1m"
/// retry:
///   max_retries: 5
///   backoff: { initial: "200ms", max: "20s" }
/// pagination:
///   page_size: 50
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL every request path is resolved against
    pub base_url: String,

    /// Timeout for a single attempt (default: 30s)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Hard deadline over all attempts and backoff sleeps (default: none)
    #[serde(with = "humantime_serde")]
    pub total_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MiB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    pub transport: TransportSecurity,

    pub tls_roots: TlsRootConfig,

    /// Idle pooled connections are closed after this long (default: 90s)
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle pooled connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    pub retry: RetryConfig,

    pub pagination: PaginationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            retry: RetryConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for tests against a local mock server
    ///
    /// Plain HTTP allowed, short timeouts, fast backoff without jitter.
    #[must_use]
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(5),
            transport: TransportSecurity::AllowInsecureHttp,
            retry: RetryConfig::fast(),
            ..Default::default()
        }
    }
}
