use crate::config::{
    ClientConfig, PaginationConfig, RetryConfig, TlsRootConfig, TransportSecurity,
};
use crate::error::ApiError;
use crate::executor::{RequestExecutor, RestClient};
use crate::request::parse_base_url;
use crate::transport::build_transport;
use http::header::{HeaderName, HeaderValue};
use std::time::Duration;

/// Builder for a [`RestClient`] over the hyper transport
///
/// ```rust,ignore
/// let client = RestClient::builder()
///     .base_url("https://api.example.com/v2")
///     .timeout(Duration::from_secs(10))
///     .default_header(AUTHORIZATION, HeaderValue::from_static("Bearer t0ken"))
///     .build()?;
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    default_headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a builder from a loaded configuration
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            default_headers: Vec::new(),
        }
    }

    /// Set the base URL every request path is resolved against
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the per-attempt timeout
    ///
    /// Each retry attempt gets its own timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the total timeout spanning all attempts and backoff sleeps
    ///
    /// On expiry the call fails with `ApiError::DeadlineExceeded(total_timeout)`.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Send every request exactly once
    #[must_use]
    pub fn no_retries(self) -> Self {
        self.retry(RetryConfig::disabled())
    }

    /// Attach a generated `Idempotency-Key` to POST/PUT/PATCH requests
    #[must_use]
    pub fn auto_idempotency_keys(mut self, enabled: bool) -> Self {
        self.config.retry.auto_idempotency_keys = enabled;
        self
    }

    /// Set the maximum response body size (applies to decompressed bytes)
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain `http://` base URLs (for testing only)
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "restkit_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Add a header sent with every request unless the request sets it
    ///
    /// Typical use is a static `Authorization` header. A second call with
    /// the same name replaces the earlier value.
    #[must_use]
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.retain(|(existing, _)| *existing != name);
        self.default_headers.push((name, value));
        self
    }

    #[must_use]
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.config.pagination = pagination;
        self
    }

    /// Set the idle connection timeout for the connection pool
    ///
    /// `None` keeps idle connections indefinitely. Default: 90 seconds.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host (0 disables reuse)
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `ApiError::InvalidUri` for a malformed base URL,
    /// `ApiError::InvalidScheme` if the scheme is not allowed by the transport
    /// security mode, or the transport construction error (TLS, user agent).
    pub fn build(self) -> Result<RestClient, ApiError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let base_url = parse_base_url(&self.config.base_url)?;
        match (base_url.scheme(), self.config.transport) {
            ("https", _) | ("http", TransportSecurity::AllowInsecureHttp) => {}
            ("http", TransportSecurity::TlsOnly) => {
                return Err(ApiError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                });
            }
            (other, _) => {
                return Err(ApiError::InvalidScheme {
                    scheme: other.to_owned(),
                    reason: "only http and https are supported".to_owned(),
                });
            }
        }

        let transport = build_transport(&self.config, self.default_headers)?;
        RequestExecutor::from_config(transport, &self.config)
    }
}

impl RestClient {
    /// Start building a client over the hyper transport
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}
