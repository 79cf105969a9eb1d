//! Request execution with retries, deadlines and cancellation
//!
//! [`RequestExecutor`] is generic over the transport seam: any tower service
//! that performs a single HTTP exchange and reports transport failures as
//! [`ApiError`]. [`RestClient`] is the executor over the hyper transport.
//!
//! Retry decisions are made by the pure [`decide`] function:
//!
//! | Outcome | Retried when |
//! |---|---|
//! | 429 | status is in `retryable_statuses`, any method |
//! | 5xx | status is in `retryable_statuses` and the request is replay-safe |
//! | network failure / attempt timeout | the request is replay-safe |
//! | anything else | never |
//!
//! A request is replay-safe when its method is idempotent or it carries an
//! `Idempotency-Key` header.

use crate::classify::classify;
use crate::config::{
    ClientConfig, PaginationConfig, RETRY_ATTEMPT_HEADER, RetryConfig, is_idempotent_method,
};
use crate::error::{ApiError, ErrorKind};
use crate::idempotency;
use crate::pager::{OffsetPager, Page, PageRequest};
use crate::request::{RequestDescriptor, parse_base_url};
use crate::response::{
    ApiResponse, ERROR_BODY_PREVIEW_LIMIT, ResponseBody, read_body_limited, read_body_preview,
};
use crate::transport::Transport;
use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::Instrument;
use url::Url;

/// Executor over the hyper transport; build one with [`crate::ClientBuilder`]
pub type RestClient = RequestExecutor<Transport>;

/// Boxed future returned by the page fetcher of [`RequestExecutor::paginate`]
pub type PageFuture<T> = Pin<Box<dyn Future<Output = Result<Page<T>, ApiError>> + Send>>;

/// Boxed page fetcher used by [`RequestExecutor::paginate`]
pub type PageFetcher<T> = Box<dyn FnMut(PageRequest) -> PageFuture<T> + Send>;

/// Lazy item stream over an offset/limit list endpoint
pub type ItemStream<T> = OffsetPager<T, PageFetcher<T>, PageFuture<T>>;

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for `delay`, then send again
    Retry { delay: Duration, error: ApiError },
    /// Give up and surface `error`
    Raise(ApiError),
}

/// Decide whether failed attempt `attempt` (0-based) should be retried.
///
/// Pure: depends only on its arguments. `error` is handed back inside the
/// decision so the caller can surface it or log it.
#[must_use]
pub fn decide(
    config: &RetryConfig,
    error: ApiError,
    attempt: usize,
    method: &Method,
    has_idempotency_key: bool,
) -> RetryDecision {
    if attempt.saturating_add(1) >= config.max_attempts() {
        return RetryDecision::Raise(error);
    }

    let replay_safe = is_idempotent_method(method) || has_idempotency_key;
    let hint = |server_hint: Option<Duration>| {
        if config.ignore_retry_after {
            None
        } else {
            server_hint
        }
    };

    let delay = match &error {
        ApiError::RateLimited {
            details,
            rate_limit,
        } if config.is_retryable_status(details.status.as_u16()) => {
            Some(config.backoff.delay(attempt, hint(rate_limit.server_hint())))
        }
        ApiError::Server { details }
            if replay_safe && config.is_retryable_status(details.status.as_u16()) =>
        {
            Some(config.backoff.delay(attempt, hint(details.retry_after)))
        }
        ApiError::Network(_) | ApiError::Timeout(_) if replay_safe => {
            Some(config.backoff.delay(attempt, None))
        }
        _ => None,
    };

    match delay {
        Some(delay) => RetryDecision::Retry { delay, error },
        None => RetryDecision::Raise(error),
    }
}

/// Call-local bookkeeping for one `execute`
#[derive(Debug)]
struct AttemptState {
    attempt: usize,
    started: Instant,
    last_error: Option<ErrorKind>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempt: 0,
            started: Instant::now(),
            last_error: None,
        }
    }
}

/// Turns [`RequestDescriptor`]s into completed exchanges
///
/// Cheap to clone; clones share the underlying transport. There is no
/// process-wide default instance: construct one and pass it where needed.
#[derive(Clone)]
pub struct RequestExecutor<S> {
    service: S,
    base_url: Arc<Url>,
    retry: Arc<RetryConfig>,
    pagination: PaginationConfig,
    total_timeout: Option<Duration>,
    max_body_size: usize,
}

impl<S> std::fmt::Debug for RequestExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("pagination", &self.pagination)
            .field("total_timeout", &self.total_timeout)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl<S> RequestExecutor<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = ApiError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    /// Executor with default retry, pagination and body-size settings
    #[must_use]
    pub fn new(service: S, base_url: Url) -> Self {
        let defaults = ClientConfig::default();
        Self {
            service,
            base_url: Arc::new(base_url),
            retry: Arc::new(defaults.retry),
            pagination: defaults.pagination,
            total_timeout: defaults.total_timeout,
            max_body_size: defaults.max_body_size,
        }
    }

    /// Executor configured from `config` over an existing transport
    ///
    /// # Errors
    /// Returns `ApiError::InvalidUri` if `config.base_url` is not a valid base URL.
    pub fn from_config(service: S, config: &ClientConfig) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&config.base_url)?;
        Ok(Self::new(service, base_url)
            .with_retry(config.retry.clone())
            .with_pagination(config.pagination)
            .with_total_timeout(config.total_timeout)
            .with_max_body_size(config.max_body_size))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Hard deadline over all attempts and backoff sleeps
    #[must_use]
    pub fn with_total_timeout(mut self, total_timeout: Option<Duration>) -> Self {
        self.total_timeout = total_timeout;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    #[must_use]
    pub fn pagination_config(&self) -> PaginationConfig {
        self.pagination
    }

    /// Execute one logical operation, retrying transient failures
    ///
    /// Returns the first 2xx response. Dropping the returned future cancels
    /// the operation at its current suspension point (send or backoff sleep).
    ///
    /// # Errors
    /// Returns the classified error of the last attempt, or
    /// `ApiError::DeadlineExceeded` when the total timeout expires.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let span = tracing::debug_span!(
            "restkit.execute",
            method = %descriptor.method(),
            path = descriptor.path(),
        );
        self.execute_inner(descriptor).instrument(span).await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `token` fires
    ///
    /// # Errors
    /// Returns `ApiError::Cancelled` if the token fires first; otherwise the
    /// same errors as [`execute`](Self::execute).
    pub async fn execute_with_cancel(
        &self,
        descriptor: &RequestDescriptor,
        token: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(
                    method = %descriptor.method(),
                    path = descriptor.path(),
                    "Request cancelled by caller"
                );
                Err(ApiError::Cancelled)
            }
            result = self.execute(descriptor) => result,
        }
    }

    /// Stream every item of an offset/limit list endpoint
    ///
    /// Sends `descriptor` with `limit` and `offset` query parameters appended,
    /// one page at a time, and only when the consumer polls past the buffered
    /// items. Each page goes through [`execute`](Self::execute), so retries
    /// apply per page. Each call starts a fresh traversal at offset 0.
    #[must_use]
    pub fn paginate<T>(&self, descriptor: RequestDescriptor, page_size: u64) -> ItemStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let executor = self.clone();
        let fetcher: PageFetcher<T> = Box::new(move |page: PageRequest| -> PageFuture<T> {
            let executor = executor.clone();
            let descriptor = descriptor
                .clone()
                .query("limit", page.limit.to_string())
                .query("offset", page.offset.to_string());
            Box::pin(async move { executor.execute(&descriptor).await?.json::<Page<T>>() })
        });
        OffsetPager::new(page_size, self.pagination.max_pages, fetcher)
    }

    /// [`paginate`](Self::paginate) with the configured page size
    #[must_use]
    pub fn paginate_default<T>(&self, descriptor: RequestDescriptor) -> ItemStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.paginate(descriptor, self.pagination.page_size)
    }

    async fn execute_inner(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let descriptor = idempotency::attach(descriptor.clone(), &self.retry);
        let has_idempotency_key = descriptor.has_idempotency_key();
        let max_attempts = self.retry.max_attempts();
        let deadline_info = self.total_timeout.map(|t| (Instant::now() + t, t));
        let mut state = AttemptState::new();

        loop {
            if let Some((deadline, total)) = deadline_info
                && Instant::now() >= deadline
            {
                return Err(ApiError::DeadlineExceeded(total));
            }

            let request = self.build_attempt_request(&descriptor, state.attempt)?;
            let outcome = match deadline_info {
                Some((deadline, total)) => {
                    tokio::time::timeout_at(deadline, self.send_once(request, state.attempt))
                        .await
                        .unwrap_or_else(|_| Err(ApiError::DeadlineExceeded(total)))
                }
                None => self.send_once(request, state.attempt).await,
            };

            let error = match outcome {
                Ok(response) => return Ok(response),
                Err(error @ ApiError::DeadlineExceeded(_)) => return Err(error),
                Err(error) => error,
            };

            let (delay, error) = match decide(
                &self.retry,
                error,
                state.attempt,
                descriptor.method(),
                has_idempotency_key,
            ) {
                RetryDecision::Retry { delay, error } => (delay, error),
                RetryDecision::Raise(error) => return Err(error),
            };

            let delay = match deadline_info {
                Some((deadline, total)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ApiError::DeadlineExceeded(total));
                    }
                    delay.min(remaining)
                }
                None => delay,
            };

            tracing::debug!(
                retry = state.attempt + 1,
                max_attempts,
                kind = ?error.kind(),
                status = ?error.status(),
                previous_kind = ?state.last_error,
                method = %descriptor.method(),
                path = descriptor.path(),
                request_id = ?error.details().and_then(|d| d.request_id.as_deref()),
                backoff_ms = delay.as_millis(),
                elapsed_ms = state.started.elapsed().as_millis(),
                error = %error,
                "Retrying request"
            );

            state.last_error = Some(error.kind());
            tokio::time::sleep(delay).await;
            state.attempt += 1;
        }
    }

    fn build_attempt_request(
        &self,
        descriptor: &RequestDescriptor,
        attempt: usize,
    ) -> Result<Request<Full<Bytes>>, ApiError> {
        let mut request = descriptor.to_http_request(&self.base_url)?;
        if attempt > 0
            && let Ok(value) = HeaderValue::try_from(attempt.to_string())
        {
            request.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
        }
        Ok(request)
    }

    /// One exchange: send, then read the body (bounded) or classify the failure
    async fn send_once(
        &self,
        request: Request<Full<Bytes>>,
        attempt: usize,
    ) -> Result<ApiResponse, ApiError> {
        let mut service = self.service.clone();
        let response = service.ready().await?.call(request).await?;
        let (parts, body) = response.into_parts();

        if parts.status.is_success() {
            let body = read_body_limited(body, self.max_body_size).await?;
            return Ok(ApiResponse::new(
                parts.status,
                parts.headers,
                body,
                attempt + 1,
            ));
        }

        let preview_limit = self.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let preview = read_body_preview(body, preview_limit).await;
        Err(classify(parts.status, &parts.headers, &preview))
    }
}
