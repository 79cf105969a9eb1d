use crate::classify::RateLimitInfo;
use http::StatusCode;
use restkit_errors::{InvalidParameter, Problem};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Everything known about a non-2xx response after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDetails {
    pub status: StatusCode,
    /// Parsed Problem Details body, when the server sent one
    pub problem: Option<Problem>,
    /// Human-readable message: problem title/detail, raw body text, or the
    /// canonical reason phrase, in that order of preference
    pub message: String,
    /// Parsed `Retry-After` header value, if present and valid
    pub retry_after: Option<Duration>,
    /// `X-Request-Id` / `X-Correlation-Id` response header, for diagnostics
    pub request_id: Option<String>,
}

impl StatusDetails {
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.problem.as_ref().and_then(|p| p.title.as_deref())
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.problem.as_ref().and_then(|p| p.detail.as_deref())
    }

    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.problem.as_ref().and_then(|p| p.instance.as_deref())
    }

    /// Per-field failures from the problem body; empty when none were sent
    #[must_use]
    pub fn invalid_parameters(&self) -> &[InvalidParameter] {
        match &self.problem {
            Some(problem) => &problem.invalid_parameters,
            None => &[],
        }
    }
}

impl fmt::Display for StatusDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status.as_u16(), self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {request_id})")?;
        }
        Ok(())
    }
}

/// Copyable error taxonomy, for matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimited,
    Server,
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Unknown,
    DeadlineExceeded,
    Cancelled,
    BodyTooLarge,
    Json,
    InvalidRequest,
    Tls,
    Pagination,
}

/// REST client error types
///
/// Status-derived variants carry boxed [`StatusDetails`] so the error stays
/// small on the happy path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    /// Transport failure (connect, DNS, reset, protocol, body stream)
    #[error("Network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Total operation deadline exceeded (including all retries)
    #[error("Operation deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Caller cancelled the operation
    #[error("Request cancelled")]
    Cancelled,

    /// 429 Too Many Requests
    #[error("Rate limited: {details}")]
    RateLimited {
        details: Box<StatusDetails>,
        rate_limit: RateLimitInfo,
    },

    /// 5xx
    #[error("Server error: {details}")]
    Server { details: Box<StatusDetails> },

    /// 400 Bad Request
    #[error("Validation failed: {details}")]
    Validation { details: Box<StatusDetails> },

    /// 401 Unauthorized
    #[error("Authentication failed: {details}")]
    Authentication { details: Box<StatusDetails> },

    /// 403 Forbidden
    #[error("Not authorized: {details}")]
    Authorization { details: Box<StatusDetails> },

    /// 404 Not Found
    #[error("Not found: {details}")]
    NotFound { details: Box<StatusDetails> },

    /// 409 Conflict
    #[error("Conflict: {details}")]
    Conflict { details: Box<StatusDetails> },

    /// Any other non-2xx status
    #[error("Unexpected response: {details}")]
    Unknown { details: Box<StatusDetails> },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL or request path could not be turned into a URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// URL scheme rejected by the transport security mode
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// TLS setup failed while building the client
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Pagination stopped by the local safety bound
    #[error("Pagination error: {0}")]
    Pagination(String),
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unknown { .. } => ErrorKind::Unknown,
            Self::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            Self::Json(_) => ErrorKind::Json,
            Self::InvalidUri { .. }
            | Self::InvalidScheme { .. }
            | Self::InvalidHeaderName(_)
            | Self::InvalidHeaderValue(_) => ErrorKind::InvalidRequest,
            Self::Tls(_) => ErrorKind::Tls,
            Self::Pagination(_) => ErrorKind::Pagination,
        }
    }

    /// Status details for errors derived from a non-2xx response
    #[must_use]
    pub fn details(&self) -> Option<&StatusDetails> {
        match self {
            Self::RateLimited { details, .. }
            | Self::Server { details }
            | Self::Validation { details }
            | Self::Authentication { details }
            | Self::Authorization { details }
            | Self::NotFound { details }
            | Self::Conflict { details }
            | Self::Unknown { details } => Some(details),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.details().map(|d| d.status)
    }

    #[must_use]
    pub fn problem(&self) -> Option<&Problem> {
        self.details().and_then(|d| d.problem.as_ref())
    }

    #[must_use]
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        match self {
            Self::RateLimited { rate_limit, .. } => Some(rate_limit),
            _ => None,
        }
    }

    /// True for failures that happened before a response was received
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}
