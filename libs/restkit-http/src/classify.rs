//! Non-2xx response classification
//!
//! [`classify`] maps a status code, response headers and a (bounded) body
//! preview to one [`ApiError`] variant. Parsing the body or the rate-limit
//! headers never fails classification: anything unreadable is dropped and the
//! message degrades to the raw body text or the canonical reason phrase.

use crate::error::{ApiError, StatusDetails};
use http::{HeaderMap, StatusCode};
use restkit_errors::ProblemBody;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reset values above this are absolute Unix timestamps, not delta-seconds.
const EPOCH_THRESHOLD_SECS: u64 = 1_000_000_000;

const REQUEST_ID_HEADERS: [&str; 2] = ["x-request-id", "x-correlation-id"];

/// Rate-limit state reported by the server alongside a 429.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// `Retry-After` (delta-seconds or HTTP-date)
    pub retry_after: Option<Duration>,
    /// Request quota for the current window
    pub limit: Option<u64>,
    /// Tokens left in the current window
    pub remaining: Option<u64>,
    /// Time until the window resets
    pub reset: Option<Duration>,
}

impl RateLimitInfo {
    /// Read rate-limit state from response headers.
    ///
    /// Understands the structured `RateLimit` header in both the
    /// `limit=100, remaining=0, reset=30` and the `"policy";r=0;t=30` forms,
    /// then falls back to `RateLimit-*` and `X-RateLimit-*` headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let field =
            header_str(headers, "ratelimit").map_or_else(RateLimitField::default, parse_ratelimit);

        let limit = field
            .limit
            .or_else(|| first_u64(headers, &["ratelimit-limit", "x-ratelimit-limit"]));
        let remaining = field
            .remaining
            .or_else(|| first_u64(headers, &["ratelimit-remaining", "x-ratelimit-remaining"]));
        let reset = field
            .reset
            .or_else(|| first_u64(headers, &["ratelimit-reset", "x-ratelimit-reset"]));

        Self {
            retry_after: parse_retry_after(headers),
            limit,
            remaining,
            reset: reset.map(reset_to_duration),
        }
    }

    /// How long the server asked us to wait: `Retry-After`, else the window reset.
    #[must_use]
    pub fn server_hint(&self) -> Option<Duration> {
        self.retry_after.or(self.reset)
    }
}

#[derive(Debug, Default)]
struct RateLimitField {
    limit: Option<u64>,
    remaining: Option<u64>,
    reset: Option<u64>,
}

/// Parse a `RateLimit` header value. The first policy's values win.
fn parse_ratelimit(value: &str) -> RateLimitField {
    let mut field = RateLimitField::default();
    for param in value.split([',', ';']) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let Ok(number) = raw.trim().trim_matches('"').parse::<u64>() else {
            continue;
        };
        let slot = match key.trim().to_ascii_lowercase().as_str() {
            "limit" | "q" => &mut field.limit,
            "remaining" | "r" => &mut field.remaining,
            "reset" | "t" => &mut field.reset,
            _ => continue,
        };
        slot.get_or_insert(number);
    }
    field
}

fn reset_to_duration(raw: u64) -> Duration {
    if raw > EPOCH_THRESHOLD_SECS {
        let at = UNIX_EPOCH + Duration::from_secs(raw);
        return at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
    }
    Duration::from_secs(raw)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn first_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .find_map(|name| header_str(headers, name)?.parse().ok())
}

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 9110:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date: "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if the header is missing, unparseable, negative, or a date
/// in the past.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let trimmed = header_str(headers, http::header::RETRY_AFTER.as_str())?;

    if let Ok(seconds) = trimmed.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let parsed = httpdate::parse_http_date(trimmed).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// `X-Request-Id`, else `X-Correlation-Id`
#[must_use]
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
}

/// Classify a non-2xx response.
///
/// `body` is a bounded preview of the response body; it may be empty, plain
/// text, HTML, or a Problem Details document.
#[must_use]
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ApiError {
    let parsed = ProblemBody::parse(body);
    let message = parsed.message().unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_owned()
    });

    let details = Box::new(StatusDetails {
        status,
        problem: parsed.into_problem(),
        message,
        retry_after: parse_retry_after(headers),
        request_id: request_id(headers),
    });

    match status.as_u16() {
        400 => ApiError::Validation { details },
        401 => ApiError::Authentication { details },
        403 => ApiError::Authorization { details },
        404 => ApiError::NotFound { details },
        409 => ApiError::Conflict { details },
        429 => ApiError::RateLimited {
            details,
            rate_limit: RateLimitInfo::from_headers(headers),
        },
        500..=599 => ApiError::Server { details },
        _ => ApiError::Unknown { details },
    }
}
