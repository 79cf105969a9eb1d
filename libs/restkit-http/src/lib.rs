#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Request execution core for REST API clients
//!
//! This crate turns a [`RequestDescriptor`] into a completed exchange:
//! - Automatic retries with exponential backoff and jitter, honouring
//!   `Retry-After` and `RateLimit` headers
//! - Typed error taxonomy for non-2xx responses, with RFC 9457 problem
//!   details parsed from the body
//! - Optional automatic `Idempotency-Key` headers so writes can be retried
//! - Total deadline and caller cancellation across all attempts
//! - Lazy offset/limit pagination as a `Stream` of items
//!
//! The transport is a hyper client over rustls (HTTPS only by default) with
//! connection pooling, a per-attempt timeout and transparent response
//! decompression. The executor is generic over any tower service, so tests
//! can substitute an in-memory transport.
//!
//! # Example
//!
//! ```ignore
//! use restkit_http::{RequestDescriptor, RestClient};
//! use std::time::Duration;
//!
//! let client = RestClient::builder()
//!     .base_url("https://api.example.com/v2")
//!     .timeout(Duration::from_secs(10))
//!     .auto_idempotency_keys(true)
//!     .build()?;
//!
//! let user: User = client
//!     .execute(&RequestDescriptor::get("/users/42"))
//!     .await?
//!     .json()?;
//! ```

mod backoff;
mod builder;
mod classify;
mod config;
mod error;
mod executor;
mod idempotency;
mod layers;
mod pager;
mod request;
mod response;
mod transport;

pub use builder::ClientBuilder;
pub use classify::{RateLimitInfo, classify, parse_retry_after, request_id};
pub use config::{
    ClientConfig, DEFAULT_USER_AGENT, ExponentialBackoff, IDEMPOTENCY_KEY_HEADER,
    PaginationConfig, RETRY_ATTEMPT_HEADER, RetryConfig, TlsRootConfig, TransportSecurity,
    is_idempotent_method,
};
pub use error::{ApiError, ErrorKind, StatusDetails};
pub use executor::{
    ItemStream, PageFetcher, PageFuture, RequestExecutor, RestClient, RetryDecision, decide,
};
pub use idempotency::attach as attach_idempotency_key;
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use pager::{OffsetPager, Page, PageRequest};
pub use request::{RequestBody, RequestDescriptor, parse_base_url};
pub use response::{ApiResponse, ERROR_BODY_PREVIEW_LIMIT, ResponseBody};
pub use restkit_errors::{InvalidParameter, Problem, ProblemBody};
pub use transport::{Transport, build_transport};
