//! Idempotency keys for non-idempotent writes
//!
//! A POST/PUT/PATCH carrying an `Idempotency-Key` header is treated as safe
//! to replay: the server deduplicates attempts that share the key. Header
//! presence is the only signal the retry logic looks at.

use crate::config::RetryConfig;
use crate::request::RequestDescriptor;
use http::Method;
use http::header::{HeaderName, HeaderValue};
use uuid::Uuid;

const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

fn wants_key(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Attach a fresh `Idempotency-Key: <uuid v4>` when enabled and the caller
/// did not set one.
///
/// Called once per logical operation, so every attempt carries the same key.
#[must_use]
pub fn attach(descriptor: RequestDescriptor, config: &RetryConfig) -> RequestDescriptor {
    if !config.auto_idempotency_keys
        || !wants_key(descriptor.method())
        || descriptor.has_idempotency_key()
    {
        return descriptor;
    }

    match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        Ok(key) => descriptor.with_header_if_absent(IDEMPOTENCY_KEY, key),
        Err(_) => descriptor,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn auto_keys() -> RetryConfig {
        RetryConfig {
            auto_idempotency_keys: true,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_attaches_uuid_to_writes() {
        for descriptor in [
            RequestDescriptor::post("/orders"),
            RequestDescriptor::put("/orders/1"),
            RequestDescriptor::patch("/orders/1"),
        ] {
            let keyed = attach(descriptor, &auto_keys());
            let key = keyed.headers()["idempotency-key"].to_str().unwrap();
            let parsed = Uuid::parse_str(key).unwrap();
            assert_eq!(parsed.get_version_num(), 4);
        }
    }

    #[test]
    fn test_skips_reads_and_deletes() {
        for descriptor in [RequestDescriptor::get("/a"), RequestDescriptor::delete("/a")] {
            assert!(!attach(descriptor, &auto_keys()).has_idempotency_key());
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let descriptor = attach(RequestDescriptor::post("/orders"), &RetryConfig::default());
        assert!(!descriptor.has_idempotency_key());
    }

    #[test]
    fn test_caller_key_is_preserved() {
        let descriptor = RequestDescriptor::post("/orders")
            .idempotency_key("caller-key")
            .unwrap();
        let keyed = attach(descriptor, &auto_keys());
        assert_eq!(keyed.headers()["idempotency-key"], "caller-key");
        assert_eq!(keyed.headers().get_all("idempotency-key").iter().count(), 1);
    }

    #[test]
    fn test_each_operation_gets_a_new_key() {
        let first = attach(RequestDescriptor::post("/orders"), &auto_keys());
        let second = attach(RequestDescriptor::post("/orders"), &auto_keys());
        assert_ne!(
            first.headers()["idempotency-key"],
            second.headers()["idempotency-key"]
        );
    }
}
