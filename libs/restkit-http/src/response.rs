use crate::error::ApiError;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Maximum number of bytes read from a non-2xx body for classification.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type alias for the boxed response body that supports decompression.
///
/// This type can hold either a raw body or a decompressed body (gzip/br/deflate).
/// The body is type-erased to allow the decompression layer to work transparently.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// A successful (2xx) response with its body fully read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    attempts: usize,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, attempts: usize) -> Self {
        Self {
            status,
            headers,
            body,
            attempts,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Number of attempts it took to get this response (1 = no retries)
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body as text; invalid UTF-8 sequences are replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    /// Returns `ApiError::Json` if parsing fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Read the whole body, failing once more than `limit` bytes arrive.
///
/// The limit applies to decompressed bytes, which protects against
/// decompression bombs.
///
/// # Errors
/// Returns `ApiError::BodyTooLarge` past the limit, `ApiError::Network` if
/// the body stream fails.
pub async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, ApiError> {
    let mut collected = BytesMut::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ApiError::Network)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(ApiError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(collected.freeze())
}

/// Read at most `limit` bytes of an error body, for classification.
///
/// Never fails: the rest of an oversized body is discarded, and a failing
/// stream yields whatever arrived before the failure.
pub async fn read_body_preview(body: ResponseBody, limit: usize) -> Bytes {
    let mut collected = BytesMut::new();
    let mut body = std::pin::pin!(body);

    while let Some(Ok(frame)) = body.frame().await {
        if let Some(chunk) = frame.data_ref() {
            let room = limit.saturating_sub(collected.len());
            if chunk.len() >= room {
                collected.extend_from_slice(&chunk[..room]);
                break;
            }
            collected.extend_from_slice(chunk);
        }
    }

    collected.freeze()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::{Full, StreamBody};

    fn make_response_body(data: &[u8]) -> ResponseBody {
        let body = Full::new(Bytes::from(data.to_vec()));
        body.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed()
    }

    fn chunked_body_with_failure() -> ResponseBody {
        let frames: Vec<Result<http_body::Frame<Bytes>, Box<dyn std::error::Error + Send + Sync>>> = vec![
            Ok(http_body::Frame::data(Bytes::from_static(b"partial "))),
            Err("connection reset".into()),
        ];
        BodyExt::boxed(StreamBody::new(futures_util::stream::iter(frames)))
    }

    #[tokio::test]
    async fn test_read_body_limited_within_limit() {
        let bytes = read_body_limited(make_response_body(b"hello"), 5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_body_limited_over_limit() {
        let err = read_body_limited(make_response_body(b"hello world"), 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::BodyTooLarge {
                limit: 5,
                actual: 11
            }
        ));
    }

    #[tokio::test]
    async fn test_read_body_limited_stream_failure_is_network() {
        let err = read_body_limited(chunked_body_with_failure(), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn test_preview_truncates() {
        let preview = read_body_preview(make_response_body(b"0123456789"), 4).await;
        assert_eq!(&preview[..], b"0123");
    }

    #[tokio::test]
    async fn test_preview_keeps_partial_body_on_failure() {
        let preview = read_body_preview(chunked_body_with_failure(), 1024).await;
        assert_eq!(&preview[..], b"partial ");
    }

    #[test]
    fn test_api_response_json() {
        #[derive(serde::Deserialize)]
        struct User {
            id: u32,
        }

        let response = ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(br#"{"id": 7}"#),
            2,
        );
        assert_eq!(response.json::<User>().unwrap().id, 7);
        assert_eq!(response.text(), r#"{"id": 7}"#);
        assert_eq!(response.attempts(), 2);
        assert!(matches!(
            response.json::<Vec<u8>>(),
            Err(ApiError::Json(_))
        ));
    }
}
