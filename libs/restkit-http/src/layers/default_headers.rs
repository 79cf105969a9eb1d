use crate::error::ApiError;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that adds client-wide headers (User-Agent, static auth, ...)
///
/// Headers the request already carries are left untouched, so per-request
/// values override client defaults.
#[derive(Clone)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// Create a layer that sets `User-Agent` plus `extra` headers
    ///
    /// # Errors
    /// Returns `ApiError::InvalidHeaderValue` if the user agent string is not valid
    pub fn try_new(
        user_agent: impl AsRef<str>,
        extra: impl IntoIterator<Item = (HeaderName, HeaderValue)>,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent.as_ref())?);
        for (name, value) in extra {
            headers.insert(name, value);
        }
        Ok(Self {
            headers: Arc::new(headers),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service that fills in missing default headers
#[derive(Clone)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for (name, value) in self.headers.iter() {
            if !req.headers().contains_key(name) {
                req.headers_mut().insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the request headers back as the response headers
    #[derive(Clone)]
    struct EchoHeaders;

    impl Service<Request<Full<Bytes>>> for EchoHeaders {
        type Response = Response<Full<Bytes>>;
        type Error = Box<dyn std::error::Error + Send + Sync>;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::OK;
            *response.headers_mut() = req.headers().clone();
            std::future::ready(Ok(response))
        }
    }

    fn request(headers: &[(HeaderName, &'static str)]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("http://example.com");
        for (name, value) in headers {
            builder = builder.header(name, *value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn auth_layer() -> DefaultHeadersLayer {
        DefaultHeadersLayer::try_new(
            "test-agent/1.0",
            [(
                http::header::AUTHORIZATION,
                HeaderValue::from_static("Bearer default"),
            )],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_headers_added() {
        let service = auth_layer().layer(EchoHeaders);
        let response = service.oneshot(request(&[])).await.unwrap();

        assert_eq!(response.headers()[USER_AGENT], "test-agent/1.0");
        assert_eq!(
            response.headers()[http::header::AUTHORIZATION],
            "Bearer default"
        );
    }

    #[tokio::test]
    async fn test_request_headers_not_overwritten() {
        let service = auth_layer().layer(EchoHeaders);
        let response = service
            .oneshot(request(&[
                (USER_AGENT, "custom-agent/2.0"),
                (http::header::AUTHORIZATION, "Bearer per-request"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.headers()[USER_AGENT], "custom-agent/2.0");
        assert_eq!(
            response.headers()[http::header::AUTHORIZATION],
            "Bearer per-request"
        );
    }

    #[test]
    fn test_invalid_user_agent() {
        // Control characters are invalid in header values
        let result = DefaultHeadersLayer::try_new("invalid\x00agent", []);
        assert!(matches!(result, Err(ApiError::InvalidHeaderValue(_))));
    }
}
