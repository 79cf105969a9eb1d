//! Hyper-based transport: one HTTP exchange per call, no retries
//!
//! Stack (outer to inner):
//!   `Timeout → DefaultHeaders → Decompression → hyper_client`
//!
//! Every HTTP status is a successful response at this level; `Err` is only
//! returned for transport failures and per-attempt timeouts. Retries,
//! classification and deadlines live in [`crate::RequestExecutor`].

use crate::config::{ClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::ApiError;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased transport service; cheap to clone, shares the connection pool
pub type Transport = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, ApiError>;

/// Build the hyper transport described by `config`
///
/// # Errors
/// Returns `ApiError::Tls` if TLS initialization fails, or
/// `ApiError::InvalidHeaderValue` if the user agent is not a valid header value.
pub fn build_transport(
    config: &ClientConfig,
    default_headers: Vec<(HeaderName, HeaderValue)>,
) -> Result<Transport, ApiError> {
    let timeout = config.request_timeout;
    let https = build_https_connector(config.tls_roots, config.transport)?;

    // pool_timer is required for pool_idle_timeout to take effect
    let mut client_builder = Client::builder(TokioExecutor::new());
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }
    let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

    let headers_layer = DefaultHeadersLayer::try_new(&config.user_agent, default_headers)?;

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(headers_layer)
        .layer(DecompressionLayer::new())
        .service(hyper_client)
        .map_response(map_decompression_response)
        .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

    Ok(BoxCloneSyncService::new(service))
}

/// Map tower errors to `ApiError` with the actual timeout duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return ApiError::Timeout(timeout);
    }

    match err.downcast::<ApiError>() {
        Ok(api_err) => *api_err,
        Err(other) => ApiError::Network(other),
    }
}

/// Convert `Response<DecompressionBody<Incoming>>` to `Response<ResponseBody>`
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Use the process-wide default crypto provider if one is installed,
/// otherwise aws-lc-rs (without installing it globally).
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build the HTTPS connector; ALPN advertises both h2 and http/1.1.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, ApiError> {
    let provider = crypto_provider();
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| ApiError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_native_roots(provider)
            .map_err(|e| ApiError::Tls(Box::new(e)))?,
    };

    let connector = match transport {
        TransportSecurity::AllowInsecureHttp => {
            builder.https_or_http().enable_all_versions().build()
        }
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_map_tower_error_preserves_api_error() {
        let err: tower::BoxError = Box::new(ApiError::Cancelled);
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(1)),
            ApiError::Cancelled
        ));
    }

    #[test]
    fn test_map_tower_error_other_is_network() {
        let err: tower::BoxError = "connection refused".into();
        let mapped = map_tower_error(err, Duration::from_secs(1));
        assert!(matches!(mapped, ApiError::Network(ref e) if e.to_string() == "connection refused"));
    }

    #[tokio::test]
    async fn test_build_transport_with_webpki_roots() {
        let config = ClientConfig::for_testing("http://127.0.0.1:1");
        assert!(build_transport(&config, Vec::new()).is_ok());
    }

    #[tokio::test]
    async fn test_build_transport_rejects_bad_user_agent() {
        let config = ClientConfig {
            user_agent: "bad\nagent".to_owned(),
            ..ClientConfig::for_testing("http://127.0.0.1:1")
        };
        assert!(matches!(
            build_transport(&config, Vec::new()),
            Err(ApiError::InvalidHeaderValue(_))
        ));
    }
}
