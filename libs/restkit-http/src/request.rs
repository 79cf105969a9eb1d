use crate::config::IDEMPOTENCY_KEY_HEADER;
use crate::error::ApiError;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request};
use http_body_util::Full;
use serde::Serialize;
use url::Url;

/// Request body, serialized once when the descriptor is built
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Raw bytes with an optional content type
    Bytes {
        content: Bytes,
        content_type: Option<HeaderValue>,
    },
    /// JSON-serialized body
    Json(Bytes),
}

impl RequestBody {
    fn content(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Bytes { content, .. } | Self::Json(content) => content.clone(),
        }
    }

    fn content_type(&self) -> Option<HeaderValue> {
        match self {
            Self::Empty => None,
            Self::Bytes { content_type, .. } => content_type.clone(),
            Self::Json(_) => Some(HeaderValue::from_static("application/json")),
        }
    }
}

/// One logical REST operation, independent of retries
///
/// Built once by the caller and replayed unchanged by every attempt. The
/// path is resolved against the client's base URL.
///
/// # Example
///
/// ```ignore
/// let create = RequestDescriptor::post("/users")
///     .json(&NewUser { name: "Alice" })?
///     .idempotency_key("7f0c1b9e-...")?;
///
/// let list = RequestDescriptor::get("/users")
///     .query("status", "active")
///     .query("sort", "-created_at");
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter; repeated keys are kept in order
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a header from strings
    ///
    /// # Errors
    /// Returns `ApiError::InvalidHeaderName` or `ApiError::InvalidHeaderValue`
    /// if either part is not a valid HTTP header token.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        Ok(self.header(name, value))
    }

    /// Set the caller's own idempotency key
    ///
    /// # Errors
    /// Returns `ApiError::InvalidHeaderValue` if the key is not a valid header value.
    pub fn idempotency_key(self, key: &str) -> Result<Self, ApiError> {
        self.try_header(IDEMPOTENCY_KEY_HEADER, key)
    }

    /// Serialize `body` as the JSON request body
    ///
    /// # Errors
    /// Returns `ApiError::Json` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = RequestBody::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Use raw bytes as the request body
    pub fn bytes(mut self, content: impl Into<Bytes>, content_type: Option<HeaderValue>) -> Self {
        self.body = RequestBody::Bytes {
            content: content.into(),
            content_type,
        };
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    #[must_use]
    pub fn has_idempotency_key(&self) -> bool {
        self.headers.contains_key(IDEMPOTENCY_KEY_HEADER)
    }

    /// Resolve path and query against `base_url`
    ///
    /// # Errors
    /// Returns `ApiError::InvalidUri` if the path does not parse, or resolves
    /// to a different origin than the base URL.
    pub fn resolve_url(&self, base_url: &Url) -> Result<Url, ApiError> {
        let relative = self.path.trim_start_matches('/');
        let mut url = base_url
            .join(relative)
            .map_err(|e| ApiError::InvalidUri {
                url: self.path.clone(),
                reason: e.to_string(),
            })?;

        if url.origin() != base_url.origin() {
            return Err(ApiError::InvalidUri {
                url: self.path.clone(),
                reason: "path must be relative to the base URL".to_owned(),
            });
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                self.query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }
        Ok(url)
    }

    /// Build the wire request for one attempt
    ///
    /// # Errors
    /// Returns `ApiError::InvalidUri` if the URL cannot be resolved.
    pub fn to_http_request(&self, base_url: &Url) -> Result<Request<Full<Bytes>>, ApiError> {
        let url = self.resolve_url(base_url)?;
        let uri = url
            .as_str()
            .parse::<http::Uri>()
            .map_err(|e| ApiError::InvalidUri {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let mut request = Request::new(Full::new(self.body.content()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = self.headers.clone();

        if let Some(content_type) = self.body.content_type()
            && !request.headers().contains_key(CONTENT_TYPE)
        {
            request.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        Ok(request)
    }

    /// Insert a header only if the caller did not set it
    pub fn with_header_if_absent(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if !self.headers.contains_key(&name) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Parse and normalize a base URL
///
/// The result always ends with `/`, so relative paths are appended to the
/// base path instead of replacing its last segment. Query and fragment are
/// dropped.
///
/// # Errors
/// Returns `ApiError::InvalidUri` if the URL does not parse or has no host.
pub fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ApiError::InvalidUri {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ApiError::InvalidUri {
            url: raw.to_owned(),
            reason: "base URL must have a host".to_owned(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
