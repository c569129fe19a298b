//! HTTP response handling.
//!
//! [`Response`] gives access to status, reason phrase and headers while
//! leaving the body untouched: the executor never reads it. Consumers read
//! it with [`Response::bytes`], [`Response::text`] or [`Response::json`].
//!
//! # Example
//!
//! ```ignore
//! let response = runner.execute(request).await?;
//! let products: Feed<Product> = response.json().await?;
//! ```

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use http_body_util::BodyExt;

use crate::{BoxError, Error, Result};

/// Type-erased response body.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// HTTP response with status, reason phrase, headers and an unread body.
#[derive(Debug)]
pub struct Response<B> {
    status: StatusCode,
    version: Version,
    reason: Option<String>,
    headers: HeaderMap,
    body: B,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: B) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            reason: None,
            headers,
            body,
        }
    }

    /// Creates a response from an [`http::Response`].
    #[must_use]
    pub fn from_http(response: http::Response<B>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            reason: None,
            headers: parts.headers,
            body,
        }
    }

    /// Sets a non-canonical reason phrase, as sent by the server.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase: the one sent by the server, else the canonical one.
    #[must_use]
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or_default()
    }

    /// HTTP version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Mutable access to the body.
    #[must_use]
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Status is 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Status is 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Transform the body with a function.
    pub fn map_body<F, B2>(self, f: F) -> Response<B2>
    where
        F: FnOnce(B) -> B2,
    {
        Response {
            status: self.status,
            version: self.version,
            reason: self.reason,
            headers: self.headers,
            body: f(self.body),
        }
    }
}

impl<B> Response<B>
where
    B: http_body::Body<Data = Bytes, Error: Into<BoxError>> + Send + Sync + 'static,
{
    /// Erase the body type.
    #[must_use]
    pub fn boxed(self) -> Response<BoxBody> {
        self.map_body(|body| body.map_err(Into::into).boxed())
    }
}

impl<B> Response<B>
where
    B: http_body::Body<Data = Bytes, Error: Into<BoxError>>,
{
    /// Read the whole body.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes> {
        let collected = self.body.collect().await.map_err(Error::transport)?;
        Ok(collected.to_bytes())
    }

    /// Read the whole body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the body is not valid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|err| Error::invalid_request(err.to_string()))
    }

    /// Read the whole body and deserialize it as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or deserialization fails.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
