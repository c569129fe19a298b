//! Request descriptors.
//!
//! A [`RequestDescriptor`] describes one call: the wire message to send plus
//! what the executor needs to decorate it (accept types, custom headers,
//! credentials, optimistic-concurrency flag).
//!
//! # Example
//!
//! ```
//! use odata_exec_core::{Credentials, Method, RequestDescriptor};
//!
//! let request = RequestDescriptor::builder(
//!     Method::Patch,
//!     "https://services.odata.org/V4/OData/OData.svc/Products(1)".parse().unwrap(),
//! )
//! .accept("application/json")
//! .header("Prefer", "return=minimal")
//! .credentials(Credentials::basic("user", "pass"))
//! .check_optimistic_concurrency(true)
//! .build()
//! .unwrap();
//!
//! assert!(request.requires_if_match());
//! ```

use bytes::Bytes;

use crate::{Credentials, Error, HeaderCollection, Method, Result};

/// Description of one call, consumed by the executor.
#[derive(Debug)]
pub struct RequestDescriptor {
    method: Method,
    url: url::Url,
    headers: HeaderCollection,
    accept: Vec<String>,
    credentials: Option<Credentials>,
    check_optimistic_concurrency: bool,
    message: http::Request<Bytes>,
}

/// The pieces of a [`RequestDescriptor`], moved out for dispatch.
#[derive(Debug)]
pub struct RequestParts {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: url::Url,
    /// Caller-supplied headers.
    pub headers: HeaderCollection,
    /// Accepted media types, in preference order.
    pub accept: Vec<String>,
    /// Credential material.
    pub credentials: Option<Credentials>,
    /// Whether conditional writes must carry `If-Match: *`.
    pub check_optimistic_concurrency: bool,
    /// The wire message.
    pub message: http::Request<Bytes>,
}

impl RequestDescriptor {
    /// Creates a new [`RequestDescriptorBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Caller-supplied headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// Accepted media types.
    #[must_use]
    pub fn accept(&self) -> &[String] {
        &self.accept
    }

    /// Credential material.
    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Whether optimistic concurrency is enforced.
    #[must_use]
    pub const fn check_optimistic_concurrency(&self) -> bool {
        self.check_optimistic_concurrency
    }

    /// Returns `true` if the dispatched message must carry `If-Match: *`.
    #[must_use]
    pub const fn requires_if_match(&self) -> bool {
        self.check_optimistic_concurrency && self.method.is_conditional_write()
    }

    /// The wire message.
    #[must_use]
    pub const fn message(&self) -> &http::Request<Bytes> {
        &self.message
    }

    /// Consume into its parts.
    #[must_use]
    pub fn into_parts(self) -> RequestParts {
        RequestParts {
            method: self.method,
            url: self.url,
            headers: self.headers,
            accept: self.accept,
            credentials: self.credentials,
            check_optimistic_concurrency: self.check_optimistic_concurrency,
            message: self.message,
        }
    }
}

/// Builder for constructing [`RequestDescriptor`] instances.
#[derive(Debug, Clone)]
pub struct RequestDescriptorBuilder {
    method: Method,
    url: url::Url,
    headers: HeaderCollection,
    accept: Vec<String>,
    credentials: Option<Credentials>,
    check_optimistic_concurrency: bool,
    body: Option<Bytes>,
}

impl RequestDescriptorBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderCollection::new(),
            accept: Vec::new(),
            credentials: None,
            check_optimistic_concurrency: false,
            body: None,
        }
    }

    /// Appends a header value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends multiple header values.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Adds an accepted media type.
    #[must_use]
    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept.push(media_type.into());
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Enables or disables optimistic-concurrency enforcement.
    #[must_use]
    pub const fn check_optimistic_concurrency(mut self, enabled: bool) -> Self {
        self.check_optimistic_concurrency = enabled;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Builds the [`RequestDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be used as a request target.
    pub fn build(self) -> Result<RequestDescriptor> {
        let message = http::Request::builder()
            .method(http::Method::from(self.method))
            .uri(self.url.as_str())
            .body(self.body.unwrap_or_default())
            .map_err(|err| Error::invalid_request(err.to_string()))?;

        Ok(RequestDescriptor {
            method: self.method,
            url: self.url,
            headers: self.headers,
            accept: self.accept,
            credentials: self.credentials,
            check_optimistic_concurrency: self.check_optimistic_concurrency,
            message,
        })
    }
}
