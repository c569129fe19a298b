//! HTTP method types.

use derive_more::Display;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Method {
    /// GET method - read an entity or a collection.
    #[display("GET")]
    Get,
    /// POST method - create an entity or invoke an action.
    #[display("POST")]
    Post,
    /// PUT method - replace an entity.
    #[display("PUT")]
    Put,
    /// DELETE method - remove an entity or a link.
    #[display("DELETE")]
    Delete,
    /// PATCH method - partially update an entity.
    #[display("PATCH")]
    Patch,
    /// HEAD method - retrieve headers only.
    #[display("HEAD")]
    Head,
    /// OPTIONS method - retrieve allowed methods.
    #[display("OPTIONS")]
    Options,
}

impl Method {
    /// Returns `true` if the method writes to an existing resource.
    ///
    /// These are the methods guarded by `If-Match: *` when optimistic
    /// concurrency is requested.
    #[must_use]
    pub const fn is_conditional_write(&self) -> bool {
        matches!(self, Self::Put | Self::Patch | Self::Delete)
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
        }
    }
}
