//! Error types for odata-exec.
//!
//! Every non-success outcome of a request leaves the executor as an [`Error`]:
//!
//! - [`Error::Status`] - the call completed with a non-2xx status
//! - [`Error::Transport`] - the call could not complete (DNS, connect, TLS, timeout, ...)
//! - [`Error::Cancelled`] - the caller's cancellation token fired first

use std::error::Error as StdError;
use std::fmt;

use bytes::Bytes;
use derive_more::{Display, Error, From};

use crate::{BoxBody, Response};

/// Type-erased error, as produced by transports and body streams.
pub type BoxError = Box<dyn StdError + Send + Sync>;

// ============================================================================
// Transport Fault
// ============================================================================

/// Classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TransportErrorKind {
    /// Name resolution failed.
    #[display("dns")]
    Dns,
    /// The connection could not be established or was dropped.
    #[display("connect")]
    Connect,
    /// TLS handshake or certificate failure.
    #[display("tls")]
    Tls,
    /// The call did not complete in time.
    #[display("timeout")]
    Timeout,
    /// The peer spoke something that is not valid HTTP.
    #[display("protocol")]
    Protocol,
    /// Any other transport failure.
    #[display("transport")]
    Other,
}

/// A failure raised while the request was on the wire.
///
/// Use [`TransportFault::from_error`] to turn whatever the transport produced
/// into a fault: it walks the whole `source()` chain, so the number of
/// wrapping layers added by the async machinery does not matter.
#[derive(Debug)]
pub struct TransportFault {
    kind: TransportErrorKind,
    status: Option<u16>,
    message: String,
    source: Option<BoxError>,
}

impl TransportFault {
    /// Create a fault with the given kind and message.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the status code the transport observed, if any.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Override the classification.
    #[must_use]
    pub const fn with_kind(mut self, kind: TransportErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Normalize any transport-originated error into a fault.
    ///
    /// A [`TransportFault`] found anywhere in the chain is reused as-is (its
    /// kind, status and message), otherwise the chain is classified.
    #[must_use]
    pub fn from_error(error: impl Into<BoxError>) -> Self {
        let error = match error.into().downcast::<Self>() {
            Ok(fault) => return *fault,
            Err(error) => error,
        };

        let root: &(dyn StdError + 'static) = &*error;
        let (kind, status, message) = chain(root)
            .find_map(|err| err.downcast_ref::<Self>())
            .map_or_else(
                || (classify(root), None, describe(root)),
                |inner| (inner.kind, inner.status, inner.message.clone()),
            );

        Self {
            kind,
            status,
            message,
            source: Some(error),
        }
    }

    /// Failure classification.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Status code, when the transport could derive one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl StdError for TransportFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

fn chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |err| (*err).source())
}

/// Joins the distinct messages of the chain, outermost first.
fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    for err in chain(error) {
        let message = err.to_string();
        if !message.is_empty() && !parts.iter().any(|part| part.contains(&message)) {
            parts.push(message);
        }
    }
    parts.join(": ")
}

fn classify(error: &(dyn StdError + 'static)) -> TransportErrorKind {
    let message = describe(error).to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

    if mentions(&["tls", "ssl", "certificate"]) {
        return TransportErrorKind::Tls;
    }
    if mentions(&["dns", "failed to lookup", "resolve", "name or service not known"]) {
        return TransportErrorKind::Dns;
    }

    let io_kind = chain(error)
        .filter_map(|err| err.downcast_ref::<std::io::Error>())
        .find_map(|err| match err.kind() {
            std::io::ErrorKind::TimedOut => Some(TransportErrorKind::Timeout),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::AddrNotAvailable
            | std::io::ErrorKind::BrokenPipe => Some(TransportErrorKind::Connect),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                Some(TransportErrorKind::Protocol)
            }
            _ => None,
        });
    if let Some(kind) = io_kind {
        return kind;
    }

    if mentions(&["timed out", "timeout"]) {
        TransportErrorKind::Timeout
    } else if mentions(&["connect"]) {
        TransportErrorKind::Connect
    } else if mentions(&["parse", "invalid http", "protocol"]) {
        TransportErrorKind::Protocol
    } else {
        TransportErrorKind::Other
    }
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for odata-exec operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// The call completed but the status is not in the success range.
    #[display("HTTP error {status}: {reason}")]
    #[from(skip)]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason phrase, verbatim from the response.
        #[error(not(source))]
        reason: String,
        /// The failed response, body still unread.
        #[error(not(source))]
        response: Option<Box<Response<BoxBody>>>,
    },

    /// The call could not complete.
    #[display("{_0}")]
    #[from]
    Transport(TransportFault),

    /// The caller cancelled the call before a response was observed.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// Invalid request description.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON (de)serialization error.
    #[display("JSON error: {_0}")]
    #[from]
    Json(serde_json::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a status error without an attached response.
    #[must_use]
    pub fn status_fault(status: u16, reason: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
            response: None,
        }
    }

    /// Create a status error from a failed response.
    ///
    /// The body is boxed, not read.
    #[must_use]
    pub fn from_response<B>(response: Response<B>) -> Self
    where
        B: http_body::Body<Data = Bytes, Error: Into<BoxError>> + Send + Sync + 'static,
    {
        Self::Status {
            status: response.status().as_u16(),
            reason: response.reason_phrase().to_string(),
            response: Some(Box::new(response.boxed())),
        }
    }

    /// Create a transport error from any error, normalizing wrapped faults.
    #[must_use]
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(TransportFault::from_error(error))
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns the status code, if one is known.
    ///
    /// Always present for [`Error::Status`], sometimes for [`Error::Transport`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(fault) => fault.status(),
            _ => None,
        }
    }

    /// Reason phrase of a status error.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Status { reason, .. } => Some(reason),
            Self::Transport(fault) => Some(fault.message()),
            _ => None,
        }
    }

    /// The transport fault, if this is a transport error.
    #[must_use]
    pub const fn transport_fault(&self) -> Option<&TransportFault> {
        match self {
            Self::Transport(fault) => Some(fault),
            _ => None,
        }
    }

    /// Returns `true` if the response status indicated failure.
    #[must_use]
    pub const fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }

    /// Returns `true` if the call could not complete.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the caller cancelled the call.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a transport timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.transport_fault()
            .is_some_and(|fault| fault.kind() == TransportErrorKind::Timeout)
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns `true` if this is a 409 Conflict error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Returns `true` if this is a 412 Precondition Failed error.
    ///
    /// Raised by servers rejecting an `If-Match` guarded write.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        self.status() == Some(412)
    }

    /// The failed response, if this is a status error that carries one.
    #[must_use]
    pub fn response(&self) -> Option<&Response<BoxBody>> {
        match self {
            Self::Status { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// Take the failed response out of the error.
    #[must_use]
    pub fn into_response(self) -> Option<Response<BoxBody>> {
        match self {
            Self::Status { response, .. } => response.map(|response| *response),
            _ => None,
        }
    }

    /// Read the body of the failed response, if there is one.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the body stream fails.
    pub async fn body_bytes(self) -> Result<Option<Bytes>> {
        match self.into_response() {
            Some(response) => response.bytes().await.map(Some),
            None => Ok(None),
        }
    }
}
