//! Transport traits.
//!
//! - [`Transport`] - sends one request and hands back the raw response
//! - [`MakeTransport`] - creates a fresh transport for every call
//!
//! A transport is consumed by [`Transport::send`]: it is used once and
//! released when the call ends, whatever the outcome.

use std::future::Future;

use bytes::Bytes;

use crate::{BoxError, Credentials, Response};

/// Sends a single request over the network.
pub trait Transport: Send + Sized + 'static {
    /// Response body type, left unread by the executor.
    type Body: http_body::Body<Data = Bytes, Error: Into<BoxError>> + Send + Sync + 'static;

    /// Attach credential material.
    fn set_credentials(&mut self, credentials: Credentials);

    /// Returns `true` if this transport can send credentials before being
    /// challenged.
    fn supports_pre_authenticate(&self) -> bool {
        false
    }

    /// Enable or disable pre-emptive authentication.
    ///
    /// Only called when [`Transport::supports_pre_authenticate`] is `true`.
    fn set_pre_authenticate(&mut self, _enabled: bool) {}

    /// Send the request and wait for the response head.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not complete:
    /// - Name resolution errors
    /// - Connection errors
    /// - TLS errors
    /// - Timeouts
    fn send(
        self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Self::Body>, BoxError>> + Send;
}

/// Creates the transport used by one call.
pub trait MakeTransport: Send + Sync + 'static {
    /// Transport produced.
    type Transport: Transport;

    /// Create a fresh transport.
    fn make_transport(&self) -> Self::Transport;
}

/// [`MakeTransport`] backed by a closure, see [`make_transport_fn`].
#[derive(Debug, Clone, Copy)]
pub struct MakeTransportFn<F> {
    f: F,
}

/// Use a closure as a [`MakeTransport`].
///
/// # Example
///
/// ```ignore
/// let runner = RequestRunner::new(make_transport_fn(|| MyTransport::new()), session);
/// ```
pub const fn make_transport_fn<F, T>(f: F) -> MakeTransportFn<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transport,
{
    MakeTransportFn { f }
}

impl<F, T> MakeTransport for MakeTransportFn<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Transport,
{
    type Transport = T;

    fn make_transport(&self) -> T {
        (self.f)()
    }
}
