//! Session hooks.
//!
//! A [`Session`] is shared by every request of a client. It holds the
//! caller's extension points, invoked at fixed points of each call:
//!
//! 1. configure-transport, with the freshly built transport
//! 2. before-request, with the decorated wire message
//! 3. after-response, with every response (success or not)
//!
//! Hooks must be safe to call concurrently: independent requests sharing a
//! session may run them at the same time.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::{Response, Transport};

/// Hook receiving the transport before anything is sent.
pub type ConfigureTransportHook<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Hook receiving the outgoing message, last thing before dispatch.
pub type BeforeRequestHook = Arc<dyn Fn(&mut http::Request<Bytes>) + Send + Sync>;

/// Hook receiving every response, before its status is checked.
pub type AfterResponseHook<B> = Arc<dyn Fn(&Response<B>) + Send + Sync>;

/// Caller-owned extension points shared across requests.
///
/// # Example
///
/// ```ignore
/// let session = Session::<HyperTransport>::new()
///     .with_configure_transport(|transport| {
///         transport.config_mut().timeout = Duration::from_secs(5);
///     })
///     .with_before_request(|request| {
///         request.headers_mut().insert("x-request-id", HeaderValue::from_static("42"));
///     })
///     .with_after_response(|response| {
///         tracing::debug!(status = %response.status(), "odata response");
///     });
/// ```
pub struct Session<T: Transport> {
    configure_transport: Option<ConfigureTransportHook<T>>,
    before_request: Option<BeforeRequestHook>,
    after_response: Option<AfterResponseHook<T::Body>>,
}

impl<T: Transport> Session<T> {
    /// Creates a session without hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            configure_transport: None,
            before_request: None,
            after_response: None,
        }
    }

    /// Set the configure-transport hook.
    #[must_use]
    pub fn with_configure_transport(
        mut self,
        hook: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        self.set_configure_transport(hook);
        self
    }

    /// Set the before-request hook.
    #[must_use]
    pub fn with_before_request(
        mut self,
        hook: impl Fn(&mut http::Request<Bytes>) + Send + Sync + 'static,
    ) -> Self {
        self.set_before_request(hook);
        self
    }

    /// Set the after-response hook.
    #[must_use]
    pub fn with_after_response(
        mut self,
        hook: impl Fn(&Response<T::Body>) + Send + Sync + 'static,
    ) -> Self {
        self.set_after_response(hook);
        self
    }

    /// Replace the configure-transport hook.
    pub fn set_configure_transport(&mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) {
        self.configure_transport = Some(Arc::new(hook));
    }

    /// Replace the before-request hook.
    pub fn set_before_request(
        &mut self,
        hook: impl Fn(&mut http::Request<Bytes>) + Send + Sync + 'static,
    ) {
        self.before_request = Some(Arc::new(hook));
    }

    /// Replace the after-response hook.
    pub fn set_after_response(
        &mut self,
        hook: impl Fn(&Response<T::Body>) + Send + Sync + 'static,
    ) {
        self.after_response = Some(Arc::new(hook));
    }

    /// Remove every hook.
    pub fn clear(&mut self) {
        self.configure_transport = None;
        self.before_request = None;
        self.after_response = None;
    }

    /// The configure-transport hook.
    #[must_use]
    pub fn configure_transport(&self) -> Option<&ConfigureTransportHook<T>> {
        self.configure_transport.as_ref()
    }

    /// The before-request hook.
    #[must_use]
    pub fn before_request(&self) -> Option<&BeforeRequestHook> {
        self.before_request.as_ref()
    }

    /// The after-response hook.
    #[must_use]
    pub fn after_response(&self) -> Option<&AfterResponseHook<T::Body>> {
        self.after_response.as_ref()
    }
}

impl<T: Transport> Default for Session<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            configure_transport: self.configure_transport.clone(),
            before_request: self.before_request.clone(),
            after_response: self.after_response.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("configure_transport", &self.configure_transport.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .finish()
    }
}
