//! HTTP transport using hyper-util.
//!
//! A [`HyperTransport`] lives for exactly one call: it is created by a
//! [`HyperTransportFactory`], optionally tweaked by the session's
//! configure-transport hook, then consumed by [`Transport::send`].

use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, USER_AGENT, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::debug;

use crate::{
    BoxError, Credentials, MakeTransport, Response, Transport, TransportConfig, TransportErrorKind,
    TransportFault,
    connector::{default_tls_config, https_connector},
};

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Single-use HTTP transport with rustls TLS.
///
/// Supports pre-emptive authentication: with it enabled the `Authorization`
/// header goes out with the first request. With credentials but without
/// pre-authentication, the request is sent bare and re-sent once with
/// credentials if the server answers `401` with a matching challenge.
#[derive(Debug)]
pub struct HyperTransport {
    config: TransportConfig,
    tls_config: Arc<rustls::ClientConfig>,
    default_headers: HeaderMap,
    credentials: Option<Credentials>,
    pre_authenticate: bool,
}

impl HyperTransport {
    /// Create a transport trusting the Mozilla root certificates.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self::with_tls_config(config, Arc::new(default_tls_config()))
    }

    /// Create a transport with a custom rustls configuration.
    #[must_use]
    pub fn with_tls_config(config: TransportConfig, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            config,
            tls_config,
            default_headers: HeaderMap::new(),
            credentials: None,
            pre_authenticate: false,
        }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    #[must_use]
    pub fn config_mut(&mut self) -> &mut TransportConfig {
        &mut self.config
    }

    /// Replace the rustls configuration (custom roots, client certificates, ...).
    pub fn set_tls_config(&mut self, tls_config: Arc<rustls::ClientConfig>) {
        self.tls_config = tls_config;
    }

    /// Headers added to the request when it does not already carry them.
    #[must_use]
    pub fn default_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.default_headers
    }

    /// Attached credentials.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Whether credentials are sent before being challenged.
    #[must_use]
    pub const fn pre_authenticate(&self) -> bool {
        self.pre_authenticate
    }

    fn client(&self) -> HyperClient {
        let connector = https_connector((*self.tls_config).clone(), &self.config);
        Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector)
    }

    fn apply_defaults(&self, request: &mut http::Request<Bytes>) {
        let headers = request.headers_mut();
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(user_agent) = &self.config.user_agent
            && !headers.contains_key(USER_AGENT)
        {
            match HeaderValue::from_str(user_agent) {
                Ok(value) => {
                    headers.insert(USER_AGENT, value);
                }
                Err(_) => debug!(user_agent, "skipping invalid user agent"),
            }
        }
    }

    async fn round_trip(
        &self,
        client: &HyperClient,
        request: http::Request<Bytes>,
    ) -> Result<Response<Incoming>, TransportFault> {
        let request = request.map(Full::new);
        let response = tokio::time::timeout(self.config.timeout, client.request(request))
            .await
            .map_err(|elapsed| {
                TransportFault::new(
                    TransportErrorKind::Timeout,
                    format!("no response within {:?}", self.config.timeout),
                )
                .with_source(elapsed)
            })?
            .map_err(map_client_error)?;

        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
            .map(str::to_owned);
        let response = Response::from_http(response);

        Ok(match reason {
            Some(reason) => response.with_reason(reason),
            None => response,
        })
    }

    async fn dispatch(
        mut self,
        mut request: http::Request<Bytes>,
    ) -> Result<Response<Incoming>, TransportFault> {
        self.apply_defaults(&mut request);
        let client = self.client();

        let Some(credentials) = self.credentials.take() else {
            return self.round_trip(&client, request).await;
        };
        let authorization = HeaderValue::from_str(&credentials.authorization()).map_err(|err| {
            TransportFault::new(TransportErrorKind::Other, "credentials cannot be sent as a header")
                .with_source(err)
        })?;

        if self.pre_authenticate {
            request
                .headers_mut()
                .entry(AUTHORIZATION)
                .or_insert(authorization);
            return self.round_trip(&client, request).await;
        }

        let mut challenged = duplicate(&request);
        let response = self.round_trip(&client, request).await?;
        let answers_challenge = response.status() == StatusCode::UNAUTHORIZED
            && response
                .headers()
                .get_all(WWW_AUTHENTICATE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .any(|challenge| credentials.answers(challenge));
        if !answers_challenge {
            return Ok(response);
        }

        debug!(scheme = credentials.scheme(), "answering authentication challenge");
        drop(response);
        challenged.headers_mut().insert(AUTHORIZATION, authorization);
        self.round_trip(&client, challenged).await
    }
}

impl Transport for HyperTransport {
    type Body = Incoming;

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    fn supports_pre_authenticate(&self) -> bool {
        true
    }

    fn set_pre_authenticate(&mut self, enabled: bool) {
        self.pre_authenticate = enabled;
    }

    async fn send(self, request: http::Request<Bytes>) -> Result<Response<Incoming>, BoxError> {
        self.dispatch(request).await.map_err(BoxError::from)
    }
}

/// Copy of the request head and body, for the challenge round trip.
fn duplicate(request: &http::Request<Bytes>) -> http::Request<Bytes> {
    let mut copy = http::Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

fn map_client_error(err: hyper_util::client::legacy::Error) -> TransportFault {
    let is_connect = err.is_connect();
    let fault = TransportFault::from_error(err);

    if is_connect && fault.kind() == TransportErrorKind::Other {
        fault.with_kind(TransportErrorKind::Connect)
    } else {
        fault
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Creates a fresh [`HyperTransport`] for every call.
///
/// Only the immutable configuration is shared; connections are never
/// reused across calls.
///
/// # Example
///
/// ```ignore
/// use odata_exec::{HyperTransportFactory, RequestRunner, Session, TransportConfig};
/// use std::time::Duration;
///
/// let factory = HyperTransportFactory::new(
///     TransportConfig::builder().timeout(Duration::from_secs(10)).build(),
/// );
/// let runner = RequestRunner::new(factory, Session::new());
/// ```
#[derive(Debug, Clone)]
pub struct HyperTransportFactory {
    config: TransportConfig,
    tls_config: Arc<rustls::ClientConfig>,
}

impl HyperTransportFactory {
    /// Create a factory trusting the Mozilla root certificates.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self::with_tls_config(config, Arc::new(default_tls_config()))
    }

    /// Create a factory with a custom rustls configuration.
    #[must_use]
    pub const fn with_tls_config(
        config: TransportConfig,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self { config, tls_config }
    }

    /// Configuration given to every transport.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Default for HyperTransportFactory {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl MakeTransport for HyperTransportFactory {
    type Transport = HyperTransport;

    fn make_transport(&self) -> HyperTransport {
        HyperTransport::with_tls_config(self.config.clone(), Arc::clone(&self.tls_config))
    }
}
