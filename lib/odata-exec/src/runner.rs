//! Request execution.
//!
//! [`RequestRunner`] runs one [`RequestDescriptor`] through a fixed pipeline:
//!
//! 1. build a fresh transport (credentials, pre-authentication, configure-transport hook)
//! 2. decorate the wire message (`Accept`, `If-Match: *`, custom headers, before-request hook)
//! 3. dispatch, racing the caller's cancellation token
//! 4. run the after-response hook, then turn non-2xx statuses into [`Error::Status`]
//!
//! Every failure leaves as an [`Error`]. Nothing is retried here; wrap the
//! runner (it is a [`tower::Service`]) to add retries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http::header::{ACCEPT, IF_MATCH};
use http::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    Credentials, Error, HeaderCollection, MakeTransport, RequestDescriptor, RequestParts,
    Response, Result, Session, Transport,
};

/// Body type of the responses produced through `M`.
pub type TransportBody<M> = <<M as MakeTransport>::Transport as Transport>::Body;

/// Future type for the Tower Service implementation.
pub type ServiceFuture<B> = Pin<Box<dyn Future<Output = Result<Response<B>>> + Send + 'static>>;

/// Executes requests, one transport per call.
///
/// Cloning is cheap: the transport factory and the session are shared.
///
/// # Example
///
/// ```ignore
/// use odata_exec::prelude::*;
///
/// let runner = RequestRunner::new(HyperTransportFactory::default(), Session::new());
///
/// let request = RequestDescriptor::builder(Method::Get, url)
///     .accept("application/json")
///     .build()?;
///
/// match runner.execute(request).await {
///     Ok(response) => println!("{}", response.text().await?),
///     Err(err) if err.is_not_found() => println!("no such entity"),
///     Err(err) => return Err(err),
/// }
/// ```
pub struct RequestRunner<M: MakeTransport> {
    make_transport: Arc<M>,
    session: Arc<Session<M::Transport>>,
}

impl<M: MakeTransport> Clone for RequestRunner<M> {
    fn clone(&self) -> Self {
        Self {
            make_transport: Arc::clone(&self.make_transport),
            session: Arc::clone(&self.session),
        }
    }
}

impl<M: MakeTransport> std::fmt::Debug for RequestRunner<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRunner")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<M: MakeTransport> RequestRunner<M> {
    /// Create a runner from a transport factory and a session.
    #[must_use]
    pub fn new(make_transport: M, session: impl Into<Arc<Session<M::Transport>>>) -> Self {
        Self {
            make_transport: Arc::new(make_transport),
            session: session.into(),
        }
    }

    /// The shared session.
    #[must_use]
    pub const fn session(&self) -> &Arc<Session<M::Transport>> {
        &self.session
    }

    /// Execute a request.
    ///
    /// # Errors
    ///
    /// - [`Error::Status`] if the response status is not 2xx
    /// - [`Error::Transport`] if the request could not complete
    pub async fn execute(&self, request: RequestDescriptor) -> Result<Response<TransportBody<M>>> {
        self.execute_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Execute a request, aborting it when `cancel` fires.
    ///
    /// Cancellation wins over a response that has not been observed yet.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fired before the response was observed
    /// - [`Error::Status`] if the response status is not 2xx
    /// - [`Error::Transport`] if the request could not complete
    pub async fn execute_with_cancellation(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response<TransportBody<M>>> {
        let span = info_span!("odata_request", method = %request.method(), url = %request.url());
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response<TransportBody<M>>> {
        let requires_if_match = request.requires_if_match();
        let RequestParts {
            headers,
            accept,
            credentials,
            mut message,
            ..
        } = request.into_parts();

        let transport = self.build_transport(credentials);

        decorate(&mut message, &accept, requires_if_match, &headers);
        if let Some(hook) = self.session.before_request() {
            hook(&mut message);
        }

        debug!(headers = ?message.headers(), "sending request");
        let start = Instant::now();
        let outcome = dispatch(transport, message, cancel).await;

        // Saturating conversion to u64 (truncates after ~584 million years)
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => self.finish(response, elapsed_ms),
            Err(Error::Cancelled) => {
                debug!(elapsed_ms, "request cancelled");
                Err(Error::Cancelled)
            }
            Err(err) => {
                warn!(error = %err, elapsed_ms, "request failed");
                Err(err)
            }
        }
    }

    fn build_transport(&self, credentials: Option<Credentials>) -> M::Transport {
        let mut transport = self.make_transport.make_transport();

        if let Some(credentials) = credentials {
            transport.set_credentials(credentials);
            if transport.supports_pre_authenticate() {
                transport.set_pre_authenticate(true);
            }
        }

        if let Some(hook) = self.session.configure_transport() {
            hook(&mut transport);
        }
        transport
    }

    fn finish(
        &self,
        response: Response<TransportBody<M>>,
        elapsed_ms: u64,
    ) -> Result<Response<TransportBody<M>>> {
        if let Some(hook) = self.session.after_response() {
            hook(&response);
        }

        let status = response.status().as_u16();
        if response.is_success() {
            info!(status, elapsed_ms, "request completed");
            Ok(response)
        } else {
            warn!(
                status,
                reason = response.reason_phrase(),
                elapsed_ms,
                "request failed with HTTP error"
            );
            Err(Error::from_response(response))
        }
    }
}

/// Adds `Accept`, `If-Match` and the caller's headers to the message.
///
/// Header syntax is not re-validated; entries that cannot be put on the
/// wire are skipped.
fn decorate(
    message: &mut http::Request<Bytes>,
    accept: &[String],
    requires_if_match: bool,
    headers: &HeaderCollection,
) {
    let target = message.headers_mut();

    for media_type in accept {
        match HeaderValue::from_str(media_type) {
            Ok(value) => {
                target.append(ACCEPT, value);
            }
            Err(_) => warn!(media_type, "skipping invalid accept media type"),
        }
    }

    if requires_if_match {
        target.append(IF_MATCH, HeaderValue::from_static("*"));
    }

    for (name, value) in headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                target.append(name, value);
            }
            _ => warn!(header = name, "skipping header that cannot be sent"),
        }
    }
}

/// The single suspension point: send, unless cancelled first.
async fn dispatch<T: Transport>(
    transport: T,
    message: http::Request<Bytes>,
    cancel: &CancellationToken,
) -> Result<Response<T::Body>> {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        outcome = transport.send(message) => outcome,
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    outcome.map_err(Error::transport)
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

impl<M: MakeTransport> Service<RequestDescriptor> for RequestRunner<M> {
    type Response = Response<TransportBody<M>>;
    type Error = Error;
    type Future = ServiceFuture<TransportBody<M>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RequestDescriptor) -> Self::Future {
        let runner = self.clone();
        Box::pin(async move { runner.execute(request).await })
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Mutex;
    use std::time::Duration;

    use assert2::{check, let_assert};
    use http::StatusCode;
    use http_body_util::Full;
    use tower::ServiceExt;

    use super::*;
    use crate::{BoxError, Method, RequestDescriptorBuilder, TransportErrorKind, make_transport_fn};

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        sent: Arc<Mutex<Vec<http::Request<Bytes>>>>,
        cancel_on_send: Option<CancellationToken>,
    }

    impl Recorder {
        fn record(&self, event: impl Into<String>) {
            self.events.lock().expect("events").push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("events").clone()
        }

        fn count(&self, event: &str) -> usize {
            self.events().iter().filter(|e| *e == event).count()
        }

        fn last_sent(&self) -> http::Request<Bytes> {
            let sent = self.sent.lock().expect("sent");
            let request = sent.last().expect("a request was sent");
            let mut copy = http::Request::new(request.body().clone());
            *copy.method_mut() = request.method().clone();
            *copy.headers_mut() = request.headers().clone();
            copy
        }

        fn hook(&self, event: &'static str) -> impl Fn() + Send + Sync + 'static {
            let recorder = self.clone();
            move || recorder.record(event)
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Status(u16, &'static str),
        Refused,
        Hang,
    }

    /// Layer wrapping an I/O error, like an HTTP client does.
    #[derive(Debug)]
    struct ClientError(BoxError);

    impl fmt::Display for ClientError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("client error")
        }
    }

    impl std::error::Error for ClientError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&*self.0)
        }
    }

    struct MockTransport {
        recorder: Recorder,
        reply: Reply,
        supports_pre_authenticate: bool,
        pre_authenticate: bool,
    }

    impl Drop for MockTransport {
        fn drop(&mut self) {
            self.recorder.record("released");
        }
    }

    impl Transport for MockTransport {
        type Body = Full<Bytes>;

        fn set_credentials(&mut self, _credentials: Credentials) {
            self.recorder.record("credentials");
        }

        fn supports_pre_authenticate(&self) -> bool {
            self.supports_pre_authenticate
        }

        fn set_pre_authenticate(&mut self, enabled: bool) {
            self.pre_authenticate = enabled;
            self.recorder.record("pre-authenticate");
        }

        async fn send(
            self,
            request: http::Request<Bytes>,
        ) -> std::result::Result<Response<Self::Body>, BoxError> {
            self.recorder
                .record(format!("send pre_auth={}", self.pre_authenticate));
            self.recorder.sent.lock().expect("sent").push(request);
            if let Some(token) = &self.recorder.cancel_on_send {
                token.cancel();
            }

            match self.reply {
                Reply::Status(status, reason) => {
                    let mut headers = http::HeaderMap::new();
                    headers.insert("x-mock", HeaderValue::from_static("yes"));
                    let status = StatusCode::from_u16(status).expect("status");
                    Ok(Response::new(status, headers, Full::new(Bytes::from("body")))
                        .with_reason(reason))
                }
                Reply::Refused => {
                    let io = std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    );
                    let wrapped = ClientError(Box::new(ClientError(Box::new(io))));
                    Err(Box::new(wrapped))
                }
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    fn runner(
        recorder: &Recorder,
        reply: Reply,
        supports_pre_authenticate: bool,
        session: Session<MockTransport>,
    ) -> RequestRunner<impl MakeTransport<Transport = MockTransport>> {
        let recorder = recorder.clone();
        let make = make_transport_fn(move || MockTransport {
            recorder: recorder.clone(),
            reply,
            supports_pre_authenticate,
            pre_authenticate: false,
        });
        RequestRunner::new(make, session)
    }

    fn recording_session(recorder: &Recorder) -> Session<MockTransport> {
        let configure = recorder.hook("configure");
        let before = recorder.hook("before");
        let after = recorder.hook("after");
        Session::new()
            .with_configure_transport(move |_| configure())
            .with_before_request(move |_| before())
            .with_after_response(move |_| after())
    }

    fn request(method: Method) -> RequestDescriptorBuilder {
        let url = url::Url::parse("http://localhost/odata/Products(1)").expect("url");
        RequestDescriptor::builder(method, url)
    }

    #[tokio::test]
    async fn phases_run_once_in_order() {
        let recorder = Recorder::default();
        let session = recording_session(&recorder);
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, session);

        let request = request(Method::Get)
            .credentials(Credentials::basic("user", "pass"))
            .build()
            .expect("request");
        runner.execute(request).await.expect("response");

        check!(
            recorder.events()
                == [
                    "credentials",
                    "pre-authenticate",
                    "configure",
                    "before",
                    "send pre_auth=true",
                    "released",
                    "after",
                ]
        );
    }

    #[tokio::test]
    async fn pre_authentication_is_skipped_when_unsupported() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(200, "OK"), false, Session::new());

        let request = request(Method::Get)
            .credentials(Credentials::bearer("token"))
            .build()
            .expect("request");
        runner.execute(request).await.expect("response");

        check!(recorder.events() == ["credentials", "send pre_auth=false", "released"]);
    }

    #[tokio::test]
    async fn no_credentials_leaves_transport_alone() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(204, "No Content"), true, Session::new());

        runner
            .execute(request(Method::Delete).build().expect("request"))
            .await
            .expect("response");

        check!(recorder.events() == ["send pre_auth=false", "released"]);
    }

    #[tokio::test]
    async fn if_match_only_for_guarded_conditional_writes() {
        let methods = [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Patch,
            Method::Delete,
            Method::Head,
        ];

        for method in methods {
            for check_concurrency in [true, false] {
                let recorder = Recorder::default();
                let runner = runner(&recorder, Reply::Status(200, "OK"), true, Session::new());
                let request = request(method)
                    .check_optimistic_concurrency(check_concurrency)
                    .build()
                    .expect("request");
                runner.execute(request).await.expect("response");

                let sent = recorder.last_sent();
                let if_match: Vec<_> = sent.headers().get_all(IF_MATCH).iter().collect();
                let expected = check_concurrency && method.is_conditional_write();
                if expected {
                    check!(if_match == ["*"], "{method} with concurrency check");
                } else {
                    check!(if_match.is_empty(), "{method} check={check_concurrency}");
                }
            }
        }
    }

    #[tokio::test]
    async fn accept_headers_keep_order() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, Session::new());

        let request = request(Method::Get)
            .accept("application/json;odata.metadata=minimal")
            .accept("application/atom+xml")
            .accept("application/json;odata.metadata=minimal")
            .build()
            .expect("request");
        runner.execute(request).await.expect("response");

        let sent = recorder.last_sent();
        let accept: Vec<_> = sent.headers().get_all(ACCEPT).iter().collect();
        check!(
            accept
                == [
                    "application/json;odata.metadata=minimal",
                    "application/atom+xml",
                    "application/json;odata.metadata=minimal",
                ]
        );
    }

    #[tokio::test]
    async fn custom_headers_are_forwarded() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, Session::new());

        let request = request(Method::Post)
            .header("Prefer", "return=minimal")
            .header("prefer", "odata.continue-on-error")
            .header("bad header", "value")
            .header("X-Line", "bad\nvalue")
            .header("DataServiceVersion", "3.0")
            .build()
            .expect("request");
        runner.execute(request).await.expect("response");

        let sent = recorder.last_sent();
        let prefer: Vec<_> = sent.headers().get_all("prefer").iter().collect();
        check!(prefer == ["return=minimal", "odata.continue-on-error"]);
        check!(sent.headers()["dataserviceversion"] == "3.0");
        check!(!sent.headers().contains_key("x-line"));
        check!(sent.headers().len() == 3);
    }

    #[tokio::test]
    async fn before_request_sees_decorations_and_its_changes_are_sent() {
        let recorder = Recorder::default();
        let session = Session::new().with_before_request(|message: &mut http::Request<Bytes>| {
            assert!(message.headers().contains_key(ACCEPT));
            message
                .headers_mut()
                .insert("x-request-id", HeaderValue::from_static("42"));
        });
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, session);

        let request = request(Method::Get)
            .accept("application/json")
            .build()
            .expect("request");
        runner.execute(request).await.expect("response");

        check!(recorder.last_sent().headers()["x-request-id"] == "42");
    }

    #[tokio::test]
    async fn success_response_is_returned_unaltered() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, Session::new());

        let response = runner
            .execute(request(Method::Get).build().expect("request"))
            .await
            .expect("response");

        check!(response.status() == StatusCode::OK);
        check!(response.header("x-mock") == Some("yes"));
        check!(response.bytes().await.expect("body") == "body");
    }

    #[tokio::test]
    async fn failed_status_becomes_status_error_after_hook() {
        let recorder = Recorder::default();
        let runner = runner(
            &recorder,
            Reply::Status(404, "Not Found"),
            true,
            recording_session(&recorder),
        );

        let err = runner
            .execute(request(Method::Get).build().expect("request"))
            .await
            .expect_err("404 must fail");

        check!(err.is_status());
        check!(err.status() == Some(404));
        check!(err.reason() == Some("Not Found"));
        check!(recorder.count("after") == 1);

        let_assert!(Some(response) = err.into_response());
        check!(response.header("x-mock") == Some("yes"));
        check!(response.text().await.expect("body") == "body");
    }

    #[tokio::test]
    async fn status_error_keeps_server_reason() {
        let recorder = Recorder::default();
        let runner = runner(
            &recorder,
            Reply::Status(409, "Entity Changed"),
            true,
            Session::new(),
        );

        let err = runner
            .execute(request(Method::Put).build().expect("request"))
            .await
            .expect_err("409 must fail");

        check!(err.is_conflict());
        check!(err.reason() == Some("Entity Changed"));
        check!(err.to_string() == "HTTP error 409: Entity Changed");
    }

    #[tokio::test]
    async fn transport_fault_is_normalized() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Refused, true, recording_session(&recorder));

        let err = runner
            .execute(request(Method::Get).build().expect("request"))
            .await
            .expect_err("refused must fail");

        let_assert!(Error::Transport(fault) = err);
        check!(fault.kind() == TransportErrorKind::Connect);
        check!(fault.message() == "client error: connection refused");
        check!(recorder.count("after") == 0);
        check!(recorder.count("released") == 1);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_wins() {
        let recorder = Recorder::default();
        let session = recording_session(&recorder);
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, session);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner
            .execute_with_cancellation(request(Method::Get).build().expect("request"), &cancel)
            .await
            .expect_err("cancelled");

        check!(err.is_cancelled());
        check!(!err.is_status() && !err.is_transport());
        check!(recorder.count("after") == 0);
        check!(recorder.count("released") == 1);
    }

    #[tokio::test]
    async fn cancellation_wins_over_successful_completion() {
        let cancel = CancellationToken::new();
        let recorder = Recorder {
            cancel_on_send: Some(cancel.clone()),
            ..Recorder::default()
        };
        let session = recording_session(&recorder);
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, session);

        let err = runner
            .execute_with_cancellation(request(Method::Get).build().expect("request"), &cancel)
            .await
            .expect_err("cancelled");

        check!(err.is_cancelled());
        check!(recorder.count("send pre_auth=false") == 1);
        check!(recorder.count("after") == 0);
        check!(recorder.count("released") == 1);
    }

    #[tokio::test]
    async fn cancellation_wins_over_transport_failure() {
        let cancel = CancellationToken::new();
        let recorder = Recorder {
            cancel_on_send: Some(cancel.clone()),
            ..Recorder::default()
        };
        let runner = runner(&recorder, Reply::Refused, true, Session::new());

        let err = runner
            .execute_with_cancellation(request(Method::Get).build().expect("request"), &cancel)
            .await
            .expect_err("cancelled");

        check!(err.is_cancelled());
        check!(!err.is_transport());
        check!(recorder.count("released") == 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_dispatch() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Hang, true, Session::new());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = runner
            .execute_with_cancellation(request(Method::Get).build().expect("request"), &cancel)
            .await
            .expect_err("cancelled");

        check!(err.is_cancelled());
        check!(recorder.events() == ["send pre_auth=false", "released"]);
    }

    #[tokio::test]
    async fn runner_is_a_tower_service() {
        let recorder = Recorder::default();
        let runner = runner(&recorder, Reply::Status(201, "Created"), true, Session::new());

        let response = runner
            .oneshot(request(Method::Post).build().expect("request"))
            .await
            .expect("response");

        check!(response.status() == StatusCode::CREATED);
    }

    #[tokio::test]
    async fn concurrent_calls_share_the_session() {
        let recorder = Recorder::default();
        let session = recording_session(&recorder);
        let runner = runner(&recorder, Reply::Status(200, "OK"), true, session);

        let (first, second) = tokio::join!(
            runner.execute(request(Method::Get).build().expect("request")),
            runner.execute(request(Method::Get).build().expect("request")),
        );
        first.expect("first");
        second.expect("second");

        check!(recorder.count("before") == 2);
        check!(recorder.count("after") == 2);
        check!(recorder.count("released") == 2);
    }
}
