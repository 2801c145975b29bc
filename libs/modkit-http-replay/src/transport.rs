use crate::body::{self, ReplayBody};
use crate::config::TransportConfig;
use crate::error::BoxError;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::task::{Context, Poll};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

/// Type-erased transport stack
pub type TransportService = BoxCloneService<Request<Full<Bytes>>, Response<ReplayBody>, BoxError>;

/// Plain-HTTP transport for the replay layer.
///
/// A pooled hyper client with an optional per-request timeout. Response
/// bodies are streamed, not buffered; the replay layer decides when to read
/// them. Transport and timeout failures surface as [`BoxError`] so callers
/// can downcast to the underlying hyper or tower error.
#[derive(Clone)]
pub struct HttpTransport {
    service: TransportService,
}

impl HttpTransport {
    /// Transport with default pool and timeout settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&TransportConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &TransportConfig) -> Self {
        let mut client_builder = Client::builder(TokioExecutor::new());

        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }

        let client = client_builder.build_http::<Full<Bytes>>();

        let service = match config.request_timeout {
            Some(timeout) => TimeoutLayer::new(timeout)
                .layer(client)
                .map_response(map_incoming_response)
                .boxed_clone(),
            None => client
                .map_response(map_incoming_response)
                .map_err(BoxError::from)
                .boxed_clone(),
        };

        tracing::debug!(
            timeout = ?config.request_timeout,
            pool_idle_timeout = ?config.pool_idle_timeout,
            "built HTTP transport"
        );

        Self { service }
    }

    /// The underlying boxed service stack.
    #[must_use]
    pub fn into_service(self) -> TransportService {
        self.service
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl Service<Request<Full<Bytes>>> for HttpTransport {
    type Response = Response<ReplayBody>;
    type Error = BoxError;
    type Future = <TransportService as Service<Request<Full<Bytes>>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Full<Bytes>>) -> Self::Future {
        self.service.call(request)
    }
}

fn map_incoming_response(response: Response<Incoming>) -> Response<ReplayBody> {
    response.map(body::boxed)
}
