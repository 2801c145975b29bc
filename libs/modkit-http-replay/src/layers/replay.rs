use crate::body::{self, ReplayBody};
use crate::config::ReplayConfig;
use crate::container::is_cacheable_status;
use crate::error::BoxError;
use crate::mode::{ModeHandle, ReplayMode};
use crate::store::MessageStore;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::BodyExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;

/// Tower layer that records and replays HTTP interactions
///
/// Behaviour per [`ReplayMode`]:
/// - `Normal`: forward to the inner transport, store untouched
/// - `Capture`: forward, buffer the live body, save it, return the live
///   response rebuilt over the buffered bytes
/// - `Fake`: answer from the store; the inner transport is never called
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(FileSystemStore::new("tests/fixtures"));
/// let layer = ReplayLayer::new(store, ReplayMode::Capture);
/// let mode = layer.mode_handle();
/// let mut service = ServiceBuilder::new().layer(layer).service(HttpTransport::new());
///
/// // first run records, later runs replay
/// mode.set(ReplayMode::Fake);
/// ```
#[derive(Clone)]
pub struct ReplayLayer {
    store: Arc<dyn MessageStore>,
    mode: ModeHandle,
}

impl ReplayLayer {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, mode: ReplayMode) -> Self {
        Self {
            store,
            mode: ModeHandle::new(mode),
        }
    }

    /// Layer driven by an externally owned mode handle.
    #[must_use]
    pub fn with_mode_handle(store: Arc<dyn MessageStore>, mode: ModeHandle) -> Self {
        Self { store, mode }
    }

    /// Layer built from configuration: store backend plus initial mode.
    #[must_use]
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::new(config.build_store(), config.mode)
    }

    /// Handle for switching the mode of every service built by this layer.
    #[must_use]
    pub fn mode_handle(&self) -> ModeHandle {
        self.mode.clone()
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn MessageStore> {
        Arc::clone(&self.store)
    }
}

impl<S> Layer<S> for ReplayLayer {
    type Service = ReplayService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReplayService {
            inner,
            store: Arc::clone(&self.store),
            mode: self.mode.clone(),
            ready_mode: None,
        }
    }
}

/// Service produced by [`ReplayLayer`]
///
/// Errors from the inner transport, including errors while reading a live
/// body during capture, are passed through unchanged (boxed); a failed save
/// surfaces as a boxed [`ReplayError`](crate::ReplayError). A store miss in
/// `Fake` mode is not an error but a `404` response.
///
/// The mode is sampled in `poll_ready` and the following `call` serves that
/// mode. In `Fake` mode the inner service is neither polled nor called.
pub struct ReplayService<S> {
    inner: S,
    store: Arc<dyn MessageStore>,
    mode: ModeHandle,
    ready_mode: Option<ReplayMode>,
}

impl<S: Clone> Clone for ReplayService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
            mode: self.mode.clone(),
            // readiness is not shared between clones
            ready_mode: None,
        }
    }
}

impl<S> ReplayService<S> {
    #[must_use]
    pub fn mode_handle(&self) -> ModeHandle {
        self.mode.clone()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ReplayService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Send + 'static,
    ResBody: Body<Data = Bytes> + Send + Sync + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<ReplayBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.ready_mode = None;
        let mode = self.mode.get();
        if mode == ReplayMode::Fake {
            self.ready_mode = Some(mode);
            return Poll::Ready(Ok(()));
        }

        let ready = self.inner.poll_ready(cx).map_err(Into::into);
        if matches!(ready, Poll::Ready(Ok(()))) {
            self.ready_mode = Some(mode);
        }
        ready
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mode = self.ready_mode.take().unwrap_or_else(|| self.mode.get());
        let span = tracing::debug_span!(
            "http_replay",
            mode = %mode,
            http.method = %req.method(),
            http.url = %req.uri(),
        );
        let store = Arc::clone(&self.store);

        if mode == ReplayMode::Fake {
            let (request, _) = req.into_parts();
            return Box::pin(
                async move {
                    let response = store.load(&request).await;
                    tracing::debug!(status = response.status().as_u16(), "replayed response");
                    Ok(response)
                }
                .instrument(span),
            );
        }

        // Swap so we call the instance that was poll_ready'd, leaving a fresh clone
        // for the next poll_ready cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if mode == ReplayMode::Normal {
            let response = inner.call(req);
            return Box::pin(
                async move {
                    let response = response.await.map_err(Into::into)?;
                    Ok(response.map(body::boxed))
                }
                .instrument(span),
            );
        }

        let (parts, req_body) = req.into_parts();
        let request = parts.clone();
        let response = inner.call(Request::from_parts(parts, req_body));
        Box::pin(
            async move {
                let response = response.await.map_err(Into::into)?;
                if !is_cacheable_status(response.status()) {
                    tracing::trace!(
                        status = response.status().as_u16(),
                        "not capturing unsuccessful response; streaming it through"
                    );
                    return Ok(response.map(body::boxed));
                }

                let (parts, live_body) = response.into_parts();
                let bytes = live_body
                    .collect()
                    .await
                    .map_err(Into::<BoxError>::into)?
                    .to_bytes();
                let buffered = Response::from_parts(parts, (!bytes.is_empty()).then_some(bytes));

                if let Err(e) = store.save(&request, &buffered).await {
                    tracing::warn!(error = %e, "failed to capture response");
                    return Err(e.into());
                }
                tracing::debug!(status = buffered.status().as_u16(), "captured response");

                Ok(buffered.map(|bytes| bytes.map_or_else(body::empty, body::full)))
            }
            .instrument(span),
        )
    }
}
