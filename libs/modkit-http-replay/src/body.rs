use crate::error::{BoxError, ReplayError};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body::{Body, Frame};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Type alias for every response body produced by this crate.
///
/// Live bodies from the transport, buffered capture bodies, in-memory
/// fixtures and lazily streamed files are all erased to this type so the
/// replay layer can hand any of them back to the caller.
pub type ReplayBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Body with no content.
#[must_use]
pub fn empty() -> ReplayBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Body over an in-memory buffer.
///
/// `Bytes` is reference counted, so every call can hand out a fresh body
/// over the same stored buffer without copying or draining it.
#[must_use]
pub fn full(bytes: Bytes) -> ReplayBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Body that streams a file lazily in chunks.
///
/// The body owns the handle: it is released when the body is dropped, on
/// completion, error or cancellation alike.
#[must_use]
pub fn from_file(file: File) -> ReplayBody {
    let frames = ReaderStream::new(file)
        .map_ok(Frame::data)
        .map_err(|e| -> BoxError { Box::new(e) });
    StreamBody::new(frames).boxed()
}

/// Box an arbitrary transport body into a [`ReplayBody`].
#[must_use]
pub fn boxed<B>(body: B) -> ReplayBody
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

/// Read a body to the end.
///
/// Returns `None` when the body carried no bytes at all.
///
/// # Errors
/// Returns `ReplayError::Body` if reading any frame fails.
pub async fn collect<B>(body: B) -> Result<Option<Bytes>, ReplayError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let collected = body
        .collect()
        .await
        .map_err(|e| ReplayError::Body(e.into()))?
        .to_bytes();
    Ok((!collected.is_empty()).then_some(collected))
}
