use crate::body::{self, ReplayBody};
use crate::error::ReplayError;
use crate::headers::HeaderMultimap;
use bytes::Bytes;
use http::{Response, StatusCode};
use hyper::ext::ReasonPhrase;

/// One captured HTTP exchange, as held by a store.
///
/// Response headers and content headers are kept apart: content headers
/// describe the body and are only written back when a body is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContainer {
    /// Key the entry is stored under
    pub request_key: String,
    pub status: StatusCode,
    pub reason_phrase: String,
    pub response_headers: HeaderMultimap,
    pub content_headers: HeaderMultimap,
    /// Raw, already-encoded body; `None` means no content
    pub body: Option<Bytes>,
}

impl ResponseContainer {
    /// Empty `200 OK` container for `request_key`.
    #[must_use]
    pub fn new(request_key: impl Into<String>) -> Self {
        Self {
            request_key: request_key.into(),
            status: StatusCode::OK,
            reason_phrase: canonical_reason(StatusCode::OK),
            response_headers: HeaderMultimap::new(),
            content_headers: HeaderMultimap::new(),
            body: None,
        }
    }

    /// Capture a buffered response.
    ///
    /// The reason phrase comes from hyper's [`ReasonPhrase`] extension when the
    /// transport recorded a non-canonical one.
    #[must_use]
    pub fn from_response(
        request_key: impl Into<String>,
        response: &Response<Option<Bytes>>,
    ) -> Self {
        let (response_headers, content_headers) =
            HeaderMultimap::split_header_map(response.headers());
        Self {
            request_key: request_key.into(),
            status: response.status(),
            reason_phrase: reason_phrase(response),
            response_headers,
            content_headers,
            body: response.body().clone(),
        }
    }

    /// Whether this response is worth storing.
    ///
    /// Only successful (2xx) responses other than `204 No Content` that carry
    /// a body are kept.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        is_cacheable_status(self.status) && self.body.is_some()
    }

    /// Rebuild a response with a fresh body over the stored bytes.
    ///
    /// # Errors
    /// Returns an error if a stored header name or value is not valid HTTP.
    pub fn to_response(&self) -> Result<Response<ReplayBody>, ReplayError> {
        let body = self.body.clone().map(body::full);
        assemble_response(
            self.status,
            &self.reason_phrase,
            &self.response_headers,
            &self.content_headers,
            body,
        )
    }
}

/// Whether a response with `status` may be stored at all: 2xx except `204`.
#[must_use]
pub fn is_cacheable_status(status: StatusCode) -> bool {
    status.is_success() && status != StatusCode::NO_CONTENT
}

/// Canonical reason phrase for `status`, or an empty string for unknown codes.
#[must_use]
pub fn canonical_reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_owned()
}

/// Build a response from stored parts.
///
/// Content headers are dropped when `body` is `None` so a body-less response
/// never advertises content it does not have.
pub fn assemble_response(
    status: StatusCode,
    reason_phrase: &str,
    response_headers: &HeaderMultimap,
    content_headers: &HeaderMultimap,
    body: Option<ReplayBody>,
) -> Result<Response<ReplayBody>, ReplayError> {
    let has_body = body.is_some();
    let mut response = Response::new(body.unwrap_or_else(body::empty));
    *response.status_mut() = status;

    response_headers.write_into(response.headers_mut())?;
    if has_body {
        content_headers.write_into(response.headers_mut())?;
    }

    attach_reason_phrase(&mut response, reason_phrase);
    Ok(response)
}

/// Record a non-canonical reason phrase on the response.
pub fn attach_reason_phrase<B>(response: &mut Response<B>, reason_phrase: &str) {
    if reason_phrase.is_empty() || response.status().canonical_reason() == Some(reason_phrase) {
        return;
    }
    match ReasonPhrase::try_from(reason_phrase.as_bytes().to_vec()) {
        Ok(reason) => {
            response.extensions_mut().insert(reason);
        }
        Err(_) => {
            tracing::debug!(
                reason_phrase,
                "reason phrase contains invalid bytes; falling back to canonical reason"
            );
        }
    }
}

/// Reason phrase carried by a response, falling back to the canonical one.
#[must_use]
pub fn reason_phrase<B>(response: &Response<B>) -> String {
    response.extensions().get::<ReasonPhrase>().map_or_else(
        || canonical_reason(response.status()),
        |reason| String::from_utf8_lossy(reason.as_bytes()).into_owned(),
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn buffered(status: u16, body: Option<&'static str>) -> Response<Option<Bytes>> {
        Response::builder()
            .status(status)
            .header("content-type", "text/plain")
            .header("cache-control", "max-age=60")
            .body(body.map(|text| Bytes::from_static(text.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_new_defaults_to_ok() {
        let container = ResponseContainer::new("http://x/a");
        assert_eq!(container.status, StatusCode::OK);
        assert_eq!(container.reason_phrase, "OK");
        assert!(container.body.is_none());
    }

    #[test]
    fn test_from_response_splits_headers() {
        let container = ResponseContainer::from_response("k", &buffered(200, Some("hi")));
        assert_eq!(container.content_headers.first("content-type"), Some("text/plain"));
        assert_eq!(container.response_headers.first("cache-control"), Some("max-age=60"));
        assert!(!container.response_headers.contains("content-type"));
        assert_eq!(container.body.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_from_response_reads_custom_reason() {
        let mut response = buffered(200, Some("hi"));
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(b"All Good"));
        let container = ResponseContainer::from_response("k", &response);
        assert_eq!(container.reason_phrase, "All Good");
    }

    #[test]
    fn test_cacheable_rule() {
        assert!(ResponseContainer::from_response("k", &buffered(200, Some("x"))).is_cacheable());
        assert!(!ResponseContainer::from_response("k", &buffered(200, None)).is_cacheable());
        assert!(!ResponseContainer::from_response("k", &buffered(204, Some("x"))).is_cacheable());
        assert!(!ResponseContainer::from_response("k", &buffered(500, Some("x"))).is_cacheable());
        assert!(!ResponseContainer::from_response("k", &buffered(302, Some("x"))).is_cacheable());
    }

    #[tokio::test]
    async fn test_to_response_without_body_drops_content_headers() {
        let container = ResponseContainer::from_response("k", &buffered(200, None));
        let response = container.to_response().unwrap();
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(response.headers()["cache-control"], "max-age=60");
        assert_eq!(body::collect(response.into_body()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_to_response_is_repeatable() {
        let mut container = ResponseContainer::from_response("k", &buffered(200, Some("hi")));
        container.reason_phrase = "Fine".to_owned();

        for _ in 0..3 {
            let response = container.to_response().unwrap();
            assert_eq!(reason_phrase(&response), "Fine");
            assert_eq!(response.headers()["content-type"], "text/plain");
            let bytes = body::collect(response.into_body()).await.unwrap();
            assert_eq!(bytes.as_deref(), Some(&b"hi"[..]));
        }
    }

    #[test]
    fn test_canonical_reason_not_attached() {
        let response = ResponseContainer::new("k").to_response().unwrap();
        assert!(response.extensions().get::<ReasonPhrase>().is_none());
        assert_eq!(reason_phrase(&response), "OK");
    }
}
