use crate::container::{ResponseContainer, canonical_reason};
use crate::error::ReplayError;
use crate::headers::{HeaderMultimap, is_content_header};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Uri};
use serde::Serialize;

/// Content type set by [`ContainerBuilder::body_json`]
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type set by [`ContainerBuilder::body_text`]
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type set by [`ContainerBuilder::body_bytes`]
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
enum Target {
    Url(String),
    Key(String),
}

/// Step-wise builder for a [`ResponseContainer`].
///
/// Used to register canned fixtures without capturing real traffic.
///
/// # Example
///
/// ```ignore
/// let container = ContainerBuilder::new()
///     .url("http://x/post?page=10")
///     .status(StatusCode::OK)
///     .header("Cache-Control", "no-store")
///     .body_json(&serde_json::json!({"a": 1}))?
///     .build()?;
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct ContainerBuilder {
    target: Option<Target>,
    status: StatusCode,
    reason_phrase: String,
    response_headers: HeaderMultimap,
    content_headers: HeaderMultimap,
    body: Option<Bytes>,
}

impl ContainerBuilder {
    /// New builder for an empty `200 OK` response.
    pub fn new() -> Self {
        Self {
            target: None,
            status: StatusCode::OK,
            reason_phrase: canonical_reason(StatusCode::OK),
            response_headers: HeaderMultimap::new(),
            content_headers: HeaderMultimap::new(),
            body: None,
        }
    }

    /// Target URL. Normalized through [`Uri`] on [`build`](Self::build) so it
    /// matches the key the default deriver produces for the same request.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.target = Some(Target::Url(url.into()));
        self
    }

    /// Raw storage key, used verbatim. For stores with a custom key deriver.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.target = Some(Target::Key(key.into()));
        self
    }

    /// Set the status code and reset the reason phrase to its canonical text.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self.reason_phrase = canonical_reason(status);
        self
    }

    pub fn reason_phrase(mut self, reason: impl Into<String>) -> Self {
        self.reason_phrase = reason.into();
        self
    }

    fn headers_for(&mut self, name: &str) -> &mut HeaderMultimap {
        if is_content_header(name) {
            &mut self.content_headers
        } else {
            &mut self.response_headers
        }
    }

    /// Append a header value. `Content-*` style headers go to the content set.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers_for(&name).append(name, value);
        self
    }

    /// Replace all values of a header.
    pub fn set_header<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        self.headers_for(&name).insert(name, values);
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers_for(name).remove(name);
        self
    }

    fn set_body(mut self, bytes: Bytes, content_type: &str) -> Self {
        self.content_headers
            .insert("Content-Length", [bytes.len().to_string()]);
        self.content_headers.insert("Content-Type", [content_type]);
        self.body = Some(bytes);
        self
    }

    /// Text body; sets `Content-Type: text/plain` and `Content-Length`.
    pub fn body_text(self, text: impl Into<String>) -> Self {
        self.set_body(Bytes::from(text.into()), TEXT_CONTENT_TYPE)
    }

    /// Raw body; sets `Content-Type: application/octet-stream` and `Content-Length`.
    pub fn body_bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.set_body(bytes.into(), OCTET_STREAM_CONTENT_TYPE)
    }

    /// JSON body using `serde_json`.
    ///
    /// # Errors
    /// Returns `ReplayError::Json` if serialization fails.
    pub fn body_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, ReplayError> {
        self.body_with(value, JSON_CONTENT_TYPE, |value| {
            serde_json::to_vec(value).map_err(ReplayError::from)
        })
    }

    /// Body produced by a caller-supplied serializer.
    ///
    /// # Errors
    /// Propagates the serializer's error.
    pub fn body_with<T, F>(
        self,
        value: &T,
        content_type: &str,
        serialize: F,
    ) -> Result<Self, ReplayError>
    where
        T: ?Sized,
        F: FnOnce(&T) -> Result<Vec<u8>, ReplayError>,
    {
        let bytes = serialize(value)?;
        Ok(self.set_body(Bytes::from(bytes), content_type))
    }

    /// Drop any body along with the headers that described it.
    pub fn no_body(mut self) -> Self {
        self.body = None;
        self.content_headers.remove("Content-Length");
        self.content_headers.remove("Content-Type");
        self
    }

    /// Finish the container.
    ///
    /// # Errors
    /// - `ReplayError::MissingKey` if neither `url` nor `key` was set
    /// - `ReplayError::InvalidUri` if the URL is not an absolute URI
    /// - `ReplayError::InvalidHeaderName` / `InvalidHeaderValue` for headers
    ///   that could never be replayed
    pub fn build(self) -> Result<ResponseContainer, ReplayError> {
        let request_key = match self.target {
            None => return Err(ReplayError::MissingKey),
            Some(Target::Key(key)) => key,
            Some(Target::Url(url)) => normalize_url(&url)?,
        };

        let mut probe = HeaderMap::new();
        self.response_headers.write_into(&mut probe)?;
        self.content_headers.write_into(&mut probe)?;

        Ok(ResponseContainer {
            request_key,
            status: self.status,
            reason_phrase: self.reason_phrase,
            response_headers: self.response_headers,
            content_headers: self.content_headers,
            body: self.body,
        })
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_url(url: &str) -> Result<String, ReplayError> {
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| ReplayError::InvalidUri {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(ReplayError::InvalidUri {
            url: url.to_owned(),
            reason: "URL must be absolute (scheme and host required)".to_owned(),
        });
    }
    Ok(uri.to_string())
}
