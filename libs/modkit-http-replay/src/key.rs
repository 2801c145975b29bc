//! Request fingerprinting
//!
//! A [`KeyDeriver`] maps an outbound request to the string under which its
//! response is stored. The default, [`UrlKeyDeriver`], uses the absolute
//! request URL only: method, headers and body are ignored, so two requests
//! to the same URL share one stored response.

use http::request::Parts;

/// Derives the storage key for an outbound request.
///
/// Implementations must be deterministic and must not panic for any
/// well-formed request.
pub trait KeyDeriver: Send + Sync {
    fn derive_key(&self, request: &Parts) -> String;
}

/// Default deriver: the request's absolute URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlKeyDeriver;

impl KeyDeriver for UrlKeyDeriver {
    fn derive_key(&self, request: &Parts) -> String {
        request.uri.to_string()
    }
}

impl<F> KeyDeriver for F
where
    F: Fn(&Parts) -> String + Send + Sync,
{
    fn derive_key(&self, request: &Parts) -> String {
        self(request)
    }
}
