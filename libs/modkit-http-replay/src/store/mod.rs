//! Response stores
//!
//! A [`MessageStore`] keeps at most one [`ResponseContainer`] per request key.
//! Two backends are provided:
//!
//! - [`InMemoryStore`] - concurrent map, lives as long as the process (or
//!   as long as the last clone of the store)
//! - [`FileSystemStore`] - two files per entry under a root directory,
//!   shareable between runs and processes
//!
//! A miss is not an error: [`MessageStore::load`] answers it with a `404`
//! whose reason phrase names the missing key or file.

mod file;
mod memory;

pub use file::FileSystemStore;
pub use memory::InMemoryStore;

use crate::body::{self, ReplayBody};
use crate::builder::ContainerBuilder;
use crate::container::{ResponseContainer, attach_reason_phrase};
use crate::error::ReplayError;
use crate::key::KeyDeriver;
use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use http::{Response, StatusCode};

/// Storage contract shared by every backend.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Deriver that maps requests to storage keys.
    fn key_deriver(&self) -> &dyn KeyDeriver;

    /// Storage key for `request`.
    fn key_for(&self, request: &Parts) -> String {
        self.key_deriver().derive_key(request)
    }

    /// Upsert a container under its own `request_key`.
    ///
    /// # Errors
    /// Returns an error if the backend fails to persist the entry.
    async fn put(&self, container: ResponseContainer) -> Result<(), ReplayError>;

    /// Load the stored response for `request`, or a `404` on a miss.
    async fn load(&self, request: &Parts) -> Response<ReplayBody>;

    /// Delete the entry for `request`. Returns whether an entry existed.
    ///
    /// # Errors
    /// Returns an error if the backend fails to delete the entry.
    async fn remove(&self, request: &Parts) -> Result<bool, ReplayError>;

    /// Store a buffered live response for `request`.
    ///
    /// Failed (non-2xx), `204` and body-less responses are skipped, leaving
    /// any previous entry for the key untouched.
    ///
    /// # Errors
    /// Returns an error if the backend fails to persist the entry.
    async fn save(
        &self,
        request: &Parts,
        response: &Response<Option<Bytes>>,
    ) -> Result<(), ReplayError> {
        let container = ResponseContainer::from_response(self.key_for(request), response);
        if !container.is_cacheable() {
            tracing::trace!(
                key = %container.request_key,
                status = container.status.as_u16(),
                has_body = container.body.is_some(),
                "skipping capture of unsuccessful or empty response"
            );
            return Ok(());
        }
        self.put(container).await
    }

    /// Insert a fixture without a network round trip.
    ///
    /// The callback receives a fresh [`ContainerBuilder`] and is expected to
    /// set the target URL first, then status, headers and body. The same
    /// method is available on `dyn MessageStore`, so stores obtained from
    /// [`ReplayConfig::build_store`](crate::ReplayConfig::build_store) accept
    /// fixtures too.
    ///
    /// # Errors
    /// Returns the builder's error, or the backend's if persisting fails.
    async fn register<F>(&self, build: F) -> Result<(), ReplayError>
    where
        Self: Sized,
        F: FnOnce(ContainerBuilder) -> Result<ContainerBuilder, ReplayError> + Send,
    {
        register_fixture(self, build).await
    }
}

impl dyn MessageStore + '_ {
    /// [`MessageStore::register`] for type-erased stores.
    ///
    /// # Errors
    /// Returns the builder's error, or the backend's if persisting fails.
    pub async fn register<F>(&self, build: F) -> Result<(), ReplayError>
    where
        F: FnOnce(ContainerBuilder) -> Result<ContainerBuilder, ReplayError> + Send,
    {
        register_fixture(self, build).await
    }
}

async fn register_fixture<S, F>(store: &S, build: F) -> Result<(), ReplayError>
where
    S: MessageStore + ?Sized,
    F: FnOnce(ContainerBuilder) -> Result<ContainerBuilder, ReplayError>,
{
    let container = build(ContainerBuilder::new())?.build()?;
    tracing::debug!(key = %container.request_key, "registering fixture");
    store.put(container).await
}

/// Synthesized response for a key with no stored entry.
pub(crate) fn miss(reason: &str) -> Response<ReplayBody> {
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    attach_reason_phrase(&mut response, reason);
    response
}
