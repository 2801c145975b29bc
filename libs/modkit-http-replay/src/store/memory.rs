use super::{MessageStore, miss};
use crate::body::ReplayBody;
use crate::container::ResponseContainer;
use crate::error::ReplayError;
use crate::key::{KeyDeriver, UrlKeyDeriver};
use async_trait::async_trait;
use dashmap::DashMap;
use http::Response;
use http::request::Parts;
use std::sync::Arc;

/// Concurrent in-process store.
///
/// Clones share the same table, so one instance created at the composition
/// root can be handed to every layer and test helper that needs it. Entries
/// are never evicted.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, Arc<ResponseContainer>>>,
    key_deriver: Arc<dyn KeyDeriver>,
}

impl InMemoryStore {
    /// Empty store keyed by absolute request URL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_key_deriver(UrlKeyDeriver)
    }

    /// Empty store with a custom key deriver.
    #[must_use]
    pub fn with_key_deriver(key_deriver: impl KeyDeriver + 'static) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            key_deriver: Arc::new(key_deriver),
        }
    }

    /// Stored container for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ResponseContainer>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of the stored keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    fn key_deriver(&self) -> &dyn KeyDeriver {
        self.key_deriver.as_ref()
    }

    async fn put(&self, container: ResponseContainer) -> Result<(), ReplayError> {
        tracing::debug!(
            key = %container.request_key,
            status = container.status.as_u16(),
            "storing response in memory"
        );
        self.entries
            .insert(container.request_key.clone(), Arc::new(container));
        Ok(())
    }

    async fn load(&self, request: &Parts) -> Response<ReplayBody> {
        let key = self.key_for(request);
        let Some(container) = self.get(&key) else {
            tracing::debug!(key = %key, "no stored response in memory");
            return miss(&format!("No stored response for key '{key}'"));
        };

        container.to_response().unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "stored response cannot be replayed");
            miss(&format!("Stored response for key '{key}' cannot be replayed"))
        })
    }

    async fn remove(&self, request: &Parts) -> Result<bool, ReplayError> {
        let key = self.key_for(request);
        Ok(self.entries.remove(&key).is_some())
    }
}
