use crate::mode::ReplayMode;
use crate::store::{FileSystemStore, InMemoryStore, MessageStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Store backend selection
///
/// Deserializes from an internally tagged map:
///
/// ```yaml
/// store:
///   type: file_system
///   root: tests/fixtures/http
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local concurrent map
    #[default]
    Memory,
    /// Two files per entry under `root`
    FileSystem { root: PathBuf },
}

/// Record-and-replay configuration
///
/// The composition root for the replay layer: one config produces one store
/// and one layer, which callers pass on explicitly instead of reaching for a
/// global instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Initial mode (default: `normal`)
    pub mode: ReplayMode,

    /// Store backend (default: in-memory)
    pub store: StoreConfig,
}

impl ReplayConfig {
    /// Config that captures into a fixture directory.
    #[must_use]
    pub fn capture_to(root: impl Into<PathBuf>) -> Self {
        Self {
            mode: ReplayMode::Capture,
            store: StoreConfig::FileSystem { root: root.into() },
        }
    }

    /// Config that replays from a fixture directory.
    #[must_use]
    pub fn replay_from(root: impl Into<PathBuf>) -> Self {
        Self {
            mode: ReplayMode::Fake,
            store: StoreConfig::FileSystem { root: root.into() },
        }
    }

    /// Construct the configured store.
    #[must_use]
    pub fn build_store(&self) -> Arc<dyn MessageStore> {
        match &self.store {
            StoreConfig::Memory => Arc::new(InMemoryStore::new()),
            StoreConfig::FileSystem { root } => Arc::new(FileSystemStore::new(root.clone())),
        }
    }
}

/// Configuration for the default [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout (default: 30 seconds). `None` disables it.
    pub request_timeout: Option<Duration>,

    /// Idle connection timeout for the pool (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}
