#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP interaction record-and-replay for `ModKit`
//!
//! This crate provides a tower layer that sits in front of an HTTP transport
//! and can, per request:
//! - forward it untouched (`Normal`)
//! - forward it and persist the live response (`Capture`)
//! - answer it from previously persisted responses without any network I/O (`Fake`)
//!
//! Persisted responses live in a [`MessageStore`]. Two backends ship with the
//! crate: [`InMemoryStore`] (a concurrent map, shared by cloning) and
//! [`FileSystemStore`] (two files per entry, named by the uppercase SHA-1 of
//! the request key, readable and editable by hand).
//!
//! # Lookup key
//!
//! By default a request is identified by its absolute URL only; method,
//! headers and request body are ignored. Plug in a custom [`KeyDeriver`] to
//! change that.
//!
//! # Fixtures
//!
//! Responses can be authored without any live traffic:
//!
//! ```ignore
//! use modkit_http_replay::{InMemoryStore, MessageStore};
//!
//! let store = InMemoryStore::new();
//! store
//!     .register(|b| b.url("http://api.local/users/1").body_json(&user))
//!     .await?;
//! ```
//!
//! # Example
//!
//! ```ignore
//! use modkit_http_replay::{HttpTransport, ReplayConfig, ReplayLayer, ReplayMode};
//! use tower::ServiceBuilder;
//!
//! let layer = ReplayLayer::from_config(&ReplayConfig::capture_to("tests/fixtures/http"));
//! let mode = layer.mode_handle();
//! let client = ServiceBuilder::new().layer(layer).service(HttpTransport::new());
//!
//! // ... exercise the client against the real service ...
//!
//! mode.set(ReplayMode::Fake);
//! // ... the same calls are now answered from tests/fixtures/http ...
//! ```

pub mod body;
mod builder;
mod config;
mod container;
mod error;
mod headers;
mod key;
mod layers;
mod mode;
pub mod store;
mod transport;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod testing;

pub use body::ReplayBody;
pub use builder::{
    ContainerBuilder, JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE, TEXT_CONTENT_TYPE,
};
pub use config::{ReplayConfig, StoreConfig, TransportConfig};
pub use container::{ResponseContainer, reason_phrase};
pub use error::{BoxError, ReplayError};
pub use headers::{HeaderMultimap, is_content_header};
pub use key::{KeyDeriver, UrlKeyDeriver};
pub use layers::{ReplayLayer, ReplayService};
pub use mode::{ModeHandle, ParseModeError, ReplayMode};
pub use store::{FileSystemStore, InMemoryStore, MessageStore};
pub use transport::{HttpTransport, TransportService};
