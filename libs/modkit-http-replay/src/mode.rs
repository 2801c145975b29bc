use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How the replay layer treats each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Forward to the transport; never touch the store
    #[default]
    Normal,
    /// Forward to the transport and save the live response
    Capture,
    /// Answer from the store; never touch the transport
    Fake,
}

impl ReplayMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Capture => "capture",
            Self::Fake => "fake",
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown replay mode '{0}', expected one of: normal, capture, fake")]
pub struct ParseModeError(String);

impl FromStr for ReplayMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "capture" => Ok(Self::Capture),
            "fake" => Ok(Self::Fake),
            _ => Err(ParseModeError(s.to_owned())),
        }
    }
}

/// Shared, switchable mode.
///
/// Every clone of a replay service holds a clone of the same handle, so
/// flipping the mode here affects all of them. Each call reads the mode once
/// when it starts; a call in flight is never switched mid-way.
#[derive(Debug, Clone, Default)]
pub struct ModeHandle {
    mode: Arc<RwLock<ReplayMode>>,
}

impl ModeHandle {
    #[must_use]
    pub fn new(mode: ReplayMode) -> Self {
        Self {
            mode: Arc::new(RwLock::new(mode)),
        }
    }

    #[must_use]
    pub fn get(&self) -> ReplayMode {
        *self.mode.read()
    }

    pub fn set(&self, mode: ReplayMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            tracing::debug!(from = %previous, to = %mode, "replay mode changed");
        }
    }
}
