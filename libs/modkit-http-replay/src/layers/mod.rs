//! Tower layers for HTTP record-and-replay
//!
//! - [`ReplayLayer`] - intercepts outbound calls and, depending on the current
//!   [`ReplayMode`](crate::ReplayMode), forwards, captures or replays them

mod replay;

pub use replay::{ReplayLayer, ReplayService};
