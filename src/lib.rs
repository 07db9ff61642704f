pub mod audit;
pub mod bbox;
pub mod classifier;
pub mod clip;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod rolling_avg;
pub mod sink;
pub mod smoother;
pub mod stats;
pub mod trajectory;

mod circular_queue;

pub use audit::{AuditLog, LogEntry};
pub use classifier::{BehaviorClassifier, Verdict};
pub use clip::ClipRecorder;
pub use config::Config;
pub use detection::Detection;
pub use engine::TrackEventEngine;
pub use frame::{Frame, Image};
pub use pipeline::{Pipeline, StopToken, TickReport};
pub use stats::{StatsHandle, StatsSnapshot};

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Identity of a track as assigned by the upstream tracker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for TrackId {
    fn from(id: u32) -> Self {
        TrackId(id)
    }
}
