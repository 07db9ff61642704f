use std::path::PathBuf;

use thiserror::Error;

use crate::TrackId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open clip {path:?} for track {track_id}: {reason}")]
    ResourceExhausted {
        track_id: TrackId,
        path: PathBuf,
        reason: String,
    },

    #[error("clip write failed for track {track_id}: {reason}")]
    WriteError { track_id: TrackId, reason: String },

    #[error("audit log persistence failed: {0}")]
    PersistenceError(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Yaml Error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
