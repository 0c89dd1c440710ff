//! Error type shared by the engine, the store adapters and the HTTP surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backing store failed, timed out or could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored GeoJSON text could not be parsed into a usable geometry.
    #[error("malformed geometry for {id}: {reason}")]
    MalformedGeometry { id: String, reason: String },

    #[error("unknown hierarchy level '{0}'")]
    UnknownHierarchyLevel(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A blocking computation panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::StoreUnavailable(err.to_string())
    }

    pub fn malformed(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::MalformedGeometry {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
