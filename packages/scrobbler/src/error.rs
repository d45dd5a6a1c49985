//! Scrobbler error types

use thiserror::Error;

/// Errors from the scrobbler configuration, journal, and worker
#[derive(Error, Debug)]
pub enum ScrobblerError {
    /// Missing required environment variable
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid value for a configuration field
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    /// Filesystem access failed (journal, session store, legacy config)
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Journal or session store entry could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Scrobbling service call failed
    #[error("scrobbling service error: {0}")]
    Client(#[from] encore_lastfm_client::LastfmError),

    /// Worker thread could not be spawned
    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(String),
}

/// Result type for scrobbler operations
pub type ScrobblerResult<T> = Result<T, ScrobblerError>;
