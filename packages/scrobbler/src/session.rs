//! Session persistence and permission state

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::ScrobblerResult;
use encore_lastfm_client::Session;

/// Outcome of the most recent permission check, readable by producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// No check has completed yet
    #[default]
    Unknown,
    /// The service rejected the stored session; re-authentication needed
    Denied,
    /// The stored session is valid and scrobbling may proceed
    Allowed,
    /// The check could not reach the service
    NoNetwork,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Denied => write!(f, "denied"),
            Self::Allowed => write!(f, "allowed"),
            Self::NoNetwork => write!(f, "no network"),
        }
    }
}

/// On-disk store for the authenticated session
///
/// A missing file simply means no session has been saved yet.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the saved session, if any
    pub fn load(&self) -> ScrobblerResult<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let session: Session = serde_json::from_str(&contents)?;
        debug!(username = %session.username, "loaded saved session");
        Ok(Some(session))
    }

    /// Persist a session, replacing any previous one
    pub fn save(&self, session: &Session) -> ScrobblerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Remove the saved session
    pub fn clear(&self) -> ScrobblerResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
