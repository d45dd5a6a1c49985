//! Persisted journal of plays awaiting submission
//!
//! One JSON record per line. Producers append while the worker drains, so
//! every file access goes through the journal's own mutex, separate from
//! the worker's request-flag lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::error::ScrobblerResult;
use encore_lastfm_client::Play;

/// Pending-scrobble journal backed by a JSON-lines file
///
/// A missing file is an empty journal.
#[derive(Debug)]
pub struct ScrobbleJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ScrobbleJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append a play to the end of the journal
    pub fn append(&self, play: &Play) -> ScrobblerResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(play)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read up to `max` plays from the front of the journal without
    /// removing them
    pub fn peek_batch(&self, max: usize) -> ScrobblerResult<Vec<Play>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.into_iter().take(max).collect())
    }

    /// Drop the first `n` plays, keeping the rest
    pub fn remove_first(&self, n: usize) -> ScrobblerResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let remaining: Vec<Play> = self.read_all()?.into_iter().skip(n).collect();
        let mut contents = String::new();
        for play in &remaining {
            contents.push_str(&serde_json::to_string(play)?);
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Number of pending plays
    pub fn len(&self) -> ScrobblerResult<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.len())
    }

    pub fn is_empty(&self) -> ScrobblerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Parse every journal line, skipping corrupt entries with a warning.
    /// Callers must hold the journal lock.
    fn read_all(&self) -> ScrobblerResult<Vec<Play>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        let mut plays = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Play>(line) {
                Ok(play) => plays.push(play),
                Err(e) => warn!(error = %e, "skipping corrupt journal entry"),
            }
        }
        Ok(plays)
    }
}
