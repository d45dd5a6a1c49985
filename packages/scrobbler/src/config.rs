//! Scrobbler configuration and legacy-config migration

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ScrobblerError, ScrobblerResult};
use crate::session::SessionStore;
use encore_lastfm_client::Session;

/// File name of the persisted session store under the data directory
const SESSION_STORE_FILE: &str = "session.json";

/// File name of the pending-scrobble journal under the data directory
const JOURNAL_FILE: &str = "journal.log";

/// File name a previous scrobbler version stored its settings in
const LEGACY_CONFIG_FILE: &str = "scrobbler.legacy";

/// Scrobbler configuration
#[derive(Debug, Clone)]
pub struct ScrobblerConfig {
    /// API key identifying this application to the scrobbling service
    pub api_key: String,

    /// Shared secret used for request signing
    pub api_secret: String,

    /// Directory holding the session store, journal, and legacy config
    pub data_dir: PathBuf,

    /// Whether scrobbling is enabled at all
    pub enabled: bool,
}

impl ScrobblerConfig {
    /// Create a configuration with explicit values
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            data_dir: data_dir.into(),
            enabled: true,
        }
    }

    /// Load configuration from environment variables
    ///
    /// - `LASTFM_API_KEY` (required)
    /// - `LASTFM_API_SECRET` (required)
    /// - `SCROBBLER_DATA_DIR` (default: `.encore`)
    /// - `SCROBBLER_ENABLED` (default: `true`)
    pub fn from_env() -> ScrobblerResult<Self> {
        Ok(Self {
            api_key: get_required_env("LASTFM_API_KEY")?,
            api_secret: get_required_env("LASTFM_API_SECRET")?,
            data_dir: PathBuf::from(
                env::var("SCROBBLER_DATA_DIR").unwrap_or_else(|_| ".encore".to_string()),
            ),
            enabled: match env::var("SCROBBLER_ENABLED") {
                Ok(value) => parse_bool("SCROBBLER_ENABLED", &value)?,
                Err(_) => true,
            },
        })
    }

    /// Path of the persisted session store
    pub fn session_store_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_STORE_FILE)
    }

    /// Path of the pending-scrobble journal
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE)
    }

    /// Path a previous scrobbler version stored its settings in
    pub fn legacy_config_path(&self) -> PathBuf {
        self.data_dir.join(LEGACY_CONFIG_FILE)
    }

    /// Import credentials from a legacy plain-text config into the session
    /// store
    ///
    /// The legacy format is `key=value` lines with `session_key` and
    /// `username` entries. After a successful import the file is renamed
    /// aside, so repeating the migration is a no-op.
    ///
    /// Returns `true` if a legacy config was found and imported.
    pub fn migrate_legacy_config(&self, store: &SessionStore) -> ScrobblerResult<bool> {
        let legacy_path = self.legacy_config_path();
        if !legacy_path.exists() {
            return Ok(false);
        }

        let contents = fs::read_to_string(&legacy_path)?;
        let mut session_key = None;
        let mut username = None;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some(("session_key", value)) => session_key = Some(value.trim().to_string()),
                Some(("username", value)) => username = Some(value.trim().to_string()),
                _ => warn!(line = %line, "unrecognized legacy config line"),
            }
        }

        let migrated = match session_key {
            Some(key) if !key.is_empty() => {
                store.save(&Session {
                    key,
                    username: username.unwrap_or_default(),
                    subscriber: false,
                })?;
                info!(path = %legacy_path.display(), "imported legacy scrobbler session");
                true
            }
            _ => {
                warn!(
                    path = %legacy_path.display(),
                    "legacy config has no usable session key"
                );
                false
            }
        };

        rename_aside(&legacy_path)?;
        Ok(migrated)
    }
}

/// Rename a migrated file out of the way so migration stays idempotent
fn rename_aside(path: &Path) -> ScrobblerResult<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(".migrated");
    fs::rename(path, PathBuf::from(target))?;
    Ok(())
}

fn parse_bool(name: &'static str, value: &str) -> ScrobblerResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ScrobblerError::InvalidValue(name, value.to_string())),
    }
}

/// Helper function to get a required environment variable
fn get_required_env(name: &'static str) -> ScrobblerResult<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ScrobblerError::MissingEnvVar(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> ScrobblerConfig {
        ScrobblerConfig::new("key", "secret", dir)
    }

    #[test]
    fn paths_live_under_data_dir() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        assert!(config.session_store_path().starts_with(dir.path()));
        assert!(config.journal_path().starts_with(dir.path()));
    }

    #[test]
    fn migration_without_legacy_file_is_noop() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let store = SessionStore::new(config.session_store_path());
        assert!(!config.migrate_legacy_config(&store).unwrap());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn migration_imports_legacy_session() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let store = SessionStore::new(config.session_store_path());

        fs::write(
            config.legacy_config_path(),
            "# old scrobbler settings\nsession_key=legacy_sk\nusername=old_user\n",
        )
        .unwrap();

        assert!(config.migrate_legacy_config(&store).unwrap());
        let session = store.load().unwrap().expect("session imported");
        assert_eq!(session.key, "legacy_sk");
        assert_eq!(session.username, "old_user");

        // Legacy file renamed aside, second run is a no-op
        assert!(!config.legacy_config_path().exists());
        assert!(!config.migrate_legacy_config(&store).unwrap());
    }

    #[test]
    fn migration_rejects_empty_session_key() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let store = SessionStore::new(config.session_store_path());

        fs::write(config.legacy_config_path(), "session_key=\n").unwrap();

        assert!(!config.migrate_legacy_config(&store).unwrap());
        assert!(store.load().unwrap().is_none());
        assert!(!config.legacy_config_path().exists());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
