//! Background scrobble submission worker
//!
//! All outbound service traffic (authentication, session renewal,
//! now-playing notifications, scrobble submission) is serialized onto one
//! dedicated thread. Producers communicate with it through a block of
//! request flags guarded by a single mutex and signalled over a condition
//! variable; `request`-style calls never block on network I/O.

use std::fs;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::ScrobblerConfig;
use crate::error::{ScrobblerError, ScrobblerResult};
use crate::journal::ScrobbleJournal;
use crate::service::ScrobbleService;
use crate::session::{Permission, SessionStore};
use encore_lastfm_client::{LastfmError, Play, Session, TrackMetadata};

/// Maximum plays submitted per scrobble call
const SCROBBLE_BATCH_LIMIT: usize = 50;

/// Request flags set by producers and cleared by the worker
///
/// The now-playing payload is the `Option` itself, so the flag can never
/// be observed set without its track.
#[derive(Debug, Default)]
struct RequestFlags {
    permission_check: bool,
    invalidate_session: bool,
    migrate_config: bool,
    now_playing: Option<TrackMetadata>,
    journal_pending: bool,
    shutdown: bool,
}

impl RequestFlags {
    fn any_set(&self) -> bool {
        self.permission_check
            || self.invalidate_session
            || self.migrate_config
            || self.now_playing.is_some()
            || self.journal_pending
            || self.shutdown
    }
}

/// Worker-published state readable by producers
#[derive(Debug, Default)]
struct Status {
    permission: Permission,
    username: Option<String>,
    authorize_url: Option<String>,
}

/// State shared between producers and the worker thread
#[derive(Default)]
struct Shared {
    flags: Mutex<RequestFlags>,
    signal: Condvar,
    status: Mutex<Status>,
}

impl Shared {
    fn set_status(&self, f: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }
}

/// Owner of the worker thread
///
/// Producers interact through cloned [`ScrobblerHandle`]s; dropping those
/// does not stop the worker. Call [`shutdown`](Scrobbler::shutdown) to
/// stop and join it.
pub struct Scrobbler {
    shared: Arc<Shared>,
    journal: Arc<ScrobbleJournal>,
    enabled: bool,
    thread: JoinHandle<()>,
}

impl Scrobbler {
    /// Spawn the worker thread
    ///
    /// At most one worker exists per `Scrobbler`; the thread runs until
    /// [`shutdown`](Scrobbler::shutdown).
    pub fn spawn<S: ScrobbleService>(
        service: S,
        config: ScrobblerConfig,
    ) -> ScrobblerResult<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let shared = Arc::new(Shared::default());
        let journal = Arc::new(ScrobbleJournal::new(config.journal_path()));
        let enabled = config.enabled;

        let worker = Worker {
            service,
            store: SessionStore::new(config.session_store_path()),
            journal: Arc::clone(&journal),
            shared: Arc::clone(&shared),
            config,
            session: None,
            pending_token: None,
        };
        let thread = thread::Builder::new()
            .name("scrobbler".to_string())
            .spawn(move || worker.run())
            .map_err(|e| ScrobblerError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            shared,
            journal,
            enabled,
            thread,
        })
    }

    /// Get a producer handle, cloneable and usable from any thread
    pub fn handle(&self) -> ScrobblerHandle {
        ScrobblerHandle {
            shared: Arc::clone(&self.shared),
            journal: Arc::clone(&self.journal),
            enabled: self.enabled,
        }
    }

    /// Signal the worker to stop and join its thread
    ///
    /// Requests made before this call are serviced before the thread
    /// exits; an in-flight network call is finished, not interrupted.
    pub fn shutdown(self) {
        {
            let mut flags = self.shared.flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.shutdown = true;
        }
        self.shared.signal.notify_all();
        if self.thread.join().is_err() {
            error!("scrobble worker thread panicked");
        }
    }
}

/// Producer-side handle to the worker
///
/// Every request method takes the flag mutex, marks the request, signals
/// the worker, and returns immediately.
#[derive(Clone)]
pub struct ScrobblerHandle {
    shared: Arc<Shared>,
    journal: Arc<ScrobbleJournal>,
    enabled: bool,
}

impl ScrobblerHandle {
    fn request(&self, set: impl FnOnce(&mut RequestFlags)) {
        {
            let mut flags = self.shared.flags.lock().unwrap_or_else(|e| e.into_inner());
            set(&mut flags);
        }
        self.shared.signal.notify_one();
    }

    /// Ask the worker to verify (or establish) scrobbling permission
    ///
    /// With a stored session this probes its validity. Without one it
    /// drives the authorization flow: the first check fetches a request
    /// token and publishes [`authorize_url`](Self::authorize_url); once
    /// the user has approved it, a later check trades the token for a
    /// session.
    pub fn check_permission(&self) {
        self.request(|flags| flags.permission_check = true);
    }

    /// Ask the worker to discard the current session, in memory and on
    /// disk
    pub fn invalidate_session(&self) {
        self.request(|flags| flags.invalidate_session = true);
    }

    /// Ask the worker to import settings from a previous scrobbler version
    pub fn migrate_config(&self) {
        self.request(|flags| flags.migrate_config = true);
    }

    /// Ask the worker to send a now-playing notification
    ///
    /// A newer track replaces one the worker has not picked up yet.
    pub fn now_playing(&self, track: TrackMetadata) {
        if !self.enabled {
            debug!("scrobbling disabled, dropping now-playing request");
            return;
        }
        self.request(|flags| flags.now_playing = Some(track));
    }

    /// Queue a play for submission
    ///
    /// The play is persisted to the journal before the worker is woken,
    /// so it survives a crash or an offline stretch.
    pub fn enqueue(&self, play: Play) -> ScrobblerResult<()> {
        if !self.enabled {
            debug!("scrobbling disabled, dropping play");
            return Ok(());
        }
        self.journal.append(&play)?;
        self.request(|flags| flags.journal_pending = true);
        Ok(())
    }

    /// Queue a play of `track` that started now
    pub fn enqueue_now(&self, track: TrackMetadata) -> ScrobblerResult<()> {
        self.enqueue(Play {
            track,
            started_at: Utc::now().timestamp(),
        })
    }

    /// Outcome of the most recent permission check
    pub fn permission(&self) -> Permission {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .permission
    }

    /// Username of the authenticated session, once known
    pub fn username(&self) -> Option<String> {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .username
            .clone()
    }

    /// URL the user must visit to authorize a pending request token
    pub fn authorize_url(&self) -> Option<String> {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .authorize_url
            .clone()
    }

    /// Number of plays waiting in the journal
    pub fn pending_plays(&self) -> ScrobblerResult<usize> {
        self.journal.len()
    }
}

/// The worker thread's owned state
struct Worker<S> {
    service: S,
    store: SessionStore,
    journal: Arc<ScrobbleJournal>,
    shared: Arc<Shared>,
    config: ScrobblerConfig,
    session: Option<Session>,
    pending_token: Option<String>,
}

impl<S: ScrobbleService> Worker<S> {
    fn run(mut self) {
        info!("scrobble worker started");
        loop {
            let snapshot = self.wait_for_requests();

            // Session and permission concerns come first so a submission
            // never goes out with a stale session.
            if snapshot.migrate_config {
                self.migrate_config();
            }
            if snapshot.invalidate_session {
                self.invalidate_session();
            }
            if snapshot.permission_check {
                self.check_permission();
            }
            if let Some(track) = snapshot.now_playing {
                self.send_now_playing(&track);
            }
            if snapshot.journal_pending {
                self.drain_journal();
            }
            if snapshot.shutdown {
                info!("scrobble worker stopping");
                return;
            }
        }
    }

    /// Block until at least one flag is set, then snapshot and clear the
    /// whole block while still holding the lock
    fn wait_for_requests(&self) -> RequestFlags {
        let mut flags = self.shared.flags.lock().unwrap_or_else(|e| e.into_inner());
        while !flags.any_set() {
            flags = self
                .shared
                .signal
                .wait(flags)
                .unwrap_or_else(|e| e.into_inner());
        }
        mem::take(&mut *flags)
    }

    /// Load the stored session on first use; returns the key to sign with
    fn session_key(&mut self) -> Option<String> {
        if self.session.is_none() {
            match self.store.load() {
                Ok(Some(session)) => {
                    let username = session.username.clone();
                    self.shared.set_status(|s| s.username = Some(username));
                    self.session = Some(session);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to load saved session"),
            }
        }
        self.session.as_ref().map(|s| s.key.clone())
    }

    fn set_permission(&self, permission: Permission) {
        self.shared.set_status(|s| s.permission = permission);
    }

    fn check_permission(&mut self) {
        if let Some(key) = self.session_key() {
            self.probe_session(&key);
            return;
        }
        if let Some(token) = self.pending_token.clone() {
            self.redeem_token(&token);
            return;
        }
        self.begin_authorization();
    }

    /// Verify a stored session key against the service
    fn probe_session(&mut self, key: &str) {
        match self.service.validate_session(key) {
            Ok(session) => {
                info!(username = %session.username, "scrobbling permission confirmed");
                self.shared
                    .set_status(|s| s.username = Some(session.username.clone()));
                self.session = Some(session);
                self.set_permission(Permission::Allowed);
            }
            Err(LastfmError::SessionInvalid) => {
                warn!("stored session rejected, re-authentication required");
                self.session = None;
                self.set_permission(Permission::Denied);
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "permission check could not reach the service");
                self.set_permission(Permission::NoNetwork);
            }
            Err(e) => {
                warn!(error = %e, "permission check failed");
                self.set_permission(Permission::Denied);
            }
        }
    }

    /// Try to trade an authorized request token for a session
    fn redeem_token(&mut self, token: &str) {
        match self.service.get_session(token) {
            Ok(session) => {
                info!(username = %session.username, "authorization complete");
                if let Err(e) = self.store.save(&session) {
                    warn!(error = %e, "failed to persist session");
                }
                self.pending_token = None;
                self.shared.set_status(|s| {
                    s.username = Some(session.username.clone());
                    s.authorize_url = None;
                });
                self.session = Some(session);
                self.set_permission(Permission::Allowed);
            }
            Err(LastfmError::TokenNotAuthorized) => {
                debug!("request token still awaiting user authorization");
                self.set_permission(Permission::Denied);
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "session request could not reach the service");
                self.set_permission(Permission::NoNetwork);
            }
            Err(e) => {
                warn!(error = %e, "request token rejected, restarting authorization");
                self.pending_token = None;
                self.shared.set_status(|s| s.authorize_url = None);
                self.set_permission(Permission::Denied);
            }
        }
    }

    /// Fetch a fresh request token and publish the authorization URL
    fn begin_authorization(&mut self) {
        match self.service.get_token() {
            Ok(token) => {
                let url = self.service.authorize_url(&token);
                info!(url = %url, "awaiting user authorization");
                self.pending_token = Some(token);
                self.shared.set_status(|s| s.authorize_url = Some(url));
                self.set_permission(Permission::Denied);
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "token request could not reach the service");
                self.set_permission(Permission::NoNetwork);
            }
            Err(e) => {
                warn!(error = %e, "token request failed");
                self.set_permission(Permission::Denied);
            }
        }
    }

    fn invalidate_session(&mut self) {
        info!("invalidating scrobbling session");
        self.session = None;
        self.pending_token = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to remove saved session");
        }
        self.shared.set_status(|s| {
            s.permission = Permission::Unknown;
            s.username = None;
            s.authorize_url = None;
        });
    }

    fn migrate_config(&mut self) {
        match self.config.migrate_legacy_config(&self.store) {
            Ok(true) => {
                // Drop the in-memory session so the imported one is used
                self.session = None;
            }
            Ok(false) => debug!("no legacy config to migrate"),
            Err(e) => warn!(error = %e, "legacy config migration failed"),
        }
    }

    fn send_now_playing(&mut self, track: &TrackMetadata) {
        let Some(key) = self.session_key() else {
            debug!("no session, dropping now-playing notification");
            return;
        };
        match self.service.update_now_playing(&key, track) {
            Ok(()) => debug!(artist = %track.artist, title = %track.title, "now-playing sent"),
            Err(LastfmError::SessionInvalid) => {
                warn!("session rejected during now-playing update");
                self.session = None;
                self.set_permission(Permission::Denied);
            }
            // Now-playing is non-persistent; a lost notification is fine
            Err(e) => warn!(error = %e, "now-playing notification failed"),
        }
    }

    /// Submit journalled plays in batches until the journal is empty or a
    /// failure says to stop
    fn drain_journal(&mut self) {
        let Some(key) = self.session_key() else {
            debug!("no session, leaving plays in the journal");
            return;
        };
        loop {
            let batch = match self.journal.peek_batch(SCROBBLE_BATCH_LIMIT) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "failed to read scrobble journal");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            match self.service.scrobble(&key, &batch) {
                Ok(outcome) => {
                    info!(
                        accepted = outcome.accepted,
                        ignored = outcome.ignored.len(),
                        "scrobble batch submitted"
                    );
                    for ignored in &outcome.ignored {
                        warn!(
                            artist = %ignored.artist,
                            title = %ignored.title,
                            code = %ignored.code,
                            "play ignored by service"
                        );
                    }
                    if let Err(e) = self.journal.remove_first(batch.len()) {
                        warn!(error = %e, "failed to trim scrobble journal");
                        return;
                    }
                }
                Err(LastfmError::SessionInvalid) => {
                    warn!("session rejected, keeping journal until re-authentication");
                    self.session = None;
                    self.set_permission(Permission::Denied);
                    return;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "scrobble submission failed, will retry later");
                    return;
                }
                Err(e) => {
                    // A batch the service permanently refuses would wedge
                    // the journal; drop it and move on.
                    error!(error = %e, dropped = batch.len(), "dropping unsubmittable batch");
                    if let Err(e) = self.journal.remove_first(batch.len()) {
                        warn!(error = %e, "failed to trim scrobble journal");
                        return;
                    }
                }
            }
        }
    }
}
