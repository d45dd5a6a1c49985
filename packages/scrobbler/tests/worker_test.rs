//! Worker integration tests
//!
//! These drive the worker thread through a recording fake service and
//! verify the producer/consumer contract: every request is eventually
//! serviced, concurrent producers lose no updates, multiple flags set in
//! one wake cycle are serviced session-first, and shutdown never leaves a
//! request pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use encore_lastfm_client::{
    IgnoredPlay, LastfmError, LastfmResult, Play, ScrobbleOutcome, Session, TrackMetadata,
};
use encore_scrobbler::{
    Permission, ScrobbleService, Scrobbler, ScrobblerConfig, ScrobblerHandle, SessionStore,
};
use tempfile::{tempdir, TempDir};
use test_log::test;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    GetToken,
    GetSession,
    ValidateSession,
    NowPlaying(String),
    Scrobble(usize),
}

/// Reusable open/closed latch for stalling the fake mid-call
#[derive(Clone, Default)]
struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait_open(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

/// Recording fake of the scrobbling service
#[derive(Clone)]
struct FakeService {
    calls: Arc<Mutex<Vec<Call>>>,
    /// When set, the first validate call blocks until the gate opens
    validate_gate: Option<Gate>,
    network_down: Arc<AtomicBool>,
    session_invalid: Arc<AtomicBool>,
    token_authorized: Arc<AtomicBool>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            validate_gate: None,
            network_down: Arc::new(AtomicBool::new(false)),
            session_invalid: Arc::new(AtomicBool::new(false)),
            token_authorized: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl FakeService {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_health(&self) -> LastfmResult<()> {
        if self.network_down.load(Ordering::SeqCst) {
            return Err(LastfmError::Timeout);
        }
        if self.session_invalid.load(Ordering::SeqCst) {
            return Err(LastfmError::SessionInvalid);
        }
        Ok(())
    }

    fn session(&self) -> Session {
        Session {
            key: "sk".to_string(),
            username: "listener".to_string(),
            subscriber: false,
        }
    }
}

impl ScrobbleService for FakeService {
    fn get_token(&mut self) -> LastfmResult<String> {
        self.record(Call::GetToken);
        self.check_health()?;
        Ok("tok".to_string())
    }

    fn authorize_url(&self, token: &str) -> String {
        format!("http://auth.test/?token={token}")
    }

    fn get_session(&mut self, _token: &str) -> LastfmResult<Session> {
        self.record(Call::GetSession);
        self.check_health()?;
        if !self.token_authorized.load(Ordering::SeqCst) {
            return Err(LastfmError::TokenNotAuthorized);
        }
        Ok(self.session())
    }

    fn validate_session(&mut self, _session_key: &str) -> LastfmResult<Session> {
        self.record(Call::ValidateSession);
        if let Some(gate) = self.validate_gate.take() {
            gate.wait_open();
        }
        self.check_health()?;
        Ok(self.session())
    }

    fn update_now_playing(
        &mut self,
        _session_key: &str,
        track: &TrackMetadata,
    ) -> LastfmResult<()> {
        self.record(Call::NowPlaying(track.title.clone()));
        self.check_health()
    }

    fn scrobble(&mut self, _session_key: &str, plays: &[Play]) -> LastfmResult<ScrobbleOutcome> {
        self.record(Call::Scrobble(plays.len()));
        self.check_health()?;
        Ok(ScrobbleOutcome {
            accepted: plays.len() as u32,
            ignored: Vec::<IgnoredPlay>::new(),
        })
    }
}

fn track(title: &str) -> TrackMetadata {
    TrackMetadata::new("Broadcast", title)
}

fn play(title: &str, started_at: i64) -> Play {
    Play {
        track: track(title),
        started_at,
    }
}

/// Spawn a worker with a saved session already in place
fn spawn_with_session(service: FakeService) -> (Scrobbler, ScrobblerHandle, TempDir) {
    let dir = tempdir().unwrap();
    let config = ScrobblerConfig::new("key", "secret", dir.path());
    SessionStore::new(config.session_store_path())
        .save(&Session {
            key: "sk".to_string(),
            username: "listener".to_string(),
            subscriber: false,
        })
        .unwrap();
    let scrobbler = Scrobbler::spawn(service, config).unwrap();
    let handle = scrobbler.handle();
    (scrobbler, handle, dir)
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn every_request_is_eventually_serviced() {
    let service = FakeService::default();
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    handle.check_permission();
    handle.now_playing(track("Come On Let's Go"));
    handle.enqueue(play("Come On Let's Go", 1_700_000_000)).unwrap();

    wait_for("all requests serviced", || {
        let calls = service.calls();
        calls.contains(&Call::ValidateSession)
            && calls
                .iter()
                .any(|c| matches!(c, Call::NowPlaying(t) if t == "Come On Let's Go"))
            && calls.iter().any(|c| matches!(c, Call::Scrobble(_)))
    });

    wait_for("journal drained", || handle.pending_plays().unwrap() == 0);
    assert_eq!(handle.permission(), Permission::Allowed);
    assert_eq!(handle.username().as_deref(), Some("listener"));

    scrobbler.shutdown();
}

#[test]
fn requests_batched_in_one_wake_are_serviced_session_first() {
    let gate = Gate::default();
    let mut service = FakeService::default();
    service.validate_gate = Some(gate.clone());
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    // Park the worker inside the first permission check, then pile up
    // requests so the next wake cycle sees them all at once.
    handle.check_permission();
    wait_for("worker parked in validate", || {
        service.calls().contains(&Call::ValidateSession)
    });
    handle.now_playing(track("Pendulum"));
    handle.enqueue(play("Pendulum", 1_700_000_100)).unwrap();
    handle.check_permission();
    gate.open();

    wait_for("second cycle finished", || {
        service.calls().iter().any(|c| matches!(c, Call::Scrobble(_)))
    });

    let calls = service.calls();
    let second_validate = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == Call::ValidateSession)
        .map(|(i, _)| i)
        .nth(1)
        .expect("second permission check");
    let now_playing = calls
        .iter()
        .position(|c| matches!(c, Call::NowPlaying(_)))
        .expect("now-playing call");
    let scrobble = calls
        .iter()
        .position(|c| matches!(c, Call::Scrobble(_)))
        .expect("scrobble call");

    assert!(
        second_validate < now_playing && now_playing < scrobble,
        "expected session check before now-playing before scrobble, got {calls:?}"
    );

    scrobbler.shutdown();
}

#[test]
fn concurrent_producers_lose_no_plays() {
    const PRODUCERS: usize = 4;
    const PLAYS_PER_PRODUCER: usize = 25;

    let service = FakeService::default();
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..PLAYS_PER_PRODUCER {
                    let title = format!("Track {p}-{i}");
                    handle.check_permission();
                    handle.now_playing(TrackMetadata::new("Various", title.as_str()));
                    handle
                        .enqueue(Play {
                            track: TrackMetadata::new("Various", title.as_str()),
                            started_at: 1_700_000_000 + (p * PLAYS_PER_PRODUCER + i) as i64,
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    wait_for("journal drained", || handle.pending_plays().unwrap() == 0);

    let submitted: usize = service
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::Scrobble(n) => Some(*n),
            _ => None,
        })
        .sum();
    assert_eq!(submitted, PRODUCERS * PLAYS_PER_PRODUCER);

    scrobbler.shutdown();
}

#[test]
fn large_journal_is_drained_in_bounded_batches() {
    let service = FakeService::default();
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    for i in 0..120 {
        handle.enqueue(play(&format!("Track {i}"), 1_700_000_000 + i)).unwrap();
    }
    wait_for("journal drained", || handle.pending_plays().unwrap() == 0);

    let batches: Vec<usize> = service
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::Scrobble(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(batches.iter().sum::<usize>(), 120);
    assert!(batches.iter().all(|&n| n <= 50), "batches: {batches:?}");

    scrobbler.shutdown();
}

#[test]
fn shutdown_services_requests_made_before_it() {
    let service = FakeService::default();
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    handle.now_playing(track("Corporeal"));
    handle.enqueue(play("Corporeal", 1_700_000_200)).unwrap();
    scrobbler.shutdown();

    // shutdown() joins, so everything requested before it has been handled
    let calls = service.calls();
    assert!(calls
        .iter()
        .any(|c| matches!(c, Call::NowPlaying(t) if t == "Corporeal")));
    assert!(calls.iter().any(|c| matches!(c, Call::Scrobble(1))));
    assert_eq!(handle.pending_plays().unwrap(), 0);
}

#[test]
fn network_failure_clears_the_flag_and_allows_retry() {
    let service = FakeService::default();
    service.network_down.store(true, Ordering::SeqCst);
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    handle.check_permission();
    wait_for("no-network result", || {
        handle.permission() == Permission::NoNetwork
    });

    // The flag was cleared, not left spinning; a fresh request succeeds.
    service.network_down.store(false, Ordering::SeqCst);
    handle.check_permission();
    wait_for("permission allowed", || {
        handle.permission() == Permission::Allowed
    });
    assert_eq!(
        service
            .calls()
            .iter()
            .filter(|c| **c == Call::ValidateSession)
            .count(),
        2
    );

    scrobbler.shutdown();
}

#[test]
fn rejected_session_denies_permission_and_keeps_journal() {
    let service = FakeService::default();
    service.session_invalid.store(true, Ordering::SeqCst);
    let (scrobbler, handle, _dir) = spawn_with_session(service.clone());

    handle.enqueue(play("Unsubmittable", 1_700_000_300)).unwrap();
    wait_for("scrobble attempted", || {
        service.calls().iter().any(|c| matches!(c, Call::Scrobble(_)))
    });
    wait_for("permission denied", || {
        handle.permission() == Permission::Denied
    });

    // Plays stay journalled until the user re-authenticates
    assert_eq!(handle.pending_plays().unwrap(), 1);

    scrobbler.shutdown();
}

#[test]
fn authorization_flow_reaches_allowed_once_user_approves() {
    let dir = tempdir().unwrap();
    let config = ScrobblerConfig::new("key", "secret", dir.path());
    let store_path = config.session_store_path();

    let service = FakeService::default();
    service.token_authorized.store(false, Ordering::SeqCst);
    let scrobbler = Scrobbler::spawn(service.clone(), config).unwrap();
    let handle = scrobbler.handle();

    // First check: no session, so the worker fetches a request token and
    // publishes where to authorize it.
    handle.check_permission();
    wait_for("authorize url published", || handle.authorize_url().is_some());
    assert_eq!(handle.permission(), Permission::Denied);
    assert!(handle.authorize_url().unwrap().contains("token=tok"));

    // Second check: token not approved yet.
    handle.check_permission();
    wait_for("session attempted", || {
        service.calls().contains(&Call::GetSession)
    });
    assert_eq!(handle.permission(), Permission::Denied);

    // User approves; third check trades the token for a session.
    service.token_authorized.store(true, Ordering::SeqCst);
    handle.check_permission();
    wait_for("permission allowed", || {
        handle.permission() == Permission::Allowed
    });
    assert_eq!(handle.username().as_deref(), Some("listener"));
    assert!(handle.authorize_url().is_none());

    // The session was persisted for the next run
    let saved = SessionStore::new(store_path).load().unwrap();
    assert_eq!(saved.map(|s| s.key), Some("sk".to_string()));

    scrobbler.shutdown();
}

#[test]
fn invalidate_session_forgets_credentials() {
    let service = FakeService::default();
    let (scrobbler, handle, dir) = spawn_with_session(service.clone());

    handle.check_permission();
    wait_for("permission allowed", || {
        handle.permission() == Permission::Allowed
    });

    handle.invalidate_session();
    wait_for("permission reset", || {
        handle.permission() == Permission::Unknown
    });
    assert!(handle.username().is_none());

    let config = ScrobblerConfig::new("key", "secret", dir.path());
    assert!(SessionStore::new(config.session_store_path())
        .load()
        .unwrap()
        .is_none());

    scrobbler.shutdown();
}

#[test]
fn migrate_config_imports_legacy_session() {
    let dir = tempdir().unwrap();
    let config = ScrobblerConfig::new("key", "secret", dir.path());
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        config.legacy_config_path(),
        "session_key=legacy_sk\nusername=old_user\n",
    )
    .unwrap();

    let service = FakeService::default();
    let scrobbler = Scrobbler::spawn(service.clone(), config.clone()).unwrap();
    let handle = scrobbler.handle();

    handle.migrate_config();
    handle.check_permission();
    wait_for("permission allowed", || {
        handle.permission() == Permission::Allowed
    });

    // The imported session was used for the check, not the token flow
    assert!(service.calls().contains(&Call::ValidateSession));
    assert!(!service.calls().contains(&Call::GetToken));
    assert!(!config.legacy_config_path().exists());

    scrobbler.shutdown();
}

#[test]
fn disabled_scrobbler_drops_submissions() {
    let dir = tempdir().unwrap();
    let mut config = ScrobblerConfig::new("key", "secret", dir.path());
    config.enabled = false;
    SessionStore::new(config.session_store_path())
        .save(&Session {
            key: "sk".to_string(),
            username: "listener".to_string(),
            subscriber: false,
        })
        .unwrap();

    let service = FakeService::default();
    let scrobbler = Scrobbler::spawn(service.clone(), config).unwrap();
    let handle = scrobbler.handle();

    handle.now_playing(track("Ignored"));
    handle.enqueue(play("Ignored", 1_700_000_400)).unwrap();
    assert_eq!(handle.pending_plays().unwrap(), 0);

    scrobbler.shutdown();
    assert!(service.calls().is_empty());
}
