//! Client seam between the worker thread and the scrobbling service
//!
//! The worker calls the service through this trait so tests can substitute
//! a recording fake for the real network client.

use encore_lastfm_client::{
    LastfmClient, LastfmResult, Play, ScrobbleOutcome, Session, TrackMetadata,
};

use crate::error::{ScrobblerError, ScrobblerResult};

/// Blocking interface to the scrobbling service, owned exclusively by the
/// worker thread
pub trait ScrobbleService: Send + 'static {
    /// Fetch an unauthorized request token
    fn get_token(&mut self) -> LastfmResult<String>;

    /// Build the URL where the user authorizes a request token
    fn authorize_url(&self, token: &str) -> String;

    /// Trade an authorized token for a session
    fn get_session(&mut self, token: &str) -> LastfmResult<Session>;

    /// Probe whether a stored session key is still accepted
    fn validate_session(&mut self, session_key: &str) -> LastfmResult<Session>;

    /// Send a now-playing notification
    fn update_now_playing(
        &mut self,
        session_key: &str,
        track: &TrackMetadata,
    ) -> LastfmResult<()>;

    /// Submit a batch of plays
    fn scrobble(&mut self, session_key: &str, plays: &[Play]) -> LastfmResult<ScrobbleOutcome>;
}

/// [`ScrobbleService`] implementation driving the async [`LastfmClient`]
/// from the worker thread via a current-thread runtime
pub struct BlockingLastfm {
    client: LastfmClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingLastfm {
    pub fn new(client: LastfmClient) -> ScrobblerResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ScrobblerError::WorkerSpawn(e.to_string()))?;
        Ok(Self { client, runtime })
    }
}

impl ScrobbleService for BlockingLastfm {
    fn get_token(&mut self) -> LastfmResult<String> {
        self.runtime.block_on(self.client.get_token())
    }

    fn authorize_url(&self, token: &str) -> String {
        self.client.authorize_url(token)
    }

    fn get_session(&mut self, token: &str) -> LastfmResult<Session> {
        self.runtime.block_on(self.client.get_session(token))
    }

    fn validate_session(&mut self, session_key: &str) -> LastfmResult<Session> {
        self.runtime
            .block_on(self.client.validate_session(session_key))
    }

    fn update_now_playing(
        &mut self,
        session_key: &str,
        track: &TrackMetadata,
    ) -> LastfmResult<()> {
        self.runtime
            .block_on(self.client.update_now_playing(session_key, track))
    }

    fn scrobble(&mut self, session_key: &str, plays: &[Play]) -> LastfmResult<ScrobbleOutcome> {
        self.runtime
            .block_on(self.client.scrobble(session_key, plays))
    }
}
