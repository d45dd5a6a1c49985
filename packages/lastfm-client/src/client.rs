//! Scrobbling service client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use md5::{Digest, Md5};
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{LastfmError, LastfmResult};
use crate::models::{
    ErrorResponse, Play, ScrobbleBatchResponse, ScrobbleOutcome, Session, SessionResponse,
    TokenResponse, TrackMetadata, UserInfoResponse,
};

/// Scrobbling service API base URL
const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Page where the user authorizes a request token
const LASTFM_AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Maximum plays per scrobble batch accepted by the service
const MAX_SCROBBLE_BATCH: usize = 50;

/// Maximum artist/title field length
const MAX_FIELD_LENGTH: usize = 256;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Scrobbling service client
///
/// Holds the static API credentials (key and shared secret) and signs
/// every authenticated request with them.
#[derive(Clone)]
pub struct LastfmClient {
    http_client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    max_retries: u32,
}

impl fmt::Debug for LastfmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastfmClient")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LastfmClient {
    /// Create a new client with the given API key and shared secret
    ///
    /// # Errors
    /// Returns `LastfmError::MissingCredentials` if either credential is empty
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> LastfmResult<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(LastfmError::MissingCredentials);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Encore/1.0")
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            api_secret,
            base_url: LASTFM_API_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a client from environment variables
    ///
    /// Reads `LASTFM_API_KEY` and `LASTFM_API_SECRET` from the environment.
    ///
    /// # Errors
    /// - `LastfmError::MissingCredentials` if either variable is not set or empty
    /// - `LastfmError::InvalidInput` if a variable contains invalid UTF-8
    pub fn from_env() -> LastfmResult<Self> {
        let api_key = Self::env_var("LASTFM_API_KEY")?;
        let api_secret = Self::env_var("LASTFM_API_SECRET")?;
        Self::new(api_key, api_secret)
    }

    fn env_var(name: &str) -> LastfmResult<String> {
        match std::env::var(name) {
            Ok(value) if value.is_empty() => Err(LastfmError::MissingCredentials),
            Ok(value) => Ok(value),
            Err(std::env::VarError::NotPresent) => Err(LastfmError::MissingCredentials),
            Err(std::env::VarError::NotUnicode(_)) => Err(LastfmError::InvalidInput(format!(
                "{name} contains invalid UTF-8"
            ))),
        }
    }

    /// Override the service base URL (used by tests against a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry budget for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate a metadata text field (artist or title)
    fn validate_field<'a>(value: &'a str, what: &str) -> LastfmResult<&'a str> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LastfmError::InvalidInput(format!("{what} cannot be empty")));
        }
        if trimmed.len() > MAX_FIELD_LENGTH {
            return Err(LastfmError::InvalidInput(format!(
                "{what} too long (max {MAX_FIELD_LENGTH} characters)"
            )));
        }
        Ok(trimmed)
    }

    /// Compute the request signature: MD5 over the alphabetically sorted
    /// `key||value` concatenation followed by the shared secret. The
    /// `format` parameter is excluded from the signature by the protocol.
    fn sign(&self, params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> =
            params.iter().filter(|(key, _)| key != "format").collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut input = String::new();
        for (key, value) in sorted {
            input.push_str(key);
            input.push_str(value);
        }
        input.push_str(&self.api_secret);

        format!("{:x}", Md5::digest(input.as_bytes()))
    }

    /// Assemble the parameter list for a signed call
    fn signed_params(&self, method: &str, extra: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut params = extra;
        params.push(("method".to_string(), method.to_string()));
        params.push(("api_key".to_string(), self.api_key.clone()));
        let signature = self.sign(&params);
        params.push(("api_sig".to_string(), signature));
        params.push(("format".to_string(), "json".to_string()));
        params
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> LastfmResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = LastfmResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "scrobbling service request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Perform the request/response exchange and surface API-level errors
    ///
    /// Read methods go out as GET, submissions as POST form bodies.
    async fn exchange(&self, params: &[(String, String)], post: bool) -> LastfmResult<String> {
        let request = if post {
            self.http_client.post(&self.base_url).form(params)
        } else {
            self.http_client.get(&self.base_url).query(params)
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LastfmError::Timeout
            } else {
                LastfmError::Http(e)
            }
        })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("scrobbling service rate limited");
            return Err(LastfmError::RateLimited);
        }

        let text = response.text().await.map_err(LastfmError::Http)?;

        if let Ok(error) = serde_json::from_str::<ErrorResponse>(&text) {
            return Err(LastfmError::from_api_code(error.error, error.message));
        }

        Ok(text)
    }

    /// Fetch an unauthorized request token (`auth.getToken`)
    ///
    /// The token must be authorized by the user (see [`authorize_url`])
    /// before it can be traded for a session.
    ///
    /// [`authorize_url`]: LastfmClient::authorize_url
    #[instrument(skip(self))]
    pub async fn get_token(&self) -> LastfmResult<String> {
        debug!("requesting authentication token");

        let params = self.signed_params("auth.getToken", Vec::new());
        let text = self
            .with_retry(|| async { self.exchange(&params, false).await })
            .await?;

        let response: TokenResponse = serde_json::from_str(&text)?;
        Ok(response.token)
    }

    /// Build the URL where the user grants this application permission
    pub fn authorize_url(&self, token: &str) -> String {
        let mut url = Url::parse(LASTFM_AUTH_URL).expect("static URL is valid");
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("token", token);
        url.into()
    }

    /// Trade an authorized request token for a session (`auth.getSession`)
    ///
    /// # Errors
    /// - `LastfmError::TokenNotAuthorized` if the user has not approved the
    ///   token yet
    #[instrument(skip(self, token))]
    pub async fn get_session(&self, token: &str) -> LastfmResult<Session> {
        debug!("requesting session key");

        let params = self.signed_params(
            "auth.getSession",
            vec![("token".to_string(), token.to_string())],
        );
        let text = self
            .with_retry(|| async { self.exchange(&params, false).await })
            .await?;

        let response: SessionResponse = serde_json::from_str(&text)?;
        let session: Session = response.session.into();

        debug!(username = %session.username, "obtained session key");
        Ok(session)
    }

    /// Probe whether a stored session key is still accepted (`user.getInfo`)
    ///
    /// Returns the refreshed session on success.
    ///
    /// # Errors
    /// - `LastfmError::SessionInvalid` if the key was revoked or expired
    #[instrument(skip(self, session_key))]
    pub async fn validate_session(&self, session_key: &str) -> LastfmResult<Session> {
        debug!("validating stored session key");

        let params = self.signed_params(
            "user.getInfo",
            vec![("sk".to_string(), session_key.to_string())],
        );
        let text = self
            .with_retry(|| async { self.exchange(&params, false).await })
            .await?;

        let response: UserInfoResponse = serde_json::from_str(&text)?;
        Ok(Session {
            key: session_key.to_string(),
            username: response.user.name,
            subscriber: response.user.subscriber == "1",
        })
    }

    /// Send a now-playing notification (`track.updateNowPlaying`)
    ///
    /// This is a lightweight, non-persistent notice; it does not record a
    /// play. Failures other than an invalid session are safe to drop.
    #[instrument(skip(self, session_key, track), fields(artist = %track.artist, title = %track.title))]
    pub async fn update_now_playing(
        &self,
        session_key: &str,
        track: &TrackMetadata,
    ) -> LastfmResult<()> {
        let artist = Self::validate_field(&track.artist, "artist name")?;
        let title = Self::validate_field(&track.title, "track title")?;

        debug!("sending now-playing notification");

        let mut extra = vec![
            ("artist".to_string(), artist.to_string()),
            ("track".to_string(), title.to_string()),
            ("sk".to_string(), session_key.to_string()),
        ];
        push_optional_track_params(&mut extra, track, None);

        let params = self.signed_params("track.updateNowPlaying", extra);
        self.with_retry(|| async { self.exchange(&params, true).await })
            .await?;

        Ok(())
    }

    /// Submit a batch of plays (`track.scrobble`)
    ///
    /// # Errors
    /// - `LastfmError::InvalidInput` if the batch is empty, oversized, or a
    ///   play has empty metadata or a non-positive timestamp
    /// - `LastfmError::SessionInvalid` if the session key was rejected
    #[instrument(skip(self, session_key, plays), fields(batch_len = plays.len()))]
    pub async fn scrobble(
        &self,
        session_key: &str,
        plays: &[Play],
    ) -> LastfmResult<ScrobbleOutcome> {
        if plays.is_empty() {
            return Err(LastfmError::InvalidInput(
                "scrobble batch cannot be empty".to_string(),
            ));
        }
        if plays.len() > MAX_SCROBBLE_BATCH {
            return Err(LastfmError::InvalidInput(format!(
                "scrobble batch too large (max {MAX_SCROBBLE_BATCH} plays)"
            )));
        }

        let mut extra = vec![("sk".to_string(), session_key.to_string())];
        for (i, play) in plays.iter().enumerate() {
            let artist = Self::validate_field(&play.track.artist, "artist name")?;
            let title = Self::validate_field(&play.track.title, "track title")?;
            if play.started_at <= 0 {
                return Err(LastfmError::InvalidInput(format!(
                    "play timestamp must be positive, got {}",
                    play.started_at
                )));
            }
            extra.push((format!("artist[{i}]"), artist.to_string()));
            extra.push((format!("track[{i}]"), title.to_string()));
            extra.push((format!("timestamp[{i}]"), play.started_at.to_string()));
            push_optional_track_params(&mut extra, &play.track, Some(i));
        }

        debug!("submitting scrobble batch");

        let params = self.signed_params("track.scrobble", extra);
        let text = self
            .with_retry(|| async { self.exchange(&params, true).await })
            .await?;

        let response: ScrobbleBatchResponse = serde_json::from_str(&text)?;
        let accepted = response.scrobbles.attr.accepted;
        let ignored: Vec<_> = response
            .scrobbles
            .scrobble
            .into_vec()
            .into_iter()
            .filter_map(|raw| raw.ignored_play())
            .collect();

        debug!(
            accepted = accepted,
            ignored = ignored.len(),
            "scrobble batch processed"
        );

        Ok(ScrobbleOutcome { accepted, ignored })
    }
}

/// Append album / track-number / duration / mbid parameters, with the
/// batch index suffix when scrobbling
fn push_optional_track_params(
    params: &mut Vec<(String, String)>,
    track: &TrackMetadata,
    index: Option<usize>,
) {
    let key = |name: &str| match index {
        Some(i) => format!("{name}[{i}]"),
        None => name.to_string(),
    };
    if let Some(album) = &track.album {
        params.push((key("album"), album.clone()));
    }
    if let Some(number) = track.track_number {
        params.push((key("trackNumber"), number.to_string()));
    }
    if let Some(duration) = track.duration_secs {
        params.push((key("duration"), duration.to_string()));
    }
    if let Some(mbid) = &track.mbid {
        params.push((key("mbid"), mbid.clone()));
    }
}
