//! Mock scrobbling service for integration tests
//!
//! Provides canned responses for the Audioscrobbler 2.0 endpoints so the
//! client and worker can be exercised without network dependencies.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock scrobbling service server
pub struct MockLastfmServer {
    server: MockServer,
}

impl MockLastfmServer {
    /// Start a new mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL, suitable for `LastfmClient::with_base_url`
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Count requests that carried the given API method, across GET
    /// query strings and POST form bodies
    pub async fn requests_for(&self, api_method: &str) -> usize {
        let needle = format!("method={api_method}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| {
                req.url.query().map_or(false, |q| q.contains(&needle))
                    || String::from_utf8_lossy(&req.body).contains(&needle)
            })
            .count()
    }

    /// Mount a mock for successful token retrieval
    pub async fn mock_token_success(&self, token: &str) {
        Mock::given(method("GET"))
            .and(query_param("method", "auth.getToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": token
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for successful session retrieval
    pub async fn mock_session_success(&self, username: &str, session_key: &str) {
        Mock::given(method("GET"))
            .and(query_param("method", "auth.getSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session": {
                    "name": username,
                    "key": session_key,
                    "subscriber": 0
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a token the user has not authorized yet (error 14)
    pub async fn mock_token_not_authorized(&self) {
        Mock::given(method("GET"))
            .and(query_param("method", "auth.getSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 14,
                "message": "This token has not been authorized"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a successful session-key probe
    pub async fn mock_user_info_success(&self, username: &str) {
        Mock::given(method("GET"))
            .and(query_param("method", "user.getInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {
                    "name": username,
                    "subscriber": "0"
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for an invalid session key probe (error 9)
    pub async fn mock_session_invalid(&self) {
        Mock::given(method("GET"))
            .and(query_param("method", "user.getInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 9,
                "message": "Invalid session key - Please re-authenticate"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a successful now-playing notification
    pub async fn mock_now_playing_success(&self) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=track.updateNowPlaying"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nowplaying": {
                    "artist": { "corrected": "0", "#text": "" },
                    "track": { "corrected": "0", "#text": "" },
                    "ignoredMessage": { "code": "0", "#text": "" }
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock accepting a single-play scrobble batch
    pub async fn mock_scrobble_success(&self, artist: &str, title: &str) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=track.scrobble"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "scrobbles": {
                    "@attr": { "accepted": 1, "ignored": 0 },
                    "scrobble": {
                        "artist": { "corrected": "0", "#text": artist },
                        "track": { "corrected": "0", "#text": title },
                        "ignoredMessage": { "code": "0", "#text": "" }
                    }
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock that ignores every play in the batch with the given
    /// reason code
    pub async fn mock_scrobble_ignored(&self, artist: &str, title: &str, code: &str) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=track.scrobble"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "scrobbles": {
                    "@attr": { "accepted": 0, "ignored": 1 },
                    "scrobble": {
                        "artist": { "corrected": "0", "#text": artist },
                        "track": { "corrected": "0", "#text": title },
                        "ignoredMessage": { "code": code, "#text": "Play was ignored" }
                    }
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock that fails the next `n` requests with a transient
    /// service error (error 16), then stops matching so a later mount can
    /// serve the success response
    pub async fn mock_transient_failures(&self, n: u64) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 16,
                "message": "The service is temporarily unavailable, please try again"
            })))
            .up_to_n_times(n)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock rejecting every request with a suspended API key
    /// (error 26)
    pub async fn mock_api_key_suspended(&self) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 26,
                "message": "API key has been suspended"
            })))
            .mount(&self.server)
            .await;
    }
}
