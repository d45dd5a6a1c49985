//! Scrobbling service request and response models

use serde::{Deserialize, Serialize};

/// Descriptive metadata for a track, as sent with now-playing
/// notifications and scrobbles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Artist name
    pub artist: String,
    /// Track title
    pub title: String,
    /// Album title (if known)
    pub album: Option<String>,
    /// Position of the track on the album
    pub track_number: Option<u32>,
    /// Track length in seconds
    pub duration_secs: Option<u32>,
    /// MusicBrainz recording ID (if known)
    pub mbid: Option<String>,
}

impl TrackMetadata {
    /// Create metadata with just an artist and title
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            album: None,
            track_number: None,
            duration_secs: None,
            mbid: None,
        }
    }
}

/// A single pending or submitted play: a track plus the moment
/// playback started, as a unix timestamp in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    /// The track that was played
    pub track: TrackMetadata,
    /// Unix timestamp (seconds) of when playback started
    pub started_at: i64,
}

/// An authenticated session obtained after user authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session key used to sign subsequent requests
    pub key: String,
    /// Username the session belongs to
    pub username: String,
    /// Whether the account is a subscriber
    pub subscriber: bool,
}

/// Result of a scrobble batch submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleOutcome {
    /// Number of plays the service accepted
    pub accepted: u32,
    /// Plays the service refused, with the reason
    pub ignored: Vec<IgnoredPlay>,
}

/// A play the service refused to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredPlay {
    /// Artist as echoed back by the service
    pub artist: String,
    /// Title as echoed back by the service
    pub title: String,
    /// Service-defined ignore reason code
    pub code: String,
    /// Human-readable ignore reason
    pub message: String,
}

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    pub session: RawSession,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSession {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub subscriber: i32,
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        Self {
            key: raw.key,
            username: raw.name,
            subscriber: raw.subscriber != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoResponse {
    pub user: RawUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub name: String,
    #[serde(default)]
    pub subscriber: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScrobbleBatchResponse {
    pub scrobbles: RawScrobbles,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawScrobbles {
    #[serde(rename = "@attr")]
    pub attr: ScrobbleAttr,
    #[serde(default)]
    pub scrobble: OneOrMany<RawScrobble>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScrobbleAttr {
    pub accepted: u32,
    #[allow(dead_code)] // Required for serde deserialization, not used in code
    pub ignored: u32,
}

/// The service collapses single-element arrays into bare objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(Box<T>),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![*item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawScrobble {
    pub artist: CorrectableField,
    pub track: CorrectableField,
    #[serde(rename = "ignoredMessage")]
    pub ignored_message: IgnoredMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CorrectableField {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IgnoredMessage {
    pub code: String,
    #[serde(rename = "#text", default)]
    pub text: String,
}

impl RawScrobble {
    /// A code of "0" means the play was accepted as-is
    pub(crate) fn ignored_play(self) -> Option<IgnoredPlay> {
        if self.ignored_message.code == "0" {
            return None;
        }
        Some(IgnoredPlay {
            artist: self.artist.text,
            title: self.track.text,
            code: self.ignored_message.code,
            message: self.ignored_message.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_scrobble_is_not_ignored() {
        let raw = RawScrobble {
            artist: CorrectableField {
                text: "Autechre".to_string(),
            },
            track: CorrectableField {
                text: "Bike".to_string(),
            },
            ignored_message: IgnoredMessage {
                code: "0".to_string(),
                text: String::new(),
            },
        };
        assert!(raw.ignored_play().is_none());
    }

    #[test]
    fn ignored_scrobble_carries_reason() {
        let raw = RawScrobble {
            artist: CorrectableField {
                text: "Unknown".to_string(),
            },
            track: CorrectableField {
                text: "Untitled".to_string(),
            },
            ignored_message: IgnoredMessage {
                code: "1".to_string(),
                text: "Artist was ignored".to_string(),
            },
        };
        let ignored = raw.ignored_play().expect("should be ignored");
        assert_eq!(ignored.code, "1");
        assert_eq!(ignored.artist, "Unknown");
    }

    #[test]
    fn one_or_many_handles_collapsed_array() {
        let json = r##"{"artist":{"#text":"A"},"track":{"#text":"T"},"ignoredMessage":{"code":"0","#text":""}}"##;
        let one: OneOrMany<RawScrobble> = serde_json::from_str(json).unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let many: OneOrMany<RawScrobble> =
            serde_json::from_str(&format!("[{json},{json}]")).unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn session_subscriber_flag_converts() {
        let raw = RawSession {
            name: "listener".to_string(),
            key: "abc".to_string(),
            subscriber: 1,
        };
        let session: Session = raw.into();
        assert!(session.subscriber);
        assert_eq!(session.username, "listener");
    }
}
