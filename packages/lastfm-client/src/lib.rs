//! Audioscrobbler 2.0 submission client for Encore
//!
//! This crate provides a client for the scrobbling web service, enabling:
//! - Request-token / session-key authentication
//! - "Now playing" notifications
//! - Scrobble batch submission
//!
//! # Example
//!
//! ```rust,no_run
//! use encore_lastfm_client::{LastfmClient, Play, TrackMetadata};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LastfmClient::new("your_api_key", "your_shared_secret")?;
//!
//! // One-time authorization flow
//! let token = client.get_token().await?;
//! println!("authorize at: {}", client.authorize_url(&token));
//! let session = client.get_session(&token).await?;
//!
//! // Submit a play
//! let track = TrackMetadata::new("Boards of Canada", "Roygbiv");
//! client.update_now_playing(&session.key, &track).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `LASTFM_API_KEY`: API key for the scrobbling service (required)
//! - `LASTFM_API_SECRET`: shared secret used for request signing (required)

mod client;
mod error;
mod models;

pub use client::LastfmClient;
pub use error::{LastfmError, LastfmResult};
pub use models::{IgnoredPlay, Play, ScrobbleOutcome, Session, TrackMetadata};
