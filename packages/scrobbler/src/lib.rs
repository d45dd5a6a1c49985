//! Background scrobble submission worker for Encore
//!
//! This crate decouples the player's control flow from the scrobbling
//! service: producers fire-and-forget requests (permission checks, session
//! invalidation, legacy-config migration, now-playing notifications, play
//! submissions) and a single worker thread performs the network traffic.
//!
//! Plays are persisted to an on-disk journal before submission, so nothing
//! is lost while offline or across restarts.
//!
//! # Example
//!
//! ```rust,no_run
//! use encore_lastfm_client::{LastfmClient, TrackMetadata};
//! use encore_scrobbler::{BlockingLastfm, Scrobbler, ScrobblerConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScrobblerConfig::from_env()?;
//! let client = LastfmClient::new(&config.api_key, &config.api_secret)?;
//! let scrobbler = Scrobbler::spawn(BlockingLastfm::new(client)?, config)?;
//!
//! let handle = scrobbler.handle();
//! handle.check_permission();
//! handle.now_playing(TrackMetadata::new("Stereolab", "French Disko"));
//! handle.enqueue_now(TrackMetadata::new("Stereolab", "French Disko"))?;
//!
//! // On player exit
//! scrobbler.shutdown();
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod journal;
mod service;
mod session;
mod worker;

pub use config::ScrobblerConfig;
pub use error::{ScrobblerError, ScrobblerResult};
pub use journal::ScrobbleJournal;
pub use service::{BlockingLastfm, ScrobbleService};
pub use session::{Permission, SessionStore};
pub use worker::{Scrobbler, ScrobblerHandle};

pub use encore_lastfm_client::{Play, Session, TrackMetadata};
