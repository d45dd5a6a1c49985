//! Shared test utilities for the Encore workspace
//!
//! This crate provides a mock scrobbling service for testing without
//! network dependencies. The mock can be used across the client and
//! scrobbler test suites.
//!
//! # Example
//!
//! ```rust,ignore
//! use encore_test_utils::MockLastfmServer;
//!
//! #[tokio::test]
//! async fn test_with_mock() {
//!     let server = MockLastfmServer::start().await;
//!     server.mock_token_success("tok").await;
//!
//!     // Use server.url() to configure your client
//! }
//! ```

mod lastfm;

pub use lastfm::MockLastfmServer;
