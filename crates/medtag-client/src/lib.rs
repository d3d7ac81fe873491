//! MedTag API client.
//!
//! A typed client for the MedTag REST API with a persisted session and a
//! token refresh interceptor: an authenticated call that gets a 401 exchanges
//! the refresh token for a new access token and is retried exactly once. When
//! the refresh fails the session is cleared and the call returns
//! [`ClientError::SessionExpired`].
//!
//! ```rust,ignore
//! use medtag_client::{ApiClient, ClientConfig, FileSessionStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(FileSessionStore::new(medtag_client::session::default_session_path()?));
//! let client = ApiClient::new(ClientConfig::from_env(), store)?;
//!
//! client.auth().login("anna@example.com", "correct horse battery").await?;
//! let profile = client.profile().get().await?;
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod session;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
