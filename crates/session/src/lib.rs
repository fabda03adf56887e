//! Authenticated request layer for the exam console backend
//!
//! This crate attaches bearer tokens to API requests, refreshes an expired
//! access token once per failure window no matter how many requests fail
//! concurrently, and sends the user back to the login page when the session
//! cannot be recovered.

pub mod client;
pub mod constants;
pub mod error;
pub mod guard;
pub mod refresh;
pub mod storage;
pub mod tokens;

pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
pub use error::ApiError;
pub use guard::{MemoryNavigator, Navigator, SessionGuard};
pub use refresh::RefreshCoordinator;
pub use storage::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use tokens::TokenPair;
