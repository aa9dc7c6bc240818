//! Credential storage and session acquisition for the Courier bot.
//!
//! Provides the on-disk credential store, the session-manager HTTP
//! client, and the provider that resolves a usable [`AuthState`]
//! before a connection may be opened.

pub mod auth;
pub mod manager;
pub mod provider;
pub mod store;

pub use auth::{AuthState, CREDS_FILE, SessionFileSet};
pub use manager::{FetchError, ManagerClient};
pub use provider::{ProvisionError, SessionProvider};
pub use store::{CredentialStore, StoreError};
