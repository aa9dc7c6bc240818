//! Credential bundle types.

use std::collections::HashMap;

/// Filename of the identity credential inside the session directory.
/// Its presence is the sole existence check for a stored session.
pub const CREDS_FILE: &str = "creds.json";

/// Raw credential files as returned by the session manager.
///
/// Transient: consumed once to populate the [`CredentialStore`]
/// (via `save`), never held after that.
///
/// [`CredentialStore`]: crate::store::CredentialStore
pub type SessionFileSet = HashMap<String, String>;

/// Credential bundle required to open a connection.
///
/// Always reconstructed from the session directory, never built
/// directly from a fetched bundle, so the in-memory state is derived
/// from what was actually persisted.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Parsed identity credential (`creds.json`).
    pub creds: serde_json::Value,
    /// Auxiliary key material, keyed by filename.
    pub keys: HashMap<String, serde_json::Value>,
}

impl AuthState {
    /// Returns the number of auxiliary key files in the bundle.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}
