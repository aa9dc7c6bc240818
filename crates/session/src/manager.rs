//! Session-manager API client.
//!
//! Async HTTP client using `reqwest` for fetching credential bundles
//! from the remote session manager.

use serde::Deserialize;

use crate::auth::SessionFileSet;

/// Errors from the session-manager client. All variants are transient
/// from the provider's point of view and retried at the fetch
/// interval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("manager error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("manager returned an empty file set")]
    EmptyBundle,
}

/// Response body of `GET /api/session/{id}/auth`.
#[derive(Debug, Deserialize)]
struct AuthBundle {
    files: SessionFileSet,
}

/// Client for the remote session manager.
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl ManagerClient {
    /// Creates a client for one session. Trailing slashes on the base
    /// URL are tolerated.
    pub fn new(base_url: &str, session_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
        }
    }

    /// Fetches the credential bundle for this session.
    ///
    /// Any non-2xx status, malformed body, or empty `files` map is a
    /// fetch failure — an empty bundle means the manager has not
    /// finished provisioning the session yet.
    pub async fn fetch_session(&self) -> Result<SessionFileSet, FetchError> {
        let url = format!("{}/api/session/{}/auth", self.base_url, self.session_id);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bundle: AuthBundle = resp.json().await?;
        if bundle.files.is_empty() {
            return Err(FetchError::EmptyBundle);
        }
        Ok(bundle.files)
    }
}
