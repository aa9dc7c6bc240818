//! Session acquisition.
//!
//! Resolves a usable [`AuthState`] before the connection supervisor
//! may proceed: local state wins, otherwise the bundle is fetched from
//! the session manager with an unbounded, cancellable retry loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthState;
use crate::manager::ManagerClient;
use crate::store::{CredentialStore, StoreError};

/// Errors from session resolution.
///
/// Fetch failures never appear here — they are retried indefinitely.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Local state (pre-existing or freshly fetched) is unusable.
    /// Fatal: retrying blindly against a bad bundle would loop
    /// forever, so this propagates to the entry point.
    #[error("session state unusable: {0}")]
    Store(#[from] StoreError),

    #[error("session acquisition cancelled")]
    Cancelled,
}

/// Produces a valid [`AuthState`] from the store or the manager.
pub struct SessionProvider {
    store: CredentialStore,
    manager: ManagerClient,
    retry_interval: Duration,
}

impl SessionProvider {
    pub fn new(store: CredentialStore, manager: ManagerClient, retry_interval: Duration) -> Self {
        Self {
            store,
            manager,
            retry_interval,
        }
    }

    /// Resolves an [`AuthState`], fetching from the manager only when
    /// no local state exists.
    ///
    /// Absence of the manager or of the session is a transient
    /// condition — the manager may come online later — so the fetch
    /// loop has no attempt cap and only stops on success or
    /// cancellation.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<AuthState, ProvisionError> {
        if self.store.exists() {
            debug!(dir = ?self.store.dir(), "local session state found, skipping manager fetch");
            return Ok(self.store.load()?);
        }

        info!("no local session state, fetching from manager");
        let files = loop {
            match self.manager.fetch_session().await {
                Ok(files) => break files,
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in = ?self.retry_interval,
                        "session fetch failed"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ProvisionError::Cancelled),
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        };

        info!(files = files.len(), "session bundle fetched, persisting");
        if let Err(e) = self.store.save(&files) {
            // Soft error: the load below fails fast if the state is unusable.
            warn!(error = %e, "failed to persist part of the session bundle");
        }

        // Always load back from disk so memory and disk cannot diverge.
        // A corrupt result here means the manager sent an unusable
        // bundle, which must not be retried blindly.
        Ok(self.store.load()?)
    }
}
