//! Connection lifecycle supervision.
//!
//! Owns the active connection handle, the lifecycle state, and the
//! recovery policy: which disconnect causes merely reopen the
//! connection and which wipe the credential store and restart session
//! acquisition from scratch.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_session::{CredentialStore, ProvisionError, SessionProvider};

use crate::router::{CommandHandler, EventRouter};
use crate::transport::{ConnectionHandle, Transport};
use crate::types::{
    ConnectionEvent, ConnectionState, Disconnect, DisconnectKind, SupervisorConfig, classify,
};

/// Errors that escape the supervisor's run loop.
///
/// Everything transient is handled internally; only unusable local
/// state propagates (see [`ProvisionError`]).
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("session acquisition failed: {0}")]
    Provision(#[from] ProvisionError),
}

/// Outcome of one connection's lifetime, driving the outer loop.
enum Flow {
    /// Credentials were wiped; re-run session acquisition.
    Restart,
    /// Shutdown was requested.
    Shutdown,
}

/// Supervises the connection lifecycle for one session.
///
/// Single logical flow of control: one handle is active at a time and
/// all state transitions happen in [`run`](Self::run). Reopens and
/// restarts are scheduled with cancellable delays, never with parallel
/// supervisors.
pub struct Supervisor<T, D> {
    transport: T,
    provider: SessionProvider,
    store: CredentialStore,
    router: EventRouter<D>,
    config: SupervisorConfig,
    cancel: CancellationToken,
    state: ConnectionState,
    /// True until the first successful open within the current
    /// credential epoch; gates the one-time startup notification.
    first_connect: bool,
    /// Monotonic handle counter. Each reopen gets a fresh epoch and a
    /// fresh event channel; the superseded channel is simply dropped.
    epoch: u64,
}

impl<T: Transport, D: CommandHandler> Supervisor<T, D> {
    pub fn new(
        transport: T,
        provider: SessionProvider,
        store: CredentialStore,
        router: EventRouter<D>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            transport,
            provider,
            store,
            router,
            config,
            cancel: CancellationToken::new(),
            state: ConnectionState::Closed,
            first_connect: true,
            epoch: 0,
        }
    }

    /// Token that stops the supervisor when cancelled. Safe to clone
    /// into a shutdown signal handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle state of the supervised connection.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the supervision loop until cancelled.
    ///
    /// Returns `Ok(())` on shutdown. The only error that propagates is
    /// unusable local session state — every transient failure is
    /// retried internally.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        loop {
            let auth = match self.provider.resolve(&self.cancel).await {
                Ok(auth) => auth,
                Err(ProvisionError::Cancelled) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "session state is unusable, giving up");
                    return Err(e.into());
                }
            };

            match self.drive(&auth).await {
                Flow::Restart => continue,
                Flow::Shutdown => return Ok(()),
            }
        }
    }

    /// Drives connections for one resolved [`AuthState`] until the
    /// credentials are invalidated or shutdown is requested.
    ///
    /// [`AuthState`]: courier_session::AuthState
    async fn drive(&mut self, auth: &courier_session::AuthState) -> Flow {
        let cancel = self.cancel.clone();

        loop {
            self.epoch += 1;
            self.set_state(ConnectionState::Connecting);
            info!(epoch = self.epoch, "opening connection");

            let (handle, mut events) = match self.transport.connect(auth, self.epoch).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                    self.set_state(ConnectionState::Closed);
                    if !self.wait(self.config.reconnect_interval).await {
                        return Flow::Shutdown;
                    }
                    continue;
                }
            };

            let cause = loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        handle.close().await;
                        self.set_state(ConnectionState::Closed);
                        return Flow::Shutdown;
                    }
                    event = events.recv() => match event {
                        Some(ConnectionEvent::Opened) => self.on_open(&handle).await,
                        Some(ConnectionEvent::CredsUpdated(files)) => {
                            // Rotations are persisted immediately, not
                            // deferred to a disconnect.
                            if let Err(e) = self.store.save(&files) {
                                warn!(error = %e, "failed to persist rotated credentials");
                            }
                        }
                        Some(ConnectionEvent::Message(msg)) => {
                            self.router.route_message(&handle, &msg).await;
                        }
                        Some(ConnectionEvent::Closed(cause)) => break cause,
                        None => break Disconnect::stream_end(),
                    }
                }
            };

            handle.close().await;
            self.set_state(ConnectionState::Closed);
            warn!(
                epoch = self.epoch,
                code = ?cause.code,
                message = %cause.message,
                "connection closed"
            );

            match classify(&cause) {
                DisconnectKind::LoggedOut => {
                    info!("session revoked remotely, wiping credentials");
                    // The wipe completes before the restart's session
                    // resolution can begin.
                    if let Err(e) = self.store.wipe() {
                        error!(error = %e, "failed to wipe session state");
                    }
                    self.first_connect = true;
                    if !self.wait(self.config.reconnect_interval).await {
                        return Flow::Shutdown;
                    }
                    return Flow::Restart;
                }
                DisconnectKind::RestartRequired => {
                    debug!("service requested a reopen, credentials stay valid");
                    if !self.wait(self.config.restart_delay).await {
                        return Flow::Shutdown;
                    }
                }
                DisconnectKind::Other => {
                    if !self.wait(self.config.reconnect_interval).await {
                        return Flow::Shutdown;
                    }
                }
            }
        }
    }

    /// Handles a successful open: state transition plus the one-time
    /// startup notification for this credential epoch.
    async fn on_open(&mut self, handle: &T::Handle) {
        self.set_state(ConnectionState::Open);
        info!(epoch = handle.epoch(), "connection open");

        if self.first_connect {
            if !self.config.owner_chat.is_empty() {
                let text = format!("{} connected and ready", self.config.bot_name);
                if let Err(e) = handle.send_message(&self.config.owner_chat, &text).await {
                    warn!(error = %e, "failed to send startup notification");
                }
            }
            self.first_connect = false;
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "connection state changed");
            self.state = next;
        }
    }

    /// Waits the given delay. Returns `false` if cancelled first.
    async fn wait(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
