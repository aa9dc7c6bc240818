//! Transport seam between the supervisor and the chat service.
//!
//! The supervisor is generic over [`Transport`] so the lifecycle state
//! machine can be exercised against an in-memory transport in tests,
//! with the WebSocket adapter as the production implementation.

use courier_session::AuthState;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::types::{ConnectionEvent, MessageRef, Presence};

/// Errors from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// One live connection attempt.
///
/// Exactly one handle is active at a time. A superseded handle's event
/// receiver is dropped by the supervisor, so events it produces after
/// supersession are never consumed.
///
/// `Sync` is required so dispatch futures borrowing the handle can be
/// driven from spawned tasks.
pub trait ConnectionHandle: Sync {
    /// Epoch number this handle was created under.
    fn epoch(&self) -> u64;

    /// Sends a text message to a chat.
    fn send_message(
        &self,
        chat: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Marks the referenced messages as read.
    fn mark_read(
        &self,
        refs: &[MessageRef],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Updates the presence shown to a chat.
    fn set_presence(
        &self,
        presence: Presence,
        chat: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection and stops its background tasks.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens connections to the chat service.
pub trait Transport {
    type Handle: ConnectionHandle;

    /// Opens a new connection using the given credentials.
    ///
    /// Returns the handle and its private event channel. The handle is
    /// tagged with the supervisor's current epoch.
    fn connect(
        &self,
        auth: &AuthState,
        epoch: u64,
    ) -> impl Future<Output = Result<(Self::Handle, mpsc::Receiver<ConnectionEvent>), TransportError>>
    + Send;
}
