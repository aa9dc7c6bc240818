//! Public types for connection supervision.

use std::time::Duration;

use courier_session::SessionFileSet;

/// Service close code meaning the remote end revoked the session.
pub const CLOSE_LOGGED_OUT: u16 = 4401;
/// Service close code asking the client to reopen the connection with
/// its existing credentials.
pub const CLOSE_RESTART_REQUIRED: u16 = 4515;

/// Lifecycle state of the active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Connected and authenticated.
    Open,
    /// Connection lost or not yet attempted.
    Closed,
}

/// Why a connection closed, as reported by the service or observed
/// locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Close code from the service, if one was received.
    pub code: Option<u16>,
    pub message: String,
}

impl Disconnect {
    pub fn new(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Disconnect observed as an abrupt stream end (no close frame).
    pub fn stream_end() -> Self {
        Self::new(None, "stream ended")
    }
}

/// Recovery classification of a disconnect cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Session revoked remotely: wipe credentials and restart
    /// acquisition from scratch.
    LoggedOut,
    /// Credentials still valid: reopen promptly with existing state.
    RestartRequired,
    /// Network drop, timeout, unknown code: reopen after the general
    /// reconnect interval.
    Other,
}

/// Classifies a disconnect cause. Pure and deterministic: the same
/// cause always maps to the same recovery strategy.
pub fn classify(cause: &Disconnect) -> DisconnectKind {
    match cause.code {
        Some(CLOSE_LOGGED_OUT) => DisconnectKind::LoggedOut,
        Some(CLOSE_RESTART_REQUIRED) => DisconnectKind::RestartRequired,
        _ => DisconnectKind::Other,
    }
}

/// Reference to a received message, for read receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: String,
    pub id: String,
}

/// Inbound message record forwarded to the command dispatcher.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    /// Chat the message arrived in.
    pub chat: String,
    /// Sender identity (differs from `chat` in groups).
    pub sender: String,
    pub is_group: bool,
    /// Extracted text body, if the message had one.
    pub text: Option<String>,
}

impl InboundMessage {
    /// Reference to this message, for `mark_read`.
    pub fn msg_ref(&self) -> MessageRef {
        MessageRef {
            chat: self.chat.clone(),
            id: self.id.clone(),
        }
    }
}

/// Presence state shown to a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    Composing,
    Paused,
}

/// Events emitted by a connection handle, consumed by the supervisor's
/// dispatch loop.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Handshake completed, connection is usable.
    Opened,
    /// Connection closed with the given cause.
    Closed(Disconnect),
    /// The protocol rotated key material; must be persisted even
    /// without a disconnect.
    CredsUpdated(SessionFileSet),
    /// Inbound chat message.
    Message(InboundMessage),
}

/// Timing configuration for the supervisor's recovery policy.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before reopening after a generic disconnect, and before
    /// restarting acquisition after a logout.
    pub reconnect_interval: Duration,
    /// Shorter delay for restart-required disconnects — no session
    /// re-acquisition is needed.
    pub restart_delay: Duration,
    /// Owner chat that receives the one-time startup notification.
    pub owner_chat: String,
    /// Bot display name used in the startup notification.
    pub bot_name: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            restart_delay: Duration::from_millis(500),
            owner_chat: String::new(),
            bot_name: "courier".to_string(),
        }
    }
}
