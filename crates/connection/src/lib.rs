//! Connection lifecycle supervision and event routing for the
//! Courier bot.
//!
//! The [`Supervisor`] owns the live connection and the recovery
//! policy; the [`EventRouter`] forwards inbound messages to the
//! command dispatcher; [`WsTransport`] is the production transport.

pub mod router;
pub mod supervisor;
pub mod transport;
pub mod types;
pub mod ws;

pub use router::{CommandHandler, EventRouter, RouterConfig};
pub use supervisor::{Supervisor, SupervisorError};
pub use transport::{ConnectionHandle, Transport, TransportError};
pub use types::{
    ConnectionEvent, ConnectionState, Disconnect, DisconnectKind, InboundMessage, MessageRef,
    Presence, SupervisorConfig, classify,
};
pub use ws::WsTransport;
