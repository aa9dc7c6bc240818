//! Inbound message routing.
//!
//! Applies the auto-read and auto-typing side effects, then forwards
//! prefix-matched commands to the [`CommandHandler`] collaborator.
//! Side-effect failures are logged and never escalated.

use tracing::{debug, warn};

use crate::transport::ConnectionHandle;
use crate::types::{InboundMessage, Presence};

/// Command dispatcher collaborator. Receives the command word (prefix
/// stripped), the remainder of the line, and the full message record.
pub trait CommandHandler {
    fn dispatch<H: ConnectionHandle>(
        &self,
        handle: &H,
        command: &str,
        args: &str,
        msg: &InboundMessage,
    ) -> impl Future<Output = ()> + Send;
}

/// Routing behavior toggles.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Send a read receipt for every inbound message.
    pub auto_read: bool,
    /// Show composing presence in the chat before dispatching.
    pub auto_typing: bool,
    /// Prefix that marks a message as a command (e.g. `!`).
    pub command_prefix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            auto_read: false,
            auto_typing: false,
            command_prefix: "!".to_string(),
        }
    }
}

/// Routes inbound messages from the active connection handle.
pub struct EventRouter<D> {
    config: RouterConfig,
    dispatcher: D,
}

impl<D: CommandHandler> EventRouter<D> {
    pub fn new(config: RouterConfig, dispatcher: D) -> Self {
        Self { config, dispatcher }
    }

    /// Handles one inbound message: read receipt and typing presence
    /// first (independent of any prefix match), then command dispatch
    /// if the text body starts with the command prefix.
    pub async fn route_message<H: ConnectionHandle>(&self, handle: &H, msg: &InboundMessage) {
        if self.config.auto_read {
            if let Err(e) = handle.mark_read(&[msg.msg_ref()]).await {
                warn!(chat = %msg.chat, error = %e, "failed to send read receipt");
            }
        }

        if self.config.auto_typing {
            if let Err(e) = handle.set_presence(Presence::Composing, &msg.chat).await {
                warn!(chat = %msg.chat, error = %e, "failed to set typing presence");
            }
        }

        let Some(text) = msg.text.as_deref() else {
            debug!(chat = %msg.chat, "message has no text body, skipping dispatch");
            return;
        };
        let Some(rest) = text.strip_prefix(&self.config.command_prefix) else {
            return;
        };
        let (command, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if command.is_empty() {
            return;
        }

        debug!(chat = %msg.chat, command, "dispatching command");
        self.dispatcher
            .dispatch(handle, command, args.trim(), msg)
            .await;
    }
}
