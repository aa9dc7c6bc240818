//! The bot's command set.

use tracing::warn;

use courier_connection::{CommandHandler, ConnectionHandle, InboundMessage};

/// Prefix-matched commands: `ping` and `help`. Anything else is
/// silently ignored.
pub struct Commands {
    help_text: String,
}

impl Commands {
    pub fn new(prefix: &str) -> Self {
        Self {
            help_text: format!("commands: {prefix}ping, {prefix}help"),
        }
    }
}

impl CommandHandler for Commands {
    async fn dispatch<H: ConnectionHandle>(
        &self,
        handle: &H,
        command: &str,
        _args: &str,
        msg: &InboundMessage,
    ) {
        let reply = match command {
            "ping" => "pong",
            "help" => self.help_text.as_str(),
            _ => return,
        };

        if let Err(e) = handle.send_message(&msg.chat, reply).await {
            warn!(chat = %msg.chat, command, error = %e, "failed to send reply");
        }
    }
}
