//! Environment configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the session manager.
    pub manager_url: String,
    /// Session identifier at the manager.
    pub session_id: String,
    /// Directory holding the credential files.
    pub session_dir: PathBuf,
    /// WebSocket URL of the chat service.
    pub service_url: String,
    pub bot_name: String,
    pub command_prefix: String,
    /// Chat that receives the startup notification. Empty disables it.
    pub owner_chat: String,
    pub auto_read: bool,
    pub auto_typing: bool,
    pub reconnect_interval: Duration,
    pub restart_delay: Duration,
    pub keepalive_interval: Duration,
    pub fetch_retry_interval: Duration,
}

impl Config {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Reads configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            manager_url: string(&var, "COURIER_MANAGER_URL", "http://127.0.0.1:8080"),
            session_id: string(&var, "COURIER_SESSION_ID", "default"),
            session_dir: PathBuf::from(string(&var, "COURIER_SESSION_DIR", "session")),
            service_url: string(&var, "COURIER_SERVICE_URL", "ws://127.0.0.1:8765/ws"),
            bot_name: string(&var, "COURIER_BOT_NAME", "courier"),
            command_prefix: string(&var, "COURIER_COMMAND_PREFIX", "!"),
            owner_chat: string(&var, "COURIER_OWNER_CHAT", ""),
            auto_read: flag(&var, "COURIER_AUTO_READ", true),
            auto_typing: flag(&var, "COURIER_AUTO_TYPING", false),
            reconnect_interval: secs(&var, "COURIER_RECONNECT_SECS", 5),
            restart_delay: millis(&var, "COURIER_RESTART_DELAY_MS", 500),
            keepalive_interval: secs(&var, "COURIER_KEEPALIVE_SECS", 20),
            fetch_retry_interval: secs(&var, "COURIER_FETCH_RETRY_SECS", 10),
        }
    }
}

fn string(var: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn flag(var: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match var(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn secs(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Duration {
    Duration::from_secs(parse_u64(var, name, default))
}

fn millis(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Duration {
    Duration::from_millis(parse_u64(var, name, default))
}

fn parse_u64(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    match var(name).map(|v| v.parse::<u64>()) {
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            tracing::warn!(var = name, "unparseable value, using default {default}");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(move |name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = from_map(&[]);
        assert_eq!(config.session_id, "default");
        assert_eq!(config.command_prefix, "!");
        assert!(config.auto_read);
        assert!(!config.auto_typing);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.restart_delay, Duration::from_millis(500));
        assert!(config.owner_chat.is_empty());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = from_map(&[
            ("COURIER_SESSION_ID", "bot-7"),
            ("COURIER_AUTO_TYPING", "true"),
            ("COURIER_AUTO_READ", "no"),
            ("COURIER_RECONNECT_SECS", "30"),
            ("COURIER_OWNER_CHAT", "owner@s.chat"),
        ]);
        assert_eq!(config.session_id, "bot-7");
        assert!(config.auto_typing);
        assert!(!config.auto_read);
        assert_eq!(config.reconnect_interval, Duration::from_secs(30));
        assert_eq!(config.owner_chat, "owner@s.chat");
    }

    #[test]
    fn unparseable_duration_falls_back() {
        let config = from_map(&[("COURIER_RECONNECT_SECS", "soon")]);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
    }
}
