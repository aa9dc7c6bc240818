//! Courier bot entry point.

mod commands;
mod config;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use courier_connection::{
    EventRouter, RouterConfig, Supervisor, SupervisorConfig, WsTransport,
};
use courier_session::{CredentialStore, ManagerClient, SessionProvider};

use commands::Commands;
use config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier=debug")),
        )
        .init();

    let cfg = Config::from_env();
    info!(
        session = %cfg.session_id,
        service = %cfg.service_url,
        "starting courier"
    );

    let store = CredentialStore::new(cfg.session_dir.clone());
    let provider = SessionProvider::new(
        store.clone(),
        ManagerClient::new(&cfg.manager_url, &cfg.session_id),
        cfg.fetch_retry_interval,
    );
    let transport = WsTransport::new(cfg.service_url.clone(), cfg.keepalive_interval);
    let router = EventRouter::new(
        RouterConfig {
            auto_read: cfg.auto_read,
            auto_typing: cfg.auto_typing,
            command_prefix: cfg.command_prefix.clone(),
        },
        Commands::new(&cfg.command_prefix),
    );

    let mut supervisor = Supervisor::new(
        transport,
        provider,
        store,
        router,
        SupervisorConfig {
            reconnect_interval: cfg.reconnect_interval,
            restart_delay: cfg.restart_delay,
            owner_chat: cfg.owner_chat.clone(),
            bot_name: cfg.bot_name.clone(),
        },
    );

    let cancel = supervisor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    // Everything transient is retried inside the supervisor; the only
    // error that reaches this point is unusable local session state.
    if let Err(e) = supervisor.run().await {
        error!(error = %e, "courier stopped on fatal error");
        std::process::exit(1);
    }
    info!("courier stopped");
}
