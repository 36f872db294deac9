//! The fleet control-plane binary: wires configuration, logging, storage,
//! the HTTP router, and the daily CA scheduler together, then serves until
//! SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use nebula_api::scheduler::Scheduler;
use nebula_api::state::AppState;
use nebula_config::Config;
use nebula_log::{LogFormat, LoggerBuilder};
use nebula_storage::Storage;
use tokio::net::TcpListener;
use tracing::info;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining in-flight requests");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new()
        .merge_file_if_exists("nebula-server.toml")?
        .merge_env("bind_addr", "NEBULA_BIND_ADDR")
        .merge_env("cert_cli_path", "NEBULA_CERT_CLI_PATH")
        .merge_env("jwt_secret", "NEBULA_JWT_SECRET")
        .merge_env("managed_nebula_version", "NEBULA_MANAGED_VERSION")
        .merge_env("public_rate_limit_per_minute", "NEBULA_PUBLIC_RATE_LIMIT_PER_MINUTE")
        .merge_env("log_format", "NEBULA_LOG_FORMAT");

    let log_format =
        if config.get("log_format") == Some("json") { LogFormat::Json } else { LogFormat::Pretty };
    LoggerBuilder::new().default_filter("info").format(log_format).init();

    let bind_addr: SocketAddr = config.get_or("bind_addr", "0.0.0.0:8080".to_string())?.parse()?;
    let cert_cli_path = config.get_or("cert_cli_path", "nebula-cert".to_string())?;
    let jwt_secret = config.require("jwt_secret")?;
    let managed_nebula_version = config.get_or("managed_nebula_version", env!("CARGO_PKG_VERSION").to_string())?;
    let public_rate_limit_per_minute: u32 = config.get_or("public_rate_limit_per_minute", 60)?;

    let storage = Storage::in_memory();
    let state = AppState::new(storage, cert_cli_path, jwt_secret.as_bytes(), managed_nebula_version);

    let _scheduler = Scheduler::start(state.cert_manager.clone(), state.storage.settings.clone());

    let app = nebula_api::build_router(state, public_rate_limit_per_minute);
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "nebula-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
