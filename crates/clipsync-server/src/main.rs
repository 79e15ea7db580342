use tracing::info;
use tracing_subscriber::EnvFilter;

use clipsync_server::config::ServerConfig;
use clipsync_server::{api, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clipsync_server=debug")),
        )
        .init();

    info!("Starting ClipboardSync relay v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    if config.auth.enabled {
        if config.auth.jwt_signing_key.is_empty() {
            tracing::warn!("AUTH_ENABLED is set but AUTH_JWT_SIGNING_KEY is empty; token exchange will fail");
        }
        if config.auth.google_client_ids.is_empty() {
            tracing::warn!("AUTH_ENABLED is set but AUTH_GOOGLE_CLIENT_IDS is empty; token exchange will fail");
        }
    }

    let http_addr = config.http_addr;
    let state = build_state(config);

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
