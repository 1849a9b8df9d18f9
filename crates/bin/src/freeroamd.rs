//! Freeroamd - UDP relay daemon with an optional spectator feed.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Freeroamd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Tick: {}ms", config.server.tick_interval_ms);
    info!(
        "  Interest: {} slots within {}",
        config.interest.max_visible_players, config.interest.visibility_radius
    );

    let server = server::Server::bind(&config).await?;

    if config.spectator.enabled {
        let spectator = config.spectator.clone();
        let state = server.state();
        tokio::spawn(async move {
            if let Err(e) = server::spectator::run(spectator, state).await {
                error!("Spectator feed stopped: {}", e);
            }
        });
    }

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
