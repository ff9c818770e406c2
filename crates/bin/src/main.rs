//! Snake arena server binary.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Snake Arena v{}", env!("CARGO_PKG_VERSION"));

    let config = arena::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Map: {}x{}", config.arena.map_size, config.arena.map_size);
    info!("  Tick rate: {} Hz", config.arena.tick_rate_hz);
    info!("  Boundary: {:?}", config.arena.boundary_policy);

    arena::run(config).await?;

    Ok(())
}
