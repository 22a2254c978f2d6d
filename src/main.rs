use tracing::info;
use tracing_subscriber::EnvFilter;

use fightreplay::{api, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fightreplay=info")),
        )
        .init();

    // CLI argument overrides the configured dump directory
    let config = ServerConfig::from_env()?.with_cli_override(std::env::args().nth(1));
    info!(dump_dir = %config.dump_dir.display(), port = config.port, "Starting fight replay server");

    let app = api::build_router(config.dump_dir.clone(), config.engine.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Listening on http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
