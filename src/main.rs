use tracing::info;
use tracing_subscriber::EnvFilter;

use qrshelf::{build_router, catalog::init_catalog, config::Config, state::AppState};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(
        base_url = %config.base_url,
        app_root = ?config.app_root,
        uploads_dir = %config.uploads_dir,
        "Configuration loaded"
    );

    let catalog = init_catalog(&config).await?;
    let app_state = AppState::new(config, catalog).await?;
    let addr = app_state.config.bind_addr();

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
