use anyhow::Context;
use multiprompt_core::api::{build_state, router};
use multiprompt_core::config::AppConfig;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().context("failed to read configuration")?;
    let addr = config.listen_addr();
    let public_dir = config.public_dir.clone();
    log::info!("data directory: {}", config.data_dir.display());

    let state = build_state(config).context("failed to initialise application state")?;
    let app = router(state).fallback_service(ServeDir::new(public_dir));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("Server running on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}
