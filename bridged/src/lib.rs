pub mod config;
pub mod coordinator;
pub mod health;
pub mod plugins;
pub mod state;
pub mod telemetry;
pub mod wiring;

use anyhow::Result;

use crate::config::Config;
use crate::telemetry::init_tracing;

pub async fn run(cfg: Config) -> Result<()> {
    init_tracing(&cfg)?;

    let app_state = wiring::build_state(&cfg).await?;
    let tasks = wiring::spawn_tasks(&app_state, &cfg);

    let health_router = health::build_router(app_state);
    let listener = tokio::net::TcpListener::bind(cfg.health_bind).await?;
    tracing::info!("health endpoint listening on http://{}", cfg.health_bind);

    // Shutdown order (spec §5): poll, then refresh, then the
    // display-light monitor, before the HTTP server finishes closing.
    // `tasks.shutdown()` is called as soon as the shutdown signal fires,
    // concurrently with the server's own graceful drain, rather than
    // after `serve` resolves — `with_graceful_shutdown` only resolves
    // once the server has already finished closing.
    let serve = axum::serve(listener, health_router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tasks.shutdown();
    });
    serve.await.map_err(anyhow::Error::from)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
