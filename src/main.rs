use std::net::SocketAddr;

use neolink_accounts::{app::build_app, config::AppConfig, db, state::AppState, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = AppConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port).parse()?;
    let app_state = AppState::init(&config)?;

    // Start-up probe; an unreachable database is reported, not fatal.
    db::ping(&app_state.db).await;

    if let Err(e) = db::MIGRATOR.run(&app_state.db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    let pool = app_state.db.clone();
    let app = build_app(app_state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db::close(pool).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
