use std::sync::Arc;

use anyhow::Context;

use stagebill_api::{app, config::ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stagebill_observability::init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let billing = Arc::new(app::services::build_services(config.billing.clone()));
    if let Some(interval) = config.overdue_sweep_interval {
        app::services::spawn_overdue_sweeper(billing.clone(), interval);
    }

    let app = app::build_app(config.jwt_secret, billing);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
