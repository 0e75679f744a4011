//! Insight Engine service entry point.
//!
//! # Environment variables
//! | Var                                  | Default                  |
//! |--------------------------------------|--------------------------|
//! | `DATABASE_CONNECTION_STRING`         | required                 |
//! | `ASYNC_DATABASE_CONNECTION_STRING`   | fallback for the above   |
//! | `TELEMETRY_WS_URL`                   | required                 |
//! | `DEAD_AUV_TIMEOUT_SECONDS`           | required                 |
//! | `DEAD_AUV_SCAN_INTERVAL_SECONDS`     | required                 |
//! | `INSIGHT_ENGINE_ADDR`                | `0.0.0.0:8080`           |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use insight_engine::config::Config;
use insight_engine::handlers::{self, AppState};
use insight_engine::hub::{AlertSink, EventKind, FanoutHub};
use insight_engine::{dead_auv, store, thresholds, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("insight_engine=info".parse()?),
        )
        .json()
        .init();

    let config = Config::from_env()?;
    let pool = store::connect(&config.database_url).await?;
    let hub = Arc::new(FanoutHub::new());
    let table = thresholds::environmental_thresholds();

    // Upstream telemetry monitor.
    tokio::spawn(upstream::run(
        config.telemetry_ws_url.clone(),
        pool.clone(),
        hub.clone(),
        table,
    ));

    // Dead-AUV scanner feeding the hub through a bounded channel.
    let (alerts_tx, mut alerts_rx) = mpsc::channel(64);
    tokio::spawn(dead_auv::dead_auv_scanner(
        pool.clone(),
        config.dead_auv_timeout_seconds,
        Duration::from_secs(config.dead_auv_scan_interval_seconds),
        alerts_tx,
    ));
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            while let Some(payload) = alerts_rx.recv().await {
                hub.publish(EventKind::DeadAuvAlert, payload).await;
            }
        });
    }

    let state = Arc::new(AppState { pool, hub });
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "insight-engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
