//! Runtime configuration resolved from the environment.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string (PgBouncer endpoint in production).
    pub database_url: String,
    /// Upstream telemetry WebSocket URL.
    pub telemetry_ws_url: String,
    /// Seconds of silence before an AUV is considered dead.
    pub dead_auv_timeout_seconds: i64,
    /// Seconds between dead-AUV scan ticks.
    pub dead_auv_scan_interval_seconds: u64,
    /// HTTP/WebSocket bind address.
    pub bind_addr: String,
}

impl Config {
    /// Resolve the configuration from environment variables. Missing or
    /// unparseable required values abort boot before any traffic is served.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_CONNECTION_STRING")
            .or_else(|_| std::env::var("ASYNC_DATABASE_CONNECTION_STRING"))
            .context("DATABASE_CONNECTION_STRING must be set")?;

        let telemetry_ws_url =
            std::env::var("TELEMETRY_WS_URL").context("TELEMETRY_WS_URL must be set")?;

        let dead_auv_timeout_seconds = std::env::var("DEAD_AUV_TIMEOUT_SECONDS")
            .context("DEAD_AUV_TIMEOUT_SECONDS must be set")?
            .parse()
            .context("DEAD_AUV_TIMEOUT_SECONDS must be an integer")?;

        let dead_auv_scan_interval_seconds = std::env::var("DEAD_AUV_SCAN_INTERVAL_SECONDS")
            .context("DEAD_AUV_SCAN_INTERVAL_SECONDS must be set")?
            .parse()
            .context("DEAD_AUV_SCAN_INTERVAL_SECONDS must be an integer")?;

        let bind_addr = std::env::var("INSIGHT_ENGINE_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            database_url,
            telemetry_ws_url,
            dead_auv_timeout_seconds,
            dead_auv_scan_interval_seconds,
            bind_addr,
        })
    }
}
