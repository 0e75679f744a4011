//! Dead-AUV scanner: promotes telemetry silence into alerts.
//!
//! A periodic task reads the `auv_status` last-seen table, writes one
//! critical alert per overdue vehicle (duplicate-suppressed) and pushes the
//! payload into a bounded channel consumed by the fan-out dispatcher.
//! Errors are logged and swallowed so the loop stays live; the loop ends
//! when the channel closes.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info};

use crate::alerts;

/// Vehicles whose last telemetry is at least `timeout_seconds` old.
pub async fn scan_overdue(
    pool: &PgPool,
    timeout_seconds: i64,
) -> Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query(
        r#"
        SELECT auv_id, last_seen
        FROM auv_status
        WHERE now() - last_seen >= ($1 * INTERVAL '1 second')
        "#,
    )
    .bind(timeout_seconds)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| Ok((r.try_get("auv_id")?, r.try_get("last_seen")?)))
        .collect()
}

/// Run the scanner until the alert channel closes.
pub async fn dead_auv_scanner(
    pool: PgPool,
    timeout_seconds: i64,
    scan_interval: Duration,
    alerts_tx: tokio::sync::mpsc::Sender<serde_json::Value>,
) {
    loop {
        debug!("starting scan tick");
        match scan_overdue(&pool, timeout_seconds).await {
            Ok(overdue) => {
                debug!(count = overdue.len(), "overdue AUVs this tick");
                for (auv_id, last_seen) in overdue {
                    match write_alert(&pool, &auv_id, last_seen, timeout_seconds).await {
                        Ok(alert_id) => {
                            info!(alert_id, auv_id = %auv_id, "dead AUV alert recorded")
                        }
                        Err(e) => {
                            error!(error = %e, auv_id = %auv_id, "dead AUV alert write failed")
                        }
                    }
                    let payload = json!({
                        "type": "dead_auv",
                        "auv_id": auv_id,
                        "last_seen": last_seen.to_rfc3339(),
                        "threshold_seconds": timeout_seconds,
                    });
                    if alerts_tx.send(payload).await.is_err() {
                        info!("alert channel closed, scanner stopping");
                        return;
                    }
                }
            }
            Err(e) => error!(error = %e, "dead AUV scan failed"),
        }
        tokio::time::sleep(scan_interval).await;
    }
}

async fn write_alert(
    pool: &PgPool,
    auv_id: &str,
    last_seen: DateTime<Utc>,
    timeout_seconds: i64,
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = alerts::create_dead_auv_alert(&mut tx, auv_id, last_seen, timeout_seconds).await?;
    tx.commit().await?;
    Ok(id)
}
