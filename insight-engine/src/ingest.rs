//! Telemetry ingestion: persist a frame, update last-seen, then drive the
//! evaluators and broadcast their alerts.
//!
//! The point insert, its geometry population and the last-seen upsert commit
//! together; each evaluator then runs in its own short-lived transaction so
//! an evaluator fault never rolls back the point itself.

use anyhow::Result;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use tracing::{error, info, warn};

use crate::alerts;
use crate::hub::{AlertSink, EventKind};
use crate::models::TelemetryFrame;
use crate::thresholds::{self, ThresholdReport, ThresholdTable};
use crate::zones;

/// WKT for a lon/lat point. PostGIS expects `POINT(lon lat)` ordering.
pub fn wkt_from_latlon(lat: f64, lon: f64) -> Option<String> {
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(format!("POINT({lon} {lat})"))
}

/// Insert a telemetry row, derive its geometry and upsert last-seen.
/// Transaction boundaries belong to the caller. Returns the new row id.
pub async fn ingest_telemetry(
    conn: &mut PgConnection,
    frame: &TelemetryFrame,
    raw: &Value,
) -> Result<i64> {
    let location_wkt = frame
        .location
        .and_then(|loc| wkt_from_latlon(loc.lat, loc.lon));

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO telemetry
            (auv_id, timestamp, zone_id, depth_m, velocity_knots,
             temperature_c, turbidity, location_wkt, raw, zone_violation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL)
        RETURNING id
        "#,
    )
    .bind(&frame.auv_id)
    .bind(frame.timestamp)
    .bind(&frame.zone_id)
    .bind(frame.depth_m)
    .bind(frame.velocity_knots)
    .bind(frame.temperature_c)
    .bind(frame.turbidity)
    .bind(&location_wkt)
    .bind(raw)
    .fetch_one(&mut *conn)
    .await?;

    if let Some(wkt) = &location_wkt {
        sqlx::query("UPDATE telemetry SET geom = ST_GeomFromText($1, 4326) WHERE id = $2")
            .bind(wkt)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO auv_status (auv_id, last_seen)
        VALUES ($1, $2)
        ON CONFLICT (auv_id)
        DO UPDATE SET last_seen = EXCLUDED.last_seen
        "#,
    )
    .bind(&frame.auv_id)
    .bind(frame.timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Process one upstream frame end to end: persist, evaluate thresholds,
/// evaluate zone containment, broadcast. Environmental events are published
/// before zone events for the same record.
pub async fn process_telemetry(
    pool: &PgPool,
    sink: &dyn AlertSink,
    table: &ThresholdTable,
    raw: Value,
) {
    let frame: TelemetryFrame = match serde_json::from_value(raw.clone()) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping malformed telemetry frame");
            return;
        }
    };

    let mut telemetry_id = None;
    match write_point(pool, &frame, &raw).await {
        Ok(id) => telemetry_id = Some(id),
        Err(e) => error!(error = %e, auv_id = %frame.auv_id, "telemetry insert failed"),
    }

    if let Some(report) = thresholds::check_thresholds(&frame, table) {
        match write_environmental_alert(pool, &report, telemetry_id).await {
            Ok(alert_id) => {
                info!(alert_id, auv_id = %report.auv_id, "environmental alert recorded")
            }
            Err(e) => error!(error = %e, auv_id = %report.auv_id, "environmental alert write failed"),
        }
        // Broadcast whether or not the alert row was deduplicated.
        match serde_json::to_value(&report) {
            Ok(data) => sink.publish(EventKind::EnvironmentalAlert, data).await,
            Err(e) => error!(error = %e, "threshold report serialization failed"),
        }
    }

    if let Some(id) = telemetry_id {
        match zones::detect_zone_violation(pool, id).await {
            Ok(Some(violation)) => {
                info!(telemetry_id = id, zone_id = %violation.zone_id, "zone violation detected");
                match serde_json::to_value(&violation) {
                    Ok(data) => sink.publish(EventKind::ZoneAlert, data).await,
                    Err(e) => error!(error = %e, "zone violation serialization failed"),
                }
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, telemetry_id = id, "zone detection failed"),
        }
    }
}

async fn write_point(pool: &PgPool, frame: &TelemetryFrame, raw: &Value) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = ingest_telemetry(&mut tx, frame, raw).await?;
    tx.commit().await?;
    Ok(id)
}

async fn write_environmental_alert(
    pool: &PgPool,
    report: &ThresholdReport,
    telemetry_id: Option<i64>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = alerts::create_environmental_alert(&mut tx, report, telemetry_id).await?;
    tx.commit().await?;
    Ok(id)
}
