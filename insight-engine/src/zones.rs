//! Zone evaluator: checks that an AUV stays inside its assigned parcel.
//!
//! The containment decision is delegated to PostGIS over the stored
//! geometries (EPSG:4326). Reads happen in their own session; any mutation
//! happens afterwards in a short-lived write transaction.

use anyhow::Result;
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::alerts;
use crate::models::AlertKind;

/// Summary of a detected violation, broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneViolation {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub violation: &'static str,
    pub zone_id: String,
    pub telemetry_id: i64,
}

/// Decide whether the persisted telemetry row violates its assigned zone.
///
/// - Point inside its zone: any prior `zone_violation` mark is cleared and
///   no alert is raised.
/// - Point outside: the row is marked `outside`, a critical alert is
///   written (subject to de-duplication) and a summary is returned.
/// - Assigned zone or geometry missing: no decision, no mutation.
pub async fn detect_zone_violation(
    pool: &PgPool,
    telemetry_id: i64,
) -> Result<Option<ZoneViolation>> {
    let row = sqlx::query("SELECT auv_id, zone_id FROM telemetry WHERE id = $1")
        .bind(telemetry_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let auv_id: String = row.try_get("auv_id")?;
    let zone_id: Option<String> = row.try_get("zone_id")?;
    let Some(zone_id) = zone_id else {
        return Ok(None);
    };

    let inside: Option<bool> = sqlx::query_scalar(
        r#"
        SELECT ST_Contains(z.geom, t.geom)
        FROM zones z
        JOIN telemetry t ON t.id = $1
        WHERE z.zone_id = $2 AND z.geom IS NOT NULL AND t.geom IS NOT NULL
        "#,
    )
    .bind(telemetry_id)
    .bind(&zone_id)
    .fetch_optional(pool)
    .await?;

    match inside {
        Some(false) => {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE telemetry SET zone_violation = 'outside' WHERE id = $1")
                .bind(telemetry_id)
                .execute(&mut *tx)
                .await?;
            alerts::create_zone_violation_alert(&mut tx, &auv_id, telemetry_id, &zone_id).await?;
            tx.commit().await?;
            Ok(Some(ZoneViolation {
                kind: AlertKind::ZoneViolation,
                violation: "outside",
                zone_id,
                telemetry_id,
            }))
        }
        Some(true) => {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE telemetry SET zone_violation = NULL WHERE id = $1")
                .bind(telemetry_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(None)
        }
        None => {
            debug!(telemetry_id, zone_id = %zone_id, "zone or point geometry missing, no decision");
            Ok(None)
        }
    }
}
