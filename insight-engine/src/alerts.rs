//! Unified alert creation with active-duplicate suppression.
//!
//! Every alert path goes through [`create_alert`], which first looks for an
//! existing `active` row for the same `(auv_id, type)` and returns its id
//! unchanged instead of inserting a second one. Alerts are never resolved;
//! `status` stays `active` and `ended_at` stays NULL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgConnection;

use crate::models::{AlertKind, Severity};
use crate::thresholds::{ParameterViolation, ThresholdReport, ViolationLevel};

/// A fully described alert ready to be written.
#[derive(Debug)]
pub struct NewAlert<'a> {
    pub auv_id: &'a str,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub payload: serde_json::Value,
    pub telemetry_id: Option<i64>,
}

/// Insert an alert row, or return the id of the existing active duplicate.
pub async fn create_alert(conn: &mut PgConnection, new: NewAlert<'_>) -> Result<i64> {
    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM alerts
        WHERE auv_id = $1 AND type = $2 AND status = 'active'
        LIMIT 1
        "#,
    )
    .bind(new.auv_id)
    .bind(new.kind.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let mut payload = new.payload;
    if let Some(tid) = new.telemetry_id {
        if let Some(map) = payload.as_object_mut() {
            map.entry("telemetry_id").or_insert(json!(tid));
        }
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO alerts (auv_id, type, severity, message, payload, status)
        VALUES ($1, $2, $3, $4, $5, 'active')
        RETURNING id
        "#,
    )
    .bind(new.auv_id)
    .bind(new.kind.as_str())
    .bind(new.severity.as_str())
    .bind(&new.message)
    .bind(&payload)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

// ------------------------------------------------------------------ //
//  Per-kind constructors                                              //
// ------------------------------------------------------------------ //

/// Create (or reuse) an environmental alert from a threshold report.
pub async fn create_environmental_alert(
    conn: &mut PgConnection,
    report: &ThresholdReport,
    telemetry_id: Option<i64>,
) -> Result<i64> {
    create_alert(
        conn,
        NewAlert {
            auv_id: &report.auv_id,
            kind: AlertKind::Environmental,
            severity: derive_severity(&report.alerts),
            message: build_message(&report.alerts),
            payload: serde_json::to_value(report)?,
            telemetry_id,
        },
    )
    .await
}

/// Create (or reuse) a zone-violation alert for an AUV outside its parcel.
pub async fn create_zone_violation_alert(
    conn: &mut PgConnection,
    auv_id: &str,
    telemetry_id: i64,
    zone_id: &str,
) -> Result<i64> {
    create_alert(
        conn,
        NewAlert {
            auv_id,
            kind: AlertKind::ZoneViolation,
            severity: Severity::Critical,
            message: format!("AUV {auv_id} outside allowed zone {zone_id}"),
            payload: json!({
                "zone_id": zone_id,
                "violation": "outside",
                "telemetry_id": telemetry_id,
            }),
            telemetry_id: Some(telemetry_id),
        },
    )
    .await
}

/// Create (or reuse) a dead-AUV alert.
pub async fn create_dead_auv_alert(
    conn: &mut PgConnection,
    auv_id: &str,
    last_seen: DateTime<Utc>,
    threshold_seconds: i64,
) -> Result<i64> {
    create_alert(
        conn,
        NewAlert {
            auv_id,
            kind: AlertKind::DeadAuv,
            severity: Severity::Critical,
            message: format!("AUV {auv_id} silent beyond {threshold_seconds}s"),
            payload: json!({
                "last_seen": last_seen.to_rfc3339(),
                "threshold_seconds": threshold_seconds,
            }),
            telemetry_id: None,
        },
    )
    .await
}

// ------------------------------------------------------------------ //
//  Severity / message derivation                                      //
// ------------------------------------------------------------------ //

/// Overall severity for an environmental alert: the worst per-parameter level.
pub fn derive_severity(violations: &[ParameterViolation]) -> Severity {
    match violations.iter().map(|v| v.level).max() {
        Some(ViolationLevel::Critical) => Severity::Critical,
        Some(ViolationLevel::Warning) => Severity::Warning,
        None => Severity::Info,
    }
}

/// Short human-readable summary of the per-parameter violations.
pub fn build_message(violations: &[ParameterViolation]) -> String {
    if violations.is_empty() {
        return "environmental ok".to_string();
    }
    violations
        .iter()
        .map(|v| format!("{}={}({})", v.parameter, v.value, v.level.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
