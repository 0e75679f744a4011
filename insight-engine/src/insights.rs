//! Insights query: recent alerts plus on-demand summaries.
//!
//! Alerts are a limited list with optional `auv_id`/`type` filters.
//! Summaries are selected via `summary_modes` (timeseries, stats) and gated
//! as a whole on `summary=true`. Out-of-range numeric parameters are
//! clamped into their documented bounds, never rejected; unknown alert
//! types and summary modes are rejected with the allowed set.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;

use crate::models::AlertKind;

pub const SUMMARY_MODES_ALLOWED: [&str; 2] = ["stats", "timeseries"];
pub const TIMESERIES_ALLOWED_FIELDS: [&str; 4] =
    ["temperature_c", "depth_m", "velocity_knots", "location"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Timeseries,
    Stats,
}

#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("Invalid type '{0}'. Allowed: dead_auv, environmental, zone_violation")]
    UnknownAlertType(String),
    #[error("Invalid summary_modes {0:?}. Allowed: stats, timeseries")]
    UnknownSummaryModes(Vec<String>),
}

// ------------------------------------------------------------------ //
//  Parameter parsing and clamping                                     //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone)]
pub struct InsightParams {
    pub auv_id: Option<String>,
    pub alert_type: Option<AlertKind>,
    pub limit: i64,
    pub summary: bool,
    pub summary_modes: Vec<SummaryMode>,
    pub window_minutes: i64,
    pub timeseries_limit: i64,
    pub timeseries_fields: Option<Vec<String>>,
}

impl Default for InsightParams {
    fn default() -> Self {
        Self {
            auv_id: None,
            alert_type: None,
            limit: 20,
            summary: false,
            summary_modes: vec![SummaryMode::Timeseries],
            window_minutes: 20,
            timeseries_limit: 30,
            timeseries_fields: None,
        }
    }
}

impl InsightParams {
    /// Clamp out-of-range numeric parameters into their documented bounds.
    pub fn clamp(&mut self) {
        self.limit = self.limit.clamp(1, 100);
        self.window_minutes = self.window_minutes.clamp(1, 1440);
        self.timeseries_limit = self.timeseries_limit.clamp(10, 200);
    }
}

pub fn parse_alert_type(raw: &str) -> Result<AlertKind, InsightsError> {
    AlertKind::parse(raw).ok_or_else(|| InsightsError::UnknownAlertType(raw.to_string()))
}

/// Parse a comma-separated `summary_modes` value. Unknown entries are
/// collected and rejected together.
pub fn parse_summary_modes(raw: &str) -> Result<Vec<SummaryMode>, InsightsError> {
    let mut modes = Vec::new();
    let mut unknown = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part {
            "timeseries" => {
                if !modes.contains(&SummaryMode::Timeseries) {
                    modes.push(SummaryMode::Timeseries);
                }
            }
            "stats" => {
                if !modes.contains(&SummaryMode::Stats) {
                    modes.push(SummaryMode::Stats);
                }
            }
            other => unknown.push(other.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(InsightsError::UnknownSummaryModes(unknown));
    }
    Ok(modes)
}

/// Parse a stored `POINT(lon lat)` WKT literal.
pub fn parse_point_wkt(wkt: &str) -> Option<(f64, f64)> {
    let w = wkt.trim();
    if !w.to_ascii_uppercase().starts_with("POINT(") || !w.ends_with(')') {
        return None;
    }
    let inner = &w[w.find('(')? + 1..w.len() - 1];
    let mut parts = inner.split([',', ' ']).filter(|p| !p.is_empty());
    let lon: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((lon, lat))
}

// ------------------------------------------------------------------ //
//  Query                                                              //
// ------------------------------------------------------------------ //

fn push_alert_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    auv_id: &Option<String>,
    alert_type: Option<AlertKind>,
) {
    let mut sep = " WHERE ";
    if let Some(auv_id) = auv_id {
        qb.push(sep).push("auv_id = ").push_bind(auv_id.clone());
        sep = " AND ";
    }
    if let Some(alert_type) = alert_type {
        qb.push(sep).push("type = ").push_bind(alert_type.as_str());
    }
}

fn alert_row_json(row: &PgRow) -> Value {
    json!({
        "auv_id": row.try_get::<String, _>("auv_id").ok(),
        "type": row.try_get::<String, _>("type").ok(),
        "severity": row.try_get::<Option<String>, _>("severity").ok().flatten(),
        "status": row.try_get::<String, _>("status").ok(),
        "message": row.try_get::<Option<String>, _>("message").ok().flatten(),
        "started_at": row
            .try_get::<DateTime<Utc>, _>("started_at")
            .ok()
            .map(|t| t.to_rfc3339()),
    })
}

/// Run the insights query and assemble the response document.
pub async fn fetch_insights(pool: &PgPool, mut params: InsightParams) -> Result<Value> {
    params.clamp();

    let mut qb = QueryBuilder::new(
        "SELECT auv_id, type, severity, status, message, started_at FROM alerts",
    );
    push_alert_filters(&mut qb, &params.auv_id, params.alert_type);
    qb.push(" ORDER BY started_at DESC, id DESC LIMIT ")
        .push_bind(params.limit);
    let rows = qb.build().fetch_all(pool).await?;
    let alerts: Vec<Value> = rows.iter().map(alert_row_json).collect();

    let mut out = json!({ "alerts": alerts });
    if !params.summary {
        return Ok(out);
    }

    let mut summaries = Map::new();
    let window_start = Utc::now() - Duration::minutes(params.window_minutes);

    if params.summary_modes.contains(&SummaryMode::Timeseries) {
        match &params.auv_id {
            None => {
                summaries.insert(
                    "timeseries_error".to_string(),
                    json!("timeseries summary requires auv_id"),
                );
            }
            Some(auv_id) => {
                let summary =
                    timeseries_summary(pool, auv_id, &params, window_start).await?;
                summaries.insert("timeseries".to_string(), summary);
            }
        }
    }

    if params.summary_modes.contains(&SummaryMode::Stats) {
        let summary = stats_summary(pool, &params, window_start).await?;
        summaries.insert("stats".to_string(), summary);
    }

    out["summaries"] = Value::Object(summaries);
    Ok(out)
}

async fn timeseries_summary(
    pool: &PgPool,
    auv_id: &str,
    params: &InsightParams,
    window_start: DateTime<Utc>,
) -> Result<Value> {
    // Requested fields in request order, unknown names silently dropped.
    let requested: Vec<String> = match &params.timeseries_fields {
        Some(fields) => fields
            .iter()
            .filter(|f| TIMESERIES_ALLOWED_FIELDS.contains(&f.as_str()))
            .cloned()
            .collect(),
        None => TIMESERIES_ALLOWED_FIELDS.iter().map(|f| f.to_string()).collect(),
    };

    let rows = sqlx::query(
        r#"
        SELECT timestamp, temperature_c, depth_m, velocity_knots, location_wkt
        FROM telemetry
        WHERE auv_id = $1 AND timestamp >= $2
        ORDER BY timestamp ASC
        LIMIT $3
        "#,
    )
    .bind(auv_id)
    .bind(window_start)
    .bind(params.timeseries_limit)
    .fetch_all(pool)
    .await?;

    let wants = |field: &str| requested.iter().any(|f| f == field);
    let points: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut point = Map::new();
            point.insert(
                "timestamp".to_string(),
                json!(row
                    .try_get::<DateTime<Utc>, _>("timestamp")
                    .ok()
                    .map(|t| t.to_rfc3339())),
            );
            if wants("temperature_c") {
                point.insert(
                    "temperature_c".to_string(),
                    json!(row.try_get::<Option<f64>, _>("temperature_c").ok().flatten()),
                );
            }
            if wants("depth_m") {
                point.insert(
                    "depth_m".to_string(),
                    json!(row.try_get::<Option<f64>, _>("depth_m").ok().flatten()),
                );
            }
            if wants("velocity_knots") {
                point.insert(
                    "velocity_knots".to_string(),
                    json!(row.try_get::<Option<f64>, _>("velocity_knots").ok().flatten()),
                );
            }
            if wants("location") {
                let location = row
                    .try_get::<Option<String>, _>("location_wkt")
                    .ok()
                    .flatten()
                    .and_then(|wkt| parse_point_wkt(&wkt))
                    .map(|(lon, lat)| json!({"lon": lon, "lat": lat}));
                point.insert("location".to_string(), json!(location));
            }
            Value::Object(point)
        })
        .collect();

    Ok(json!({
        "auv_id": auv_id,
        "window_minutes": params.window_minutes,
        "fields": requested,
        "count": points.len(),
        "points": points,
    }))
}

async fn stats_summary(
    pool: &PgPool,
    params: &InsightParams,
    window_start: DateTime<Utc>,
) -> Result<Value> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) AS total_alerts, MAX(started_at) AS latest_alert, SUM(CASE WHEN started_at >= ");
    qb.push_bind(window_start)
        .push(" THEN 1 ELSE 0 END) AS alerts_in_window FROM alerts");
    push_alert_filters(&mut qb, &params.auv_id, params.alert_type);
    let row = qb.build().fetch_one(pool).await?;

    let total_alerts: i64 = row.try_get("total_alerts")?;
    let alerts_in_window: Option<i64> = row.try_get("alerts_in_window")?;
    let latest_alert: Option<DateTime<Utc>> = row.try_get("latest_alert")?;

    let mut qb = QueryBuilder::new("SELECT type, COUNT(*) AS c FROM alerts");
    push_alert_filters(&mut qb, &params.auv_id, params.alert_type);
    qb.push(" GROUP BY type");
    let by_type_rows = qb.build().fetch_all(pool).await?;

    let mut alerts_by_type = Map::new();
    for row in &by_type_rows {
        let kind: String = row.try_get("type")?;
        let count: i64 = row.try_get("c")?;
        alerts_by_type.insert(kind, json!(count));
    }

    Ok(json!({
        "window_minutes": params.window_minutes,
        "total_alerts": total_alerts,
        "alerts_in_window": alerts_in_window.unwrap_or(0),
        "latest_alert_timestamp": latest_alert.map(|t| t.to_rfc3339()),
        "alerts_by_type": alerts_by_type,
    }))
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
