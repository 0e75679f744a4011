//! Integration tests against a provisioned PostgreSQL/PostGIS database.
//!
//! These exercise ingestion, zone detection and alert de-duplication end to
//! end. They require `DATABASE_CONNECTION_STRING` (or the test-specific
//! `INSIGHT_ENGINE_TEST_DB`) to point at a database with the migrations
//! applied, and skip silently otherwise.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;

use insight_engine::alerts::{self, NewAlert};
use insight_engine::dead_auv;
use insight_engine::hub::{EventKind, RecordingSink};
use insight_engine::ingest;
use insight_engine::models::{AlertKind, Severity};
use insight_engine::store;
use insight_engine::thresholds;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("INSIGHT_ENGINE_TEST_DB")
        .or_else(|_| std::env::var("DATABASE_CONNECTION_STRING"))
        .ok()?;
    match store::connect(&url).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            eprintln!("skipping live store tests: {e}");
            None
        }
    }
}

fn unique_auv(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

/// Square zone covering lat 10..11, lon -126..-125, keyed to this test run.
async fn seed_square_zone(pool: &PgPool) -> String {
    let zone_id = unique_auv("TEST-ZONE");
    sqlx::query(
        r#"
        INSERT INTO zones (zone_id, name, geom_wkt, kind, geom)
        VALUES ($1, $1, $2, 'restricted', ST_GeomFromText($2, 4326))
        ON CONFLICT (zone_id) DO NOTHING
        "#,
    )
    .bind(&zone_id)
    .bind("POLYGON((-126 10, -125 10, -125 11, -126 11, -126 10))")
    .execute(pool)
    .await
    .expect("zone insert");
    zone_id
}

fn frame_json(auv_id: &str, zone_id: &str, lat: f64, lon: f64) -> serde_json::Value {
    json!({
        "auv_id": auv_id,
        "timestamp": Utc::now().to_rfc3339(),
        "zone_id": zone_id,
        "location": {"lat": lat, "lon": lon},
        "depth_m": 4200.0,
        "velocity_knots": 2.0,
        "temperature_c": 2.0,
        "turbidity": 0.15
    })
}

async fn active_alert_count(pool: &PgPool, auv_id: &str, kind: AlertKind) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM alerts WHERE auv_id = $1 AND type = $2 AND status = 'active'",
    )
    .bind(auv_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await
    .expect("count query")
}

#[tokio::test]
async fn point_inside_zone_produces_no_alert() {
    let Some(pool) = test_pool().await else { return };
    let zone_id = seed_square_zone(&pool).await;
    let auv_id = unique_auv("AUV-IN");
    let sink = RecordingSink::new();

    ingest::process_telemetry(
        &pool,
        &sink,
        &thresholds::environmental_thresholds(),
        frame_json(&auv_id, &zone_id, 10.5, -125.5),
    )
    .await;

    assert_eq!(active_alert_count(&pool, &auv_id, AlertKind::ZoneViolation).await, 0);
    assert!(sink.drain().is_empty());

    let (violation, last_seen): (Option<String>, Option<chrono::DateTime<Utc>>) = {
        let v = sqlx::query_scalar(
            "SELECT zone_violation FROM telemetry WHERE auv_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(&auv_id)
        .fetch_one(&pool)
        .await
        .expect("telemetry row");
        let seen = sqlx::query_scalar("SELECT last_seen FROM auv_status WHERE auv_id = $1")
            .bind(&auv_id)
            .fetch_optional(&pool)
            .await
            .expect("auv_status row");
        (v, seen)
    };
    assert_eq!(violation, None);
    assert!(last_seen.is_some());
}

#[tokio::test]
async fn point_outside_zone_raises_one_critical_alert() {
    let Some(pool) = test_pool().await else { return };
    let zone_id = seed_square_zone(&pool).await;
    let auv_id = unique_auv("AUV-OUT");
    let sink = RecordingSink::new();

    // Twice: the second pass must deduplicate against the first alert.
    for _ in 0..2 {
        ingest::process_telemetry(
            &pool,
            &sink,
            &thresholds::environmental_thresholds(),
            frame_json(&auv_id, &zone_id, 15.0, -130.0),
        )
        .await;
    }

    assert_eq!(active_alert_count(&pool, &auv_id, AlertKind::ZoneViolation).await, 1);

    let events = sink.drain();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|(kind, _)| *kind == EventKind::ZoneAlert));

    let violation: Option<String> = sqlx::query_scalar(
        "SELECT zone_violation FROM telemetry WHERE auv_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(&auv_id)
    .fetch_one(&pool)
    .await
    .expect("telemetry row");
    assert_eq!(violation.as_deref(), Some("outside"));
}

#[tokio::test]
async fn environmental_broadcast_precedes_zone_broadcast() {
    let Some(pool) = test_pool().await else { return };
    let zone_id = seed_square_zone(&pool).await;
    let auv_id = unique_auv("AUV-BOTH");
    let sink = RecordingSink::new();

    let mut frame = frame_json(&auv_id, &zone_id, 15.0, -130.0);
    frame["temperature_c"] = json!(3.5);
    ingest::process_telemetry(&pool, &sink, &thresholds::environmental_thresholds(), frame)
        .await;

    let events = sink.drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, EventKind::EnvironmentalAlert);
    assert_eq!(events[1].0, EventKind::ZoneAlert);

    let severity: Option<String> = sqlx::query_scalar(
        "SELECT severity FROM alerts WHERE auv_id = $1 AND type = 'environmental'",
    )
    .bind(&auv_id)
    .fetch_one(&pool)
    .await
    .expect("environmental alert row");
    assert_eq!(severity.as_deref(), Some("critical"));
}

#[tokio::test]
async fn duplicate_create_returns_existing_id() {
    let Some(pool) = test_pool().await else { return };
    let auv_id = unique_auv("AUV-DUP");

    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut tx = pool.begin().await.expect("begin");
        let id = alerts::create_alert(
            &mut tx,
            NewAlert {
                auv_id: &auv_id,
                kind: AlertKind::Environmental,
                severity: Severity::Warning,
                message: "temperature=2.8(warning)".to_string(),
                payload: json!({"alerts": []}),
                telemetry_id: None,
            },
        )
        .await
        .expect("create alert");
        tx.commit().await.expect("commit");
        ids.push(id);
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[1], ids[2]);
    assert_eq!(active_alert_count(&pool, &auv_id, AlertKind::Environmental).await, 1);
}

#[tokio::test]
async fn overdue_auv_is_scanned_and_deduplicated() {
    let Some(pool) = test_pool().await else { return };
    let auv_id = unique_auv("AUV-SILENT");
    let last_seen = Utc::now() - Duration::seconds(120);

    sqlx::query(
        r#"
        INSERT INTO auv_status (auv_id, last_seen)
        VALUES ($1, $2)
        ON CONFLICT (auv_id) DO UPDATE SET last_seen = EXCLUDED.last_seen
        "#,
    )
    .bind(&auv_id)
    .bind(last_seen)
    .execute(&pool)
    .await
    .expect("auv_status upsert");

    let overdue = dead_auv::scan_overdue(&pool, 5).await.expect("scan");
    assert!(overdue.iter().any(|(id, _)| id == &auv_id));

    for _ in 0..2 {
        let mut tx = pool.begin().await.expect("begin");
        alerts::create_dead_auv_alert(&mut tx, &auv_id, last_seen, 5)
            .await
            .expect("dead auv alert");
        tx.commit().await.expect("commit");
    }
    assert_eq!(active_alert_count(&pool, &auv_id, AlertKind::DeadAuv).await, 1);

    // A fresh reading moves the AUV out of the overdue set.
    sqlx::query("UPDATE auv_status SET last_seen = $2 WHERE auv_id = $1")
        .bind(&auv_id)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .expect("refresh last_seen");
    let overdue = dead_auv::scan_overdue(&pool, 3600).await.expect("scan");
    assert!(!overdue.iter().any(|(id, _)| id == &auv_id));
}
