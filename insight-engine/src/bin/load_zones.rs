//! Load GeoJSON polygons into the zones table, upserting by zone_id.
//!
//! Accepts FeatureCollection, single Feature, or raw geometry documents.
//! Geometries are repaired (`ST_MakeValid`) and stamped with SRID 4326 on
//! the way in; both the geometry and its WKT form are stored.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use sqlx::PgConnection;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Load GeoJSON zone polygons into the zones table")]
struct Args {
    /// GeoJSON file(s) to load
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Prefix for generated zone ids
    #[arg(long, default_value = "ISA-ZONE-TEST")]
    prefix: String,

    /// Starting index for generated zone ids
    #[arg(long, default_value_t = 1)]
    start: usize,

    /// Zone kind label
    #[arg(long, default_value = "restricted")]
    kind: String,

    /// Use <filename>-<n> as the zone name
    #[arg(long)]
    name_from_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("load_zones=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_CONNECTION_STRING")
        .or_else(|_| std::env::var("ASYNC_DATABASE_CONNECTION_STRING"))
        .context("DATABASE_CONNECTION_STRING must be set")?;
    let pool = insight_engine::store::connect(&database_url).await?;

    let mut total = 0;
    let mut idx = args.start;
    for file in &args.files {
        if !file.exists() {
            warn!(file = %file.display(), "skipping missing file");
            continue;
        }
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let doc: Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", file.display()))?;

        let mut count = 0;
        let mut tx = pool.begin().await?;
        for feature in iter_features(&doc) {
            let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) else {
                continue;
            };
            let props = feature.get("properties").and_then(|p| p.as_object());
            let zone_id = props
                .and_then(|p| p.get("zone_id"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{}", args.prefix, idx));
            let name = if args.name_from_file {
                format!(
                    "{}-{}",
                    file.file_stem().unwrap_or_default().to_string_lossy(),
                    idx
                )
            } else {
                props
                    .and_then(|p| p.get("name"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| zone_id.clone())
            };

            upsert_zone(&mut tx, &zone_id, &name, &args.kind, geometry).await?;
            count += 1;
            idx += 1;
        }
        tx.commit().await?;
        info!(file = %file.display(), count, "zones upserted");
        total += count;
    }

    info!(total, "zone load complete");
    Ok(())
}

/// Yield Feature documents from a FeatureCollection / Feature / raw geometry.
fn iter_features(doc: &Value) -> Vec<Value> {
    let kind = doc
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match kind.as_str() {
        "featurecollection" => doc
            .get("features")
            .and_then(|f| f.as_array())
            .map(|features| features.to_vec())
            .unwrap_or_default(),
        "feature" => vec![doc.clone()],
        _ => vec![json!({"type": "Feature", "properties": {}, "geometry": doc})],
    }
}

async fn upsert_zone(
    conn: &mut PgConnection,
    zone_id: &str,
    name: &str,
    kind: &str,
    geometry: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        WITH g AS (
            SELECT ST_SetSRID(ST_MakeValid(ST_GeomFromGeoJSON($1)), 4326) AS geom
        )
        INSERT INTO zones (zone_id, name, geom_wkt, kind, geom)
        SELECT $2, $3, ST_AsText(geom), $4, geom
        FROM g
        ON CONFLICT (zone_id) DO UPDATE
        SET name = EXCLUDED.name,
            geom_wkt = EXCLUDED.geom_wkt,
            kind = EXCLUDED.kind,
            geom = EXCLUDED.geom
        "#,
    )
    .bind(geometry.to_string())
    .bind(zone_id)
    .bind(name)
    .bind(kind)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
