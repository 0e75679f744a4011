//! PostgreSQL/PostGIS pool bootstrap.
//!
//! A transaction pooler (PgBouncer) fronts the database, so the prepared
//! statement cache is disabled and connections are health-checked before
//! each acquire. Schema is managed by the SQL files under `migrations/`;
//! the service never auto-creates tables.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(database_url)
        .context("invalid database connection string")?
        .application_name("insight-engine-auv")
        .statement_cache_capacity(0);

    PgPoolOptions::new()
        .max_connections(10)
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .context("Failed to connect to PostgreSQL")
}
