//! AUV Insight Engine.
//!
//! Consumes a live telemetry feed from a fleet of autonomous underwater
//! vehicles, persists each observation to PostgreSQL/PostGIS, raises
//! environmental, geofencing and dead-vehicle alerts, and fans them out to
//! subscribed operator clients over WebSockets. Alert history is served
//! through the `/insights` endpoint with optional rollups.

pub mod alerts;
pub mod config;
pub mod dead_auv;
pub mod handlers;
pub mod hub;
pub mod ingest;
pub mod insights;
pub mod models;
pub mod store;
pub mod thresholds;
pub mod upstream;
pub mod zones;
