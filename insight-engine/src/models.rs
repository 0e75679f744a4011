//! Shared domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------ //
//  Inbound telemetry                                                  //
// ------------------------------------------------------------------ //

/// One telemetry frame as received from the upstream feed.
///
/// The raw JSON blob is persisted alongside the typed columns, so unknown
/// keys are tolerated here and survive in the `raw` column.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryFrame {
    pub auv_id: String,
    pub timestamp: DateTime<Utc>,
    /// The allowed parcel the AUV is assigned to stay inside.
    pub zone_id: Option<String>,
    pub depth_m: Option<f64>,
    pub velocity_knots: Option<f64>,
    pub temperature_c: Option<f64>,
    pub turbidity: Option<f64>,
    pub location: Option<Location>,
}

/// Decimal-degree position in EPSG:4326.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

// ------------------------------------------------------------------ //
//  Alerts                                                             //
// ------------------------------------------------------------------ //

/// Alert categories recognised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Environmental,
    ZoneViolation,
    DeadAuv,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [
        AlertKind::Environmental,
        AlertKind::ZoneViolation,
        AlertKind::DeadAuv,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Environmental => "environmental",
            AlertKind::ZoneViolation => "zone_violation",
            AlertKind::DeadAuv => "dead_auv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "environmental" => Some(AlertKind::Environmental),
            "zone_violation" => Some(AlertKind::ZoneViolation),
            "dead_auv" => Some(AlertKind::DeadAuv),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to an alert row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_kind_round_trips_through_strings() {
        for kind in AlertKind::ALL {
            assert_eq!(AlertKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AlertKind::parse("bogus"), None);
    }

    #[test]
    fn frame_deserializes_from_feed_json() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{
                "auv_id": "AUV-1",
                "timestamp": "2025-01-01T00:00:00Z",
                "zone_id": "Z1",
                "location": {"lat": 10.5, "lon": -125.5},
                "temperature_c": 2.0,
                "turbidity": 0.15
            }"#,
        )
        .unwrap();
        assert_eq!(frame.auv_id, "AUV-1");
        assert_eq!(frame.zone_id.as_deref(), Some("Z1"));
        assert_eq!(frame.location.unwrap().lon, -125.5);
        assert_eq!(frame.depth_m, None);
    }

    #[test]
    fn frame_rejects_unparseable_timestamp() {
        let err = serde_json::from_str::<TelemetryFrame>(
            r#"{"auv_id": "AUV-1", "timestamp": "yesterday-ish"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
