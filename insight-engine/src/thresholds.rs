//! Environmental threshold bands and the evaluator.
//!
//! Thresholds are compiled-in configuration; evaluation is a pure function
//! over one telemetry frame. For each present parameter the critical band is
//! tested first, then the warning band. Absent values are skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::TelemetryFrame;

// ------------------------------------------------------------------ //
//  Configuration                                                      //
// ------------------------------------------------------------------ //

/// Inclusive `[min, max]` band; values strictly outside it violate.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    fn outside(self, value: f64) -> bool {
        value < self.min || value > self.max
    }
}

/// Warning and critical bands for one parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBands {
    pub warning: Band,
    pub critical: Band,
}

/// Per-parameter threshold configuration.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdTable {
    pub temperature_c: ParameterBands,
    pub turbidity: ParameterBands,
}

pub fn environmental_thresholds() -> ThresholdTable {
    ThresholdTable {
        temperature_c: ParameterBands {
            warning: Band { min: 1.5, max: 2.5 },
            critical: Band { min: 1.0, max: 3.0 },
        },
        turbidity: ParameterBands {
            warning: Band { min: 0.05, max: 0.25 },
            critical: Band { min: 0.0, max: 0.3 },
        },
    }
}

// ------------------------------------------------------------------ //
//  Evaluation                                                         //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationLevel {
    Warning,
    Critical,
}

impl ViolationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationLevel::Warning => "warning",
            ViolationLevel::Critical => "critical",
        }
    }
}

/// A single out-of-band reading.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterViolation {
    pub parameter: &'static str,
    pub value: f64,
    #[serde(rename = "threshold_type")]
    pub level: ViolationLevel,
    pub limits: Band,
}

/// Violation report for one telemetry frame.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdReport {
    pub timestamp: DateTime<Utc>,
    pub auv_id: String,
    pub alerts: Vec<ParameterViolation>,
}

/// Evaluate one frame against the threshold table.
/// Returns `None` when every present parameter is inside its warning band.
pub fn check_thresholds(frame: &TelemetryFrame, table: &ThresholdTable) -> Option<ThresholdReport> {
    let mut alerts = Vec::new();

    if let Some(value) = frame.temperature_c {
        if let Some(hit) = check_parameter("temperature", value, table.temperature_c) {
            alerts.push(hit);
        }
    }
    if let Some(value) = frame.turbidity {
        if let Some(hit) = check_parameter("turbidity", value, table.turbidity) {
            alerts.push(hit);
        }
    }

    if alerts.is_empty() {
        return None;
    }
    Some(ThresholdReport {
        timestamp: Utc::now(),
        auv_id: frame.auv_id.clone(),
        alerts,
    })
}

fn check_parameter(
    parameter: &'static str,
    value: f64,
    bands: ParameterBands,
) -> Option<ParameterViolation> {
    if bands.critical.outside(value) {
        return Some(ParameterViolation {
            parameter,
            value,
            level: ViolationLevel::Critical,
            limits: bands.critical,
        });
    }
    if bands.warning.outside(value) {
        return Some(ParameterViolation {
            parameter,
            value,
            level: ViolationLevel::Warning,
            limits: bands.warning,
        });
    }
    None
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(temperature_c: Option<f64>, turbidity: Option<f64>) -> TelemetryFrame {
        serde_json::from_value(serde_json::json!({
            "auv_id": "AUV-1",
            "timestamp": "2025-01-01T00:00:00Z",
            "temperature_c": temperature_c,
            "turbidity": turbidity,
        }))
        .unwrap()
    }

    #[test]
    fn normal_readings_produce_no_report() {
        let report = check_thresholds(&frame(Some(2.0), Some(0.15)), &environmental_thresholds());
        assert!(report.is_none());
    }

    #[test]
    fn absent_values_are_skipped() {
        let report = check_thresholds(&frame(None, None), &environmental_thresholds());
        assert!(report.is_none());
    }

    #[test]
    fn temperature_outside_warning_band_is_warning() {
        let report =
            check_thresholds(&frame(Some(2.8), None), &environmental_thresholds()).unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].parameter, "temperature");
        assert_eq!(report.alerts[0].level, ViolationLevel::Warning);
        assert_eq!(report.alerts[0].limits.max, 2.5);
    }

    #[test]
    fn temperature_outside_critical_band_is_critical() {
        let report =
            check_thresholds(&frame(Some(3.5), None), &environmental_thresholds()).unwrap();
        assert_eq!(report.alerts[0].level, ViolationLevel::Critical);
        assert_eq!(report.alerts[0].limits.max, 3.0);
    }

    #[test]
    fn band_edge_is_inside() {
        assert!(check_thresholds(&frame(Some(2.5), None), &environmental_thresholds()).is_none());
        let report =
            check_thresholds(&frame(Some(3.0), None), &environmental_thresholds()).unwrap();
        assert_eq!(report.alerts[0].level, ViolationLevel::Warning);
    }

    #[test]
    fn negative_turbidity_is_critical() {
        let report =
            check_thresholds(&frame(None, Some(-0.05)), &environmental_thresholds()).unwrap();
        assert_eq!(report.alerts[0].parameter, "turbidity");
        assert_eq!(report.alerts[0].level, ViolationLevel::Critical);
    }

    #[test]
    fn adding_a_parameter_never_removes_a_violation() {
        let table = environmental_thresholds();
        let temp_only = check_thresholds(&frame(Some(3.5), None), &table).unwrap();
        let both = check_thresholds(&frame(Some(3.5), Some(0.4)), &table).unwrap();
        assert_eq!(both.alerts.len(), 2);
        assert_eq!(both.alerts[0].parameter, temp_only.alerts[0].parameter);
        assert_eq!(both.alerts[0].level, temp_only.alerts[0].level);
    }

    #[test]
    fn violation_serializes_with_wire_field_names() {
        let report =
            check_thresholds(&frame(Some(3.5), None), &environmental_thresholds()).unwrap();
        let value = serde_json::to_value(&report.alerts[0]).unwrap();
        assert_eq!(value["threshold_type"], "critical");
        assert_eq!(value["limits"]["min"], 1.0);
        assert_eq!(value["parameter"], "temperature");
    }
}
