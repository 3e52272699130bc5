//! Biometric metrics, display units and clinical classification
//!
//! Every sample carries three metrics. Each one is classified on its own
//! against a fixed table of clinical bounds into a severity tier. The table
//! is not user-adjustable: the alert thresholds in the settings only move
//! the reference lines drawn on the charts.

use serde::{Deserialize, Serialize};

/// One of the three quantities reported by the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Glucose,
    Ph,
    Oxygen,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Glucose, Metric::Ph, Metric::Oxygen];

    /// Get a display label for the metric
    pub fn label(self) -> &'static str {
        match self {
            Metric::Glucose => "Glucose",
            Metric::Ph => "pH Level",
            Metric::Oxygen => "Oxygen",
        }
    }

    /// Get the unit label
    pub fn unit_label(self) -> &'static str {
        match self {
            Metric::Glucose => "mg/dL",
            Metric::Ph => "pH",
            Metric::Oxygen => "%",
        }
    }

    /// Format just the value without unit suffix
    pub fn format_value(self, value: f64) -> String {
        match self {
            Metric::Ph => format!("{:.2}", value),
            Metric::Glucose | Metric::Oxygen => format!("{:.1}", value),
        }
    }

    /// Format the value with unit suffix
    pub fn format(self, value: f64) -> String {
        format!("{} {}", self.format_value(value), self.unit_label())
    }
}

/// Classification tier of a single metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Clinical bounds for one metric.
///
/// All comparisons are strict, so a value sitting exactly on a bound belongs
/// to the better tier. Oxygen has no upper bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub critical_low: f64,
    pub warning_low: f64,
    pub warning_high: Option<f64>,
    pub critical_high: Option<f64>,
}

impl Thresholds {
    pub const GLUCOSE: Thresholds = Thresholds {
        critical_low: 70.0,
        warning_low: 80.0,
        warning_high: Some(120.0),
        critical_high: Some(140.0),
    };

    pub const PH: Thresholds = Thresholds {
        critical_low: 6.5,
        warning_low: 7.0,
        warning_high: Some(7.4),
        critical_high: Some(7.5),
    };

    pub const OXYGEN: Thresholds = Thresholds {
        critical_low: 90.0,
        warning_low: 95.0,
        warning_high: None,
        critical_high: None,
    };

    pub fn for_metric(metric: Metric) -> Thresholds {
        match metric {
            Metric::Glucose => Self::GLUCOSE,
            Metric::Ph => Self::PH,
            Metric::Oxygen => Self::OXYGEN,
        }
    }

    /// Classify a value: critical bounds first, then warning bounds.
    /// Non-finite values are always critical.
    pub fn classify(&self, value: f64) -> Severity {
        if !value.is_finite() {
            return Severity::Critical;
        }
        if value < self.critical_low || self.critical_high.is_some_and(|high| value > high) {
            Severity::Critical
        } else if value < self.warning_low || self.warning_high.is_some_and(|high| value > high) {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    /// Get the normal band as a display string
    pub fn format_range(&self, metric: Metric) -> String {
        match self.warning_high {
            Some(high) => format!(
                "{}-{} {}",
                metric.format_value(self.warning_low),
                metric.format_value(high),
                metric.unit_label()
            ),
            None => format!(">= {}", metric.format(self.warning_low)),
        }
    }
}

/// Classify a metric value against the fixed clinical table
pub fn classify(metric: Metric, value: f64) -> Severity {
    Thresholds::for_metric(metric).classify(value)
}
