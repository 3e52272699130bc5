//! Persistent user settings

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::BioTrackError;
use crate::units::Metric;

/// Settings edited from the Settings tab.
///
/// The alert thresholds only position the reference lines on the charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Overrides the configured device address when set
    pub device_ip: Option<String>,
    pub glucose_min: f64,
    pub glucose_max: f64,
    pub ph_min: f64,
    pub ph_max: f64,
    pub oxygen_min: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_ip: None,
            glucose_min: 70.0,
            glucose_max: 140.0,
            ph_min: 6.5,
            ph_max: 7.5,
            oxygen_min: 90.0,
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults if the file is missing or unreadable
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path).map(|contents| serde_json::from_str(&contents)) {
            Ok(Ok(settings)) => settings,
            Ok(Err(e)) => {
                warn!("Ignoring corrupt settings file {}: {}", path.display(), e);
                Self::default()
            }
            Err(e) => {
                warn!("Could not read settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BioTrackError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Device address to use, given the configured default
    pub fn effective_device_ip<'a>(&'a self, configured: &'a str) -> &'a str {
        self.device_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or(configured)
    }

    /// (low, high) alert lines for a metric chart
    pub fn alert_lines(&self, metric: Metric) -> (Option<f64>, Option<f64>) {
        match metric {
            Metric::Glucose => (Some(self.glucose_min), Some(self.glucose_max)),
            Metric::Ph => (Some(self.ph_min), Some(self.ph_max)),
            Metric::Oxygen => (Some(self.oxygen_min), None),
        }
    }
}
