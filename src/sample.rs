//! Biometric samples and the device wire format

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::BioTrackError;
use crate::units::{Metric, Severity, classify};

/// Offset-aware layouts accepted after a trailing `Z` has been rewritten to `+00:00`
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Layouts without an offset; these are read as local time
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One biometric observation from the band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<FixedOffset>,
    /// mg/dL
    pub glucose: f64,
    pub ph: f64,
    /// Percent saturation
    pub oxygen: f64,
}

/// JSON body served by the device at `GET /data`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceReading {
    pub timestamp: String,
    pub glucose: f64,
    pub ph: f64,
    pub oxygen: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<FixedOffset>, glucose: f64, ph: f64, oxygen: f64) -> Self {
        Self {
            timestamp,
            glucose,
            ph,
            oxygen,
        }
    }

    /// Build a sample from a textual timestamp
    pub fn parse(timestamp: &str, glucose: f64, ph: f64, oxygen: f64) -> Result<Self, BioTrackError> {
        Ok(Self::new(parse_timestamp(timestamp)?, glucose, ph, oxygen))
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Glucose => self.glucose,
            Metric::Ph => self.ph,
            Metric::Oxygen => self.oxygen,
        }
    }

    pub fn severity(&self, metric: Metric) -> Severity {
        classify(metric, self.value(metric))
    }

    /// Worst tier across all three metrics
    pub fn overall_severity(&self) -> Severity {
        Metric::ALL
            .iter()
            .map(|&metric| self.severity(metric))
            .max()
            .unwrap_or(Severity::Normal)
    }

    /// Milliseconds since the Unix epoch, used as the storage sort key
    pub fn epoch_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

impl TryFrom<DeviceReading> for Sample {
    type Error = BioTrackError;

    fn try_from(reading: DeviceReading) -> Result<Self, Self::Error> {
        Sample::parse(&reading.timestamp, reading.glucose, reading.ph, reading.oxygen)
    }
}

/// A sample together with the tier of each metric, for reports
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedSample {
    #[serde(flatten)]
    pub sample: Sample,
    pub glucose_status: Severity,
    pub ph_status: Severity,
    pub oxygen_status: Severity,
}

impl From<Sample> for ClassifiedSample {
    fn from(sample: Sample) -> Self {
        Self {
            glucose_status: sample.severity(Metric::Glucose),
            ph_status: sample.severity(Metric::Ph),
            oxygen_status: sample.severity(Metric::Oxygen),
            sample,
        }
    }
}

/// Parse an ISO-8601 style timestamp.
///
/// A trailing `Z` is treated as `+00:00`. Timestamps without an offset are
/// interpreted in the local time zone.
pub fn parse_timestamp(input: &str) -> Result<DateTime<FixedOffset>, BioTrackError> {
    let trimmed = input.trim();
    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stem) => format!("{}+00:00", stem),
        None => trimmed.to_string(),
    };

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&normalized, format) {
            return Ok(parsed);
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.fixed_offset())
                .ok_or_else(|| BioTrackError::InvalidTimestamp(input.to_string()));
        }
    }

    Err(BioTrackError::InvalidTimestamp(input.to_string()))
}

/// Start (or last millisecond) of a `YYYY-MM-DD` day in local time
pub fn parse_day(value: &str, end_of_day: bool) -> Result<DateTime<FixedOffset>, BioTrackError> {
    let invalid = || BioTrackError::InvalidTimestamp(value.to_string());
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(invalid)?;

    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_trailing_z_is_utc() {
        let zulu = parse_timestamp("2024-01-15T10:30:00Z").unwrap();
        let explicit = parse_timestamp("2024-01-15T10:30:00+00:00").unwrap();
        assert_eq!(zulu, explicit);
        assert_eq!(zulu.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_offsets_compare_by_instant() {
        let utc = parse_timestamp("2024-01-15T10:30:00Z").unwrap();
        let plus_three = parse_timestamp("2024-01-15T13:30:00+03:00").unwrap();
        assert_eq!(utc, plus_three);
        assert_eq!(plus_three.hour(), 13);
    }

    #[test]
    fn test_fractional_seconds() {
        let ts = parse_timestamp("2024-01-15T10:30:00.123456+00:00").unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123456);
    }

    #[test]
    fn test_naive_timestamp_is_local() {
        let ts = parse_timestamp("2024-06-01 08:15:00").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 6, 1));
        assert_eq!((ts.hour(), ts.minute()), (8, 15));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(BioTrackError::InvalidTimestamp(_))
        ));
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_device_reading_conversion() {
        let body = r#"{"timestamp":"2024-01-15T10:30:00Z","glucose":95.5,"ph":7.2,"oxygen":98}"#;
        let reading: DeviceReading = serde_json::from_str(body).unwrap();
        let sample = Sample::try_from(reading).unwrap();
        assert_eq!(sample.glucose, 95.5);
        assert_eq!(sample.oxygen, 98.0);
        assert_eq!(sample.overall_severity(), Severity::Normal);
    }

    #[test]
    fn test_out_of_range_values_are_kept() {
        let sample = Sample::parse("2024-01-15T10:30:00Z", 300.0, 7.2, 88.0).unwrap();
        assert_eq!(sample.glucose, 300.0);
        assert_eq!(sample.severity(Metric::Glucose), Severity::Critical);
        assert_eq!(sample.severity(Metric::Ph), Severity::Normal);
        assert_eq!(sample.severity(Metric::Oxygen), Severity::Critical);
    }

    #[test]
    fn test_classified_sample_json() {
        let sample = Sample::parse("2024-01-15T10:30:00Z", 125.0, 7.2, 96.0).unwrap();
        let json = serde_json::to_value(ClassifiedSample::from(sample)).unwrap();
        assert_eq!(json["glucose_status"], "warning");
        assert_eq!(json["ph_status"], "normal");
        let ts = json["timestamp"].as_str().unwrap();
        assert_eq!(parse_timestamp(ts).unwrap(), parse_timestamp("2024-01-15T10:30:00Z").unwrap());
    }

    #[test]
    fn test_parse_day_bounds() {
        let start = parse_day("2024-03-09", false).unwrap();
        let end = parse_day("2024-03-09", true).unwrap();
        assert_eq!((start.hour(), start.minute()), (0, 0));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        assert_eq!(start.date_naive(), end.date_naive());
        assert!(parse_day("09/03/2024", false).is_err());
    }
}
