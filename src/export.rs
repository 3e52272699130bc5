//! CSV export of stored readings

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::BioTrackError;
use crate::sample::Sample;

const HEADER: [&str; 4] = ["Timestamp", "Glucose", "pH", "Oxygen"];

/// Write readings to a CSV file, returning the number of rows
pub fn export_to_csv<P: AsRef<Path>>(path: P, readings: &[Sample]) -> Result<usize, BioTrackError> {
    let file = std::fs::File::create(path)?;
    write_csv(file, readings)
}

/// Write readings as CSV in the order given
pub fn write_csv<W: Write>(writer: W, readings: &[Sample]) -> Result<usize, BioTrackError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)?;

    for reading in readings {
        wtr.write_record([
            reading.timestamp.to_rfc3339(),
            reading.glucose.to_string(),
            reading.ph.to_string(),
            reading.oxygen.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(readings.len())
}

/// Suggested file name for an export made on `date`
pub fn default_export_name(date: NaiveDate) -> String {
    format!("biotrack_data_{}.csv", date.format("%Y%m%d"))
}
