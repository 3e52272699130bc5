//! SQLite storage for biometric readings

use chrono::{DateTime, FixedOffset};
use log::error;
use rusqlite::{Connection, OptionalExtension, Result, params};
use std::path::Path;

use crate::acquisition::Subscriber;
use crate::error::BioTrackError;
use crate::sample::{Sample, parse_timestamp};

/// Durable home for samples, keyed by user
pub trait Persister: Send {
    fn save(&self, user_id: &str, sample: &Sample) -> std::result::Result<(), BioTrackError>;

    /// Samples with `start <= timestamp <= end`, newest first
    fn query(
        &self,
        user_id: &str,
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
    ) -> std::result::Result<Vec<Sample>, BioTrackError>;
}

/// SQLite database for storing readings
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Create or open a database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                epoch_ms INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                glucose REAL NOT NULL,
                ph REAL NOT NULL,
                oxygen REAL NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_readings_user_epoch
                ON readings(user_id, epoch_ms);"
        )?;

        Ok(Self { conn })
    }

    /// Append a reading, returning its row id
    pub fn save_reading(&self, user_id: &str, sample: &Sample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO readings (user_id, epoch_ms, timestamp, glucose, ph, oxygen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                sample.epoch_ms(),
                sample.timestamp.to_rfc3339(),
                sample.glucose,
                sample.ph,
                sample.oxygen,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Readings for a user within optional inclusive bounds, newest first
    pub fn get_readings(
        &self,
        user_id: &str,
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<Sample>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, glucose, ph, oxygen
             FROM readings
             WHERE user_id = ?1
               AND (?2 IS NULL OR epoch_ms >= ?2)
               AND (?3 IS NULL OR epoch_ms <= ?3)
             ORDER BY epoch_ms DESC, id DESC"
        )?;

        let start_ms = start.map(|ts| ts.timestamp_millis());
        let end_ms = end.map(|ts| ts.timestamp_millis());

        let readings = stmt
            .query_map(params![user_id, start_ms, end_ms], Self::row_to_sample)?
            .collect::<Result<Vec<_>>>()?;

        Ok(readings)
    }

    /// Most recent reading for a user
    pub fn latest(&self, user_id: &str) -> Result<Option<Sample>> {
        self.conn
            .query_row(
                "SELECT timestamp, glucose, ph, oxygen FROM readings
                 WHERE user_id = ?1 ORDER BY epoch_ms DESC, id DESC LIMIT 1",
                [user_id],
                Self::row_to_sample,
            )
            .optional()
    }

    /// Get total reading count for a user
    pub fn count(&self, user_id: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM readings WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
    }

    fn row_to_sample(row: &rusqlite::Row) -> Result<Sample> {
        let raw: String = row.get(0)?;
        let timestamp = parse_timestamp(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Sample::new(timestamp, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

impl Persister for Storage {
    fn save(&self, user_id: &str, sample: &Sample) -> std::result::Result<(), BioTrackError> {
        self.save_reading(user_id, sample)?;
        Ok(())
    }

    fn query(
        &self,
        user_id: &str,
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
    ) -> std::result::Result<Vec<Sample>, BioTrackError> {
        Ok(self.get_readings(user_id, start, end)?)
    }
}

/// Saves every acquired sample for one user. Failures are logged only.
pub struct PersistSubscriber<P: Persister> {
    persister: P,
    user_id: String,
}

impl<P: Persister> PersistSubscriber<P> {
    pub fn new(persister: P, user_id: impl Into<String>) -> Self {
        Self {
            persister,
            user_id: user_id.into(),
        }
    }
}

impl<P: Persister> Subscriber for PersistSubscriber<P> {
    fn on_sample(&mut self, sample: &Sample) {
        if let Err(e) = self.persister.save(&self.user_id, sample) {
            error!("Could not save reading for {}: {}", self.user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_at(minute: i64, glucose: f64) -> Sample {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap() + Duration::minutes(minute);
        Sample::new(ts.fixed_offset(), glucose, 7.2, 97.0)
    }

    #[test]
    fn test_save_and_query_newest_first() {
        let storage = Storage::open_in_memory().unwrap();
        for (minute, glucose) in [(0, 90.0), (10, 110.0), (5, 100.0)] {
            storage.save_reading("alice", &sample_at(minute, glucose)).unwrap();
        }

        let readings = storage.get_readings("alice", None, None).unwrap();
        let values: Vec<f64> = readings.iter().map(|r| r.glucose).collect();
        assert_eq!(values, vec![110.0, 100.0, 90.0]);
        assert_eq!(storage.count("alice").unwrap(), 3);
    }

    #[test]
    fn test_readings_are_per_user() {
        let storage = Storage::open_in_memory().unwrap();
        storage.save_reading("alice", &sample_at(0, 90.0)).unwrap();
        storage.save_reading("bob", &sample_at(1, 95.0)).unwrap();

        assert_eq!(storage.count("alice").unwrap(), 1);
        assert_eq!(storage.get_readings("bob", None, None).unwrap()[0].glucose, 95.0);
        assert!(storage.get_readings("carol", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_inclusive_range_filter() {
        let storage = Storage::open_in_memory().unwrap();
        for minute in 0..10 {
            storage.save_reading("alice", &sample_at(minute, 80.0 + minute as f64)).unwrap();
        }

        let start = sample_at(3, 0.0).timestamp;
        let end = sample_at(6, 0.0).timestamp;
        let values: Vec<f64> = storage
            .get_readings("alice", Some(start), Some(end))
            .unwrap()
            .iter()
            .map(|r| r.glucose)
            .collect();
        assert_eq!(values, vec![86.0, 85.0, 84.0, 83.0]);

        assert_eq!(storage.get_readings("alice", Some(start), None).unwrap().len(), 7);
        assert_eq!(storage.get_readings("alice", None, Some(end)).unwrap().len(), 7);
    }

    #[test]
    fn test_mixed_offsets_sort_by_instant() {
        let storage = Storage::open_in_memory().unwrap();
        let earlier = Sample::parse("2024-01-15T12:00:00+03:00", 1.0, 7.0, 95.0).unwrap();
        let later = Sample::parse("2024-01-15T09:30:00Z", 2.0, 7.0, 95.0).unwrap();
        storage.save_reading("alice", &later).unwrap();
        storage.save_reading("alice", &earlier).unwrap();

        let readings = storage.get_readings("alice", None, None).unwrap();
        assert_eq!(readings[0], later);
        assert_eq!(readings[1], earlier);
        assert_eq!(storage.latest("alice").unwrap(), Some(later));
    }

    #[test]
    fn test_latest_on_empty_store() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.latest("alice").unwrap(), None);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.db");
        Storage::new(&path).unwrap().save_reading("alice", &sample_at(0, 99.0)).unwrap();

        let reopened = Storage::new(&path).unwrap();
        assert_eq!(reopened.count("alice").unwrap(), 1);
    }

    #[test]
    fn test_persist_subscriber_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.db");
        let mut subscriber = PersistSubscriber::new(Storage::new(&path).unwrap(), "alice");
        subscriber.on_sample(&sample_at(0, 91.0));
        subscriber.on_sample(&sample_at(1, 92.0));

        let storage = Storage::new(&path).unwrap();
        assert_eq!(storage.query("alice", None, None).unwrap().len(), 2);
    }
}
