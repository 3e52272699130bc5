//! Configuration file parsing and data locations

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::auth::DEFAULT_AUTH_URL;
use crate::error::BioTrackError;

pub const APP_NAME: &str = "BioTrack SmartBand";
pub const DEFAULT_DEVICE_IP: &str = "192.168.4.1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 3000;

const DEFAULT_CONFIG: &str = "\
# BioTrack SmartBand configuration
# Format: key value   (anything after # is ignored)

# Address of the band on the local network, optionally with :port
device_ip 192.168.4.1

# How long to wait between polls, and how long a single request may take
poll_interval_ms 5000
fetch_timeout_ms 3000

# Where readings are stored (defaults to the data directory)
# database_path /path/to/biotrack_data.db

# Identity provider for sign-in; without a key the app runs offline
# auth_api_key YOUR_API_KEY
# auth_url https://identitytoolkit.googleapis.com/v1/accounts
";

/// Configuration loaded from config.txt
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub device_ip: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub database_path: Option<String>,
    pub auth_api_key: Option<String>,
    pub auth_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_ip: DEFAULT_DEVICE_IP.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            database_path: None,
            auth_api_key: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BioTrackError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = HashMap::new();

        for line in reader.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = Self::parse_line(line) {
                entries.insert(key.to_string(), value.to_string());
            }
        }

        Self::from_entries(entries)
    }

    /// Split "key value # comment" into (key, value)
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        let line = line.split('#').next()?.trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }

    fn from_entries(entries: HashMap<String, String>) -> Result<Self, BioTrackError> {
        let mut config = Config::default();

        for (key, value) in entries {
            match key.as_str() {
                "device_ip" => config.device_ip = value,
                "poll_interval_ms" => config.poll_interval = parse_millis(&key, &value)?,
                "fetch_timeout_ms" => config.fetch_timeout = parse_millis(&key, &value)?,
                "database_path" => config.database_path = Some(value),
                "auth_api_key" => config.auth_api_key = Some(value),
                "auth_url" => config.auth_url = value,
                _ => warn!("Ignoring unknown config key '{}'", key),
            }
        }

        Ok(config)
    }

    /// Write the commented default configuration
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), BioTrackError> {
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Configured database path, or the default one in the data directory
    pub fn database_path(&self) -> String {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_database_path().to_string_lossy().to_string())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, BioTrackError> {
    match value.parse::<u64>() {
        Ok(0) => Err(BioTrackError::Config(format!("{} must be greater than zero", key))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(_) => Err(BioTrackError::Config(format!(
            "{} expects milliseconds, got '{}'",
            key, value
        ))),
    }
}

/// Per-user application data directory
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("biotrack")
}

pub fn ensure_data_dir() -> std::io::Result<()> {
    fs::create_dir_all(get_data_dir())
}

pub fn default_database_path() -> PathBuf {
    get_data_dir().join("biotrack_data.db")
}

pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}

pub fn settings_file_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

pub fn default_export_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(contents: &str) -> Result<Config, BioTrackError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        fs::write(&path, contents).unwrap();
        Config::load(&path)
    }

    #[test]
    fn test_default_file_matches_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        Config::create_default(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_values_and_comments() {
        let config = load_str(
            "# comment\n\
             device_ip 10.0.0.7:8080   # the band\n\
             \n\
             poll_interval_ms 250\n\
             fetch_timeout_ms\t100\n\
             database_path /tmp/bio.db\n\
             auth_api_key abc123\n",
        )
        .unwrap();

        assert_eq!(config.device_ip, "10.0.0.7:8080");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.fetch_timeout, Duration::from_millis(100));
        assert_eq!(config.database_path(), "/tmp/bio.db");
        assert_eq!(config.auth_api_key.as_deref(), Some("abc123"));
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = load_str("colour blue\ndevice_ip 1.2.3.4\n").unwrap();
        assert_eq!(config.device_ip, "1.2.3.4");
    }

    #[test]
    fn test_bad_interval_is_an_error() {
        assert!(matches!(load_str("poll_interval_ms soon\n"), Err(BioTrackError::Config(_))));
        assert!(matches!(load_str("fetch_timeout_ms 0\n"), Err(BioTrackError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::load("/definitely/not/here/config.txt"),
            Err(BioTrackError::Io(_))
        ));
    }
}
