//! Sample sources: the real band over HTTP, or a simulator when it is absent

use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;

use crate::error::{BioTrackError, FetchError};
use crate::sample::{DeviceReading, Sample};

/// Path of the JSON reading endpoint on the band
pub const DEVICE_DATA_PATH: &str = "/data";

/// Something the acquisition loop can poll for samples
pub trait SampleSource: Send {
    /// One attempt, no retry
    fn fetch(&mut self) -> Result<Sample, FetchError>;

    /// Whether a successful fetch means a real device is connected
    fn is_live(&self) -> bool;
}

/// Which adapter a session ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Live,
    Simulated,
}

impl AdapterKind {
    pub fn label(self) -> &'static str {
        match self {
            AdapterKind::Live => "live",
            AdapterKind::Simulated => "simulated",
        }
    }
}

/// Reads the band's `/data` endpoint
pub struct LiveDeviceAdapter {
    url: String,
    client: Client,
}

impl LiveDeviceAdapter {
    /// `ip_address` may carry a port, e.g. `192.168.4.1:8080`
    pub fn new(ip_address: &str, timeout: Duration) -> Result<Self, BioTrackError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: format!("http://{}{}", ip_address.trim(), DEVICE_DATA_PATH),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one GET. Any failure, including a non-200 status or an
    /// unparseable body, is reported as unreachable.
    pub fn fetch(&self) -> Result<Sample, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| FetchError::Unreachable(format!("request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Unreachable(format!(
                "device returned {}",
                response.status()
            )));
        }

        let reading: DeviceReading = response
            .json()
            .map_err(|e| FetchError::Unreachable(format!("malformed body: {}", e)))?;

        Sample::try_from(reading).map_err(|e| FetchError::Unreachable(e.to_string()))
    }
}

/// Synthesises readings inside the normal band. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedAdapter;

impl SimulatedAdapter {
    pub fn sample_at(now: DateTime<Local>) -> Sample {
        let t = now.timestamp_millis() as f64 / 1000.0;
        Sample::new(
            now.fixed_offset(),
            90.0 + 5.0 * (t % 2.0),
            7.0 + 0.2 * (t % 1.0),
            95.0 + 2.0 * (t % 1.0),
        )
    }

    pub fn fetch(&self) -> Sample {
        Self::sample_at(Local::now())
    }
}

/// Adapter resolved once per monitoring session
pub enum SourceAdapter {
    Live(LiveDeviceAdapter),
    Simulated(SimulatedAdapter),
}

impl SourceAdapter {
    /// Probe the band once; fall back to the simulator if it does not answer.
    ///
    /// The probe sample is discarded. The choice holds for the whole session.
    pub fn select(ip_address: &str, timeout: Duration) -> Self {
        let adapter = match LiveDeviceAdapter::new(ip_address, timeout) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("Could not build HTTP client for {}: {}", ip_address, e);
                return SourceAdapter::Simulated(SimulatedAdapter);
            }
        };

        match adapter.fetch() {
            Ok(_) => {
                info!("Device answered at {}, using live data", adapter.url());
                SourceAdapter::Live(adapter)
            }
            Err(e) => {
                warn!("No device at {} ({}), using simulated data", adapter.url(), e);
                SourceAdapter::Simulated(SimulatedAdapter)
            }
        }
    }

    pub fn kind(&self) -> AdapterKind {
        match self {
            SourceAdapter::Live(_) => AdapterKind::Live,
            SourceAdapter::Simulated(_) => AdapterKind::Simulated,
        }
    }
}

impl SampleSource for SourceAdapter {
    fn fetch(&mut self) -> Result<Sample, FetchError> {
        match self {
            SourceAdapter::Live(adapter) => adapter.fetch(),
            SourceAdapter::Simulated(adapter) => {
                let sample = adapter.fetch();
                debug!("Simulated sample at {}", sample.timestamp);
                Ok(sample)
            }
        }
    }

    fn is_live(&self) -> bool {
        self.kind() == AdapterKind::Live
    }
}
