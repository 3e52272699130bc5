//! Monitoring session: adapter selection, the acquisition loop and the
//! state shared with renderers

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use log::info;

use crate::acquisition::{AcquisitionEvent, AcquisitionLoop, Subscriber};
use crate::buffer::MetricBuffers;
use crate::error::BioTrackError;
use crate::sample::Sample;
use crate::source::{AdapterKind, SourceAdapter};
use crate::storage::{PersistSubscriber, Persister};
use crate::units::{Metric, Severity};

/// Everything the dashboard draws
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    pub buffers: MetricBuffers,
    pub latest: Option<Sample>,
    pub connected: bool,
    pub samples_received: u64,
}

impl LiveState {
    pub fn apply_sample(&mut self, sample: &Sample) {
        self.buffers.push_sample(sample);
        self.latest = Some(sample.clone());
        self.samples_received += 1;
    }

    /// Latest value and its tier for a metric
    pub fn current(&self, metric: Metric) -> Option<(f64, Severity)> {
        self.latest
            .as_ref()
            .map(|sample| (sample.value(metric), sample.severity(metric)))
    }

    pub fn last_update(&self) -> Option<DateTime<FixedOffset>> {
        self.latest.as_ref().map(|sample| sample.timestamp)
    }
}

pub type SharedState = Arc<Mutex<LiveState>>;

/// Feeds acquisition output into the shared state
struct StateSubscriber(SharedState);

impl Subscriber for StateSubscriber {
    fn on_sample(&mut self, sample: &Sample) {
        if let Ok(mut state) = self.0.lock() {
            state.apply_sample(sample);
        }
    }

    fn on_connectivity(&mut self, connected: bool) {
        if let Ok(mut state) = self.0.lock() {
            state.connected = connected;
        }
    }
}

/// Polling parameters for one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub device_ip: String,
    pub fetch_timeout: Duration,
    pub poll_interval: Duration,
}

/// At most one acquisition loop per user at a time
pub struct MonitoringSession {
    state: SharedState,
    acquisition: Option<AcquisitionLoop<SourceAdapter>>,
    adapter_kind: Option<AdapterKind>,
    user_id: Option<String>,
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LiveState::default())),
            acquisition: None,
            adapter_kind: None,
            user_id: None,
        }
    }

    /// Start monitoring for `user_id`, replacing any running loop.
    ///
    /// The previous loop is stopped and joined before the device is probed.
    pub fn start<P: Persister + 'static>(
        &mut self,
        user_id: &str,
        options: &SessionOptions,
        persister: P,
        notify: Option<Sender<AcquisitionEvent>>,
    ) -> Result<AdapterKind, BioTrackError> {
        self.stop();
        let adapter = SourceAdapter::select(&options.device_ip, options.fetch_timeout);
        self.start_with_adapter(user_id, adapter, options.poll_interval, persister, notify)
    }

    /// Start monitoring with an adapter that was already selected.
    ///
    /// Subscribers run in the order: live state, persistence, `notify`.
    pub fn start_with_adapter<P: Persister + 'static>(
        &mut self,
        user_id: &str,
        adapter: SourceAdapter,
        poll_interval: Duration,
        persister: P,
        notify: Option<Sender<AcquisitionEvent>>,
    ) -> Result<AdapterKind, BioTrackError> {
        self.stop();
        // Buffers belong to one session; the previous worker is joined by now
        if let Ok(mut state) = self.state.lock() {
            *state = LiveState::default();
        }
        let kind = adapter.kind();

        let mut acquisition = AcquisitionLoop::new(adapter, poll_interval);
        acquisition.subscribe(StateSubscriber(Arc::clone(&self.state)))?;
        acquisition.subscribe(PersistSubscriber::new(persister, user_id))?;
        if let Some(sender) = notify {
            acquisition.subscribe(sender)?;
        }
        acquisition.start()?;

        info!("Monitoring for user {} ({} data)", user_id, kind.label());

        self.acquisition = Some(acquisition);
        self.adapter_kind = Some(kind);
        self.user_id = Some(user_id.to_string());
        Ok(kind)
    }

    /// Stop and join the current loop, if any
    pub fn stop(&mut self) {
        if let Some(mut acquisition) = self.acquisition.take() {
            acquisition.stop_and_join();
            info!("Monitoring stopped");
        }
        if let Ok(mut state) = self.state.lock() {
            state.connected = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.acquisition.as_ref().is_some_and(|a| a.is_running())
    }

    pub fn adapter_kind(&self) -> Option<AdapterKind> {
        self.adapter_kind
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Consistent copy of the live state for rendering
    pub fn snapshot(&self) -> LiveState {
        self.state.lock().map(|state| state.clone()).unwrap_or_default()
    }
}

impl Drop for MonitoringSession {
    fn drop(&mut self) {
        self.stop();
    }
}
