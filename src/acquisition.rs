//! Background polling of a sample source
//!
//! One worker thread per loop. Each cycle fetches once, hands the result to
//! every subscriber in registration order, then sleeps for the poll interval
//! measured from the end of that work. A cycle's publications always finish
//! before the next fetch starts.
//!
//! Cancellation is cooperative: `stop()` clears the run flag and wakes the
//! worker if it is sleeping. An in-flight fetch is never interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::error::BioTrackError;
use crate::sample::Sample;
use crate::source::SampleSource;

/// Receives the outputs of every poll cycle, on the worker thread
pub trait Subscriber: Send {
    fn on_sample(&mut self, sample: &Sample);

    /// Called once per cycle, after `on_sample` when there was one
    fn on_connectivity(&mut self, _connected: bool) {}
}

/// What the loop publishes to a UI channel
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    SampleReady(Sample),
    Connectivity(bool),
}

impl Subscriber for Sender<AcquisitionEvent> {
    fn on_sample(&mut self, sample: &Sample) {
        // A dropped receiver only means nobody is watching any more
        let _ = self.send(AcquisitionEvent::SampleReady(sample.clone()));
    }

    fn on_connectivity(&mut self, connected: bool) {
        let _ = self.send(AcquisitionEvent::Connectivity(connected));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Built, not started yet
    Idle,
    Running,
    /// Terminal
    Stopped,
}

struct Pending<S> {
    source: S,
    subscribers: Vec<Box<dyn Subscriber>>,
}

pub struct AcquisitionLoop<S: SampleSource + 'static> {
    pending: Option<Pending<S>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    state: LoopState,
}

impl<S: SampleSource + 'static> AcquisitionLoop<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            pending: Some(Pending {
                source,
                subscribers: Vec::new(),
            }),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            state: LoopState::Idle,
        }
    }

    /// Register a subscriber. Only possible before `start()`.
    pub fn subscribe(&mut self, subscriber: impl Subscriber + 'static) -> Result<(), BioTrackError> {
        let pending = self.pending.as_mut().ok_or(BioTrackError::LoopAlreadyStarted)?;
        pending.subscribers.push(Box::new(subscriber));
        Ok(())
    }

    /// Spawn the worker. A loop can only be started once.
    pub fn start(&mut self) -> Result<(), BioTrackError> {
        let Pending {
            source,
            subscribers,
        } = self.pending.take().ok_or(BioTrackError::LoopAlreadyStarted)?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || run_worker(source, subscribers, interval, running));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.state = LoopState::Running;
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.state = LoopState::Stopped;
                Err(e.into())
            }
        }
    }

    /// Ask the worker to exit after its current fetch. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
        self.pending = None;
        self.state = LoopState::Stopped;
    }

    /// Wait for the worker thread to finish. Returns immediately if it never ran.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Acquisition worker panicked");
            }
        }
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        self.join();
    }

    /// A worker that died (a subscriber panicked) counts as stopped
    pub fn state(&self) -> LoopState {
        match (&self.worker, self.state) {
            (Some(worker), LoopState::Running) if worker.is_finished() => LoopState::Stopped,
            (_, state) => state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }
}

impl<S: SampleSource + 'static> Drop for AcquisitionLoop<S> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run_worker<S: SampleSource>(
    mut source: S,
    mut subscribers: Vec<Box<dyn Subscriber>>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    let live = source.is_live();
    let mut last_connected: Option<bool> = None;
    debug!("Acquisition worker started (live = {}, interval = {:?})", live, interval);

    while running.load(Ordering::Acquire) {
        let connected = match source.fetch() {
            Ok(sample) => {
                for subscriber in subscribers.iter_mut() {
                    subscriber.on_sample(&sample);
                }
                live
            }
            Err(e) => {
                debug!("Fetch failed: {}", e);
                false
            }
        };

        for subscriber in subscribers.iter_mut() {
            subscriber.on_connectivity(connected);
        }
        if last_connected != Some(connected) {
            info!("Device {}", if connected { "connected" } else { "disconnected" });
            last_connected = Some(connected);
        }

        sleep_while_running(interval, &running);
    }

    debug!("Acquisition worker exiting");
}

/// Fixed-delay sleep that returns early once the run flag is cleared
fn sleep_while_running(interval: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::park_timeout(deadline - now);
    }
}
