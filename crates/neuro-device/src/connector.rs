//! Device connector: owns the socket and republishes the device streams
//!
//! Lifecycle is `Created → Open → Closing → Closed`. `start` brings up the
//! TCP link (or the debug generator) and launches the ingestion and
//! rate-tick tasks; `close` signals both cooperatively, joins them, then
//! disposes the buses so shutdown is deterministic rather than
//! timing-dependent.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use neuro_core::{RawSample, Recorder, SampleRateTick, SignalQuality, StreamBus};
use neuro_core::{NeuroError, NeuroResult};

use crate::generator::{GeneratorConfig, SampleGenerator};
use crate::protocol::{parse_record, ParsedRecord, RecordSplitter, RAW_OUTPUT_CONFIG};

/// Connection settings for the headset's socket server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub hostname: String,
    pub port: u16,
    /// Generate synthetic data instead of opening the socket
    pub debug: bool,
    /// Log a warning whenever the headset reports lost electrode contact
    pub verbose: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 13854,
            debug: false,
            verbose: false,
        }
    }
}

/// Connector lifecycle states; transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Created,
    Open,
    Closing,
    Closed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ConnectorShared {
    raw: StreamBus<RawSample>,
    quality: StreamBus<SignalQuality>,
    rate: StreamBus<SampleRateTick>,
    rate_counter: AtomicU32,
    open: AtomicBool,
    state: Mutex<ConnectorState>,
    parse_skips: AtomicU64,
    recorder: Recorder,
    verbose: bool,
}

impl ConnectorShared {
    /// Route one classified record onto the matching bus. Every parsed
    /// record counts toward the sampling rate, whichever field it carried.
    fn dispatch(&self, record: ParsedRecord) {
        match record {
            ParsedRecord::RawSample(sample) => {
                self.rate_counter.fetch_add(1, Ordering::AcqRel);
                self.raw.publish(sample);
            }
            ParsedRecord::Quality(quality) => {
                self.rate_counter.fetch_add(1, Ordering::AcqRel);
                if self.verbose && quality.is_poor() {
                    warn!("poor headset contact reported");
                }
                self.quality.publish(quality);
            }
            ParsedRecord::Skipped => {
                let skipped = self.parse_skips.fetch_add(1, Ordering::AcqRel) + 1;
                trace!(total = skipped, "skipped unparseable fragment");
            }
        }
    }

    fn dispose_buses(&self) {
        self.raw.dispose();
        self.quality.dispose();
        self.rate.dispose();
    }
}

/// Owns the device socket and fans the stream out to three buses: raw
/// samples, signal quality and a once-per-second sampling-rate tick.
pub struct DeviceConnector {
    config: ConnectorConfig,
    shared: Arc<ConnectorShared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let verbose = config.verbose;
        DeviceConnector {
            config,
            shared: Arc::new(ConnectorShared {
                raw: StreamBus::new(),
                quality: StreamBus::new(),
                rate: StreamBus::new(),
                rate_counter: AtomicU32::new(0),
                open: AtomicBool::new(false),
                state: Mutex::new(ConnectorState::Created),
                parse_skips: AtomicU64::new(0),
                recorder: Recorder::new(),
                verbose,
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Open the device link and launch the ingestion and rate-tick tasks.
    ///
    /// In wire mode the TCP connect and the raw-output configuration
    /// handshake happen before this returns, so connect-time failures
    /// surface here as `ConnectionFailed` after the connector has closed
    /// itself. Calling `start` on an already-started connector warns and
    /// does nothing.
    pub async fn start(&self) -> NeuroResult<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ConnectorState::Created {
                warn!(state = ?*state, "connector already started");
                return Ok(());
            }
            *state = ConnectorState::Open;
        }
        self.shared.open.store(true, Ordering::Release);

        if self.config.debug {
            let generator = match SampleGenerator::new(GeneratorConfig::default()) {
                Ok(generator) => generator,
                Err(error) => {
                    self.abort_open();
                    return Err(error);
                }
            };
            info!("connector started in debug mode");
            self.spawn(generate_loop(
                Arc::clone(&self.shared),
                generator,
                self.shutdown.subscribe(),
            ));
        } else {
            let address = format!("{}:{}", self.config.hostname, self.config.port);
            let mut socket = match TcpStream::connect(&address).await {
                Ok(socket) => socket,
                Err(io_error) => {
                    self.abort_open();
                    return Err(NeuroError::ConnectionFailed {
                        reason: format!("{}: {}", address, io_error),
                    });
                }
            };
            if let Err(io_error) = socket.write_all(RAW_OUTPUT_CONFIG).await {
                self.abort_open();
                return Err(NeuroError::ConnectionFailed {
                    reason: format!("{}: config handshake: {}", address, io_error),
                });
            }
            info!(%address, "device connected, retrieving data");
            self.spawn(ingest_loop(
                Arc::clone(&self.shared),
                socket,
                self.shutdown.subscribe(),
            ));
        }

        self.spawn(rate_loop(
            Arc::clone(&self.shared),
            self.shutdown.subscribe(),
        ));
        Ok(())
    }

    /// Cooperatively stop every task, join them, then dispose all three
    /// buses and drop the socket. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                ConnectorState::Closing | ConnectorState::Closed => return,
                _ => *state = ConnectorState::Closing,
            }
        }
        self.shared.open.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);

        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            let _ = task.await;
        }

        self.shared.dispose_buses();
        *lock(&self.shared.state) = ConnectorState::Closed;
        info!("connection closed");
    }

    /// Capture the raw-sample stream to `path` for `duration`. A second
    /// request while a session is active is a warning and a no-op.
    pub fn record(&self, path: impl AsRef<Path>, duration: Duration) {
        self.shared
            .recorder
            .start(&self.shared.raw, duration, path);
    }

    pub async fn await_recording(&self) {
        self.shared.recorder.await_completion().await;
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recorder.is_active()
    }

    pub fn raw_samples(&self) -> &StreamBus<RawSample> {
        &self.shared.raw
    }

    pub fn signal_quality(&self) -> &StreamBus<SignalQuality> {
        &self.shared.quality
    }

    pub fn sampling_rate(&self) -> &StreamBus<SampleRateTick> {
        &self.shared.rate
    }

    pub fn state(&self) -> ConnectorState {
        *lock(&self.shared.state)
    }

    /// Count of fragments skipped as unparseable since the connector opened.
    pub fn parse_skips(&self) -> u64 {
        self.shared.parse_skips.load(Ordering::Acquire)
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        lock(&self.tasks).push(tokio::spawn(task));
    }

    /// Failed before any task launched: close out immediately.
    fn abort_open(&self) {
        self.shared.open.store(false, Ordering::Release);
        self.shared.dispose_buses();
        *lock(&self.shared.state) = ConnectorState::Closed;
    }
}

/// Wire-mode ingestion: read socket chunks, split into fragments, dispatch
/// each classified record. The loop observes the shutdown signal once per
/// read, so cancellation latency is bounded by a single chunk.
async fn ingest_loop(
    shared: Arc<ConnectorShared>,
    mut socket: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut splitter = RecordSplitter::new();
    let mut chunk = [0u8; 1024];

    while shared.open.load(Ordering::Acquire) {
        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = socket.read(&mut chunk) => read,
        };
        match read {
            Ok(0) => {
                info!("device closed the stream");
                break;
            }
            Ok(received) => {
                for fragment in splitter.push_chunk(&chunk[..received]) {
                    shared.dispatch(parse_record(&fragment));
                }
            }
            Err(io_error) => {
                warn!(error = %io_error, "socket read failed, stopping ingestion");
                break;
            }
        }
    }
}

/// Debug-mode ingestion: synthetic amplitude plus quality per iteration,
/// paced well above the real device's sampling rate.
async fn generate_loop(
    shared: Arc<ConnectorShared>,
    mut generator: SampleGenerator,
    mut shutdown: watch::Receiver<bool>,
) {
    const PACING: Duration = Duration::from_micros(500);

    while shared.open.load(Ordering::Acquire) {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(PACING) => {
                let sample = generator.next_sample();
                shared.rate_counter.fetch_add(1, Ordering::AcqRel);
                shared.raw.publish(sample);
                shared.quality.publish(generator.next_quality());
            }
        }
    }
}

/// Once per second: swap-reset the sample counter and publish the count
/// observed during the preceding window.
async fn rate_loop(shared: Arc<ConnectorShared>, mut shutdown: watch::Receiver<bool>) {
    while shared.open.load(Ordering::Acquire) {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let count = shared.rate_counter.swap(0, Ordering::AcqRel);
                shared.rate.publish(count);
            }
        }
    }
}
