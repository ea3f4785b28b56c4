//! Streaming spectral processor
//!
//! Buffers raw samples up to the configured resolution, then hands each
//! full window to a spawned task for artifact rejection, FFT magnitude
//! computation and frequency slicing. Windows are independent, so spectra
//! may publish out of batch-formation order; within the spectrum bus,
//! delivery still follows publish order.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use neuro_core::{NeuroError, NeuroResult, Recorder, Spectrum, StreamBus};

use crate::spectrum::{magnitude_spectrum, slice_len};

/// Configuration for the streaming spectral processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Samples per window in streaming mode
    pub batch_resolution: usize,
    /// Sampling rate of the incoming stream in Hz
    pub sample_frequency: f64,
    /// Pin the published slice at 48 bins for responsive display
    pub live_mode: bool,
    /// Windows whose peak absolute amplitude exceeds this are discarded
    pub artifact_threshold: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_resolution: 512,
            sample_frequency: 512.0,
            live_mode: false,
            artifact_threshold: 50_000_000.0,
        }
    }
}

impl ProcessorConfig {
    fn validate(&self) -> NeuroResult<()> {
        if self.batch_resolution == 0 {
            return Err(NeuroError::InvalidConfig {
                reason: "batch resolution must be at least 1".to_string(),
            });
        }
        if !(self.sample_frequency > 0.0) {
            return Err(NeuroError::InvalidConfig {
                reason: format!("sample frequency must be positive, got {}", self.sample_frequency),
            });
        }
        if !(self.artifact_threshold > 0.0) {
            return Err(NeuroError::InvalidConfig {
                reason: format!(
                    "artifact threshold must be positive, got {}",
                    self.artifact_threshold
                ),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ProcessorInner {
    batch_resolution: usize,
    live_mode: bool,
    artifact_threshold: f64,
    sample_frequency: Mutex<f64>,
    batch: Mutex<Vec<f64>>,
    spectrum: StreamBus<Spectrum>,
    last_spectrum: Mutex<Option<Spectrum>>,
    open: AtomicBool,
    recorder: Recorder,
}

impl ProcessorInner {
    /// Spectral step for one window. Owns the window exclusively; empty and
    /// artifact-contaminated windows are skipped without publishing.
    fn process_window(&self, window: Vec<f64>) {
        if window.is_empty() {
            return;
        }

        let peak = window.iter().fold(0.0f64, |acc, value| acc.max(value.abs()));
        if peak > self.artifact_threshold {
            debug!(
                peak,
                threshold = self.artifact_threshold,
                samples = window.len(),
                "window rejected as artifact"
            );
            return;
        }

        let sample_frequency = *lock(&self.sample_frequency);
        let mut magnitudes = match magnitude_spectrum(&window) {
            Ok(magnitudes) => magnitudes,
            Err(transform_error) => {
                warn!(error = %transform_error, "spectral transform failed, window dropped");
                return;
            }
        };
        magnitudes.truncate(slice_len(window.len(), sample_frequency, self.live_mode));

        *lock(&self.last_spectrum) = Some(magnitudes.clone());
        self.spectrum.publish(magnitudes);
    }
}

/// Streaming FFT processor; clones share the same batching state and
/// spectrum bus, so bus callbacks can hold one cheaply.
pub struct SignalProcessor {
    inner: Arc<ProcessorInner>,
}

impl Clone for SignalProcessor {
    fn clone(&self) -> Self {
        SignalProcessor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SignalProcessor {
    pub fn new(config: ProcessorConfig) -> NeuroResult<Self> {
        config.validate()?;
        Ok(SignalProcessor {
            inner: Arc::new(ProcessorInner {
                batch_resolution: config.batch_resolution,
                live_mode: config.live_mode,
                artifact_threshold: config.artifact_threshold,
                sample_frequency: Mutex::new(config.sample_frequency),
                batch: Mutex::new(Vec::new()),
                spectrum: StreamBus::new(),
                last_spectrum: Mutex::new(None),
                open: AtomicBool::new(true),
                recorder: Recorder::new(),
            }),
        })
    }

    /// Streaming path: append one sample; on reaching the configured
    /// resolution the window moves to a spawned spectral task and a fresh
    /// batch begins. Requires a tokio runtime; a no-op after `close`.
    pub fn add_sample(&self, value: f64) {
        if !self.inner.open.load(Ordering::Acquire) {
            return;
        }
        let full_window = {
            let mut batch = lock(&self.inner.batch);
            batch.push(value);
            if batch.len() >= self.inner.batch_resolution {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };
        if let Some(window) = full_window {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.process_window(window);
            });
        }
    }

    /// Bulk path: analyze a pre-formed window inline, bypassing the
    /// resolution-triggered batching. Size is the caller's concern; an
    /// empty window is simply skipped.
    pub fn process_batch(&self, samples: Vec<f64>) {
        self.inner.process_window(samples);
    }

    pub fn set_sampling_rate(&self, sample_frequency: f64) {
        *lock(&self.inner.sample_frequency) = sample_frequency;
    }

    pub fn spectrum(&self) -> &StreamBus<Spectrum> {
        &self.inner.spectrum
    }

    /// Most recently published spectrum, if any window has survived.
    pub fn last_spectrum(&self) -> Option<Spectrum> {
        lock(&self.inner.last_spectrum).clone()
    }

    /// Capture published spectra to `path` for `duration`; a second request
    /// while a session is active is a warning and a no-op.
    pub fn record(&self, path: impl AsRef<Path>, duration: Duration) {
        self.inner
            .recorder
            .start(&self.inner.spectrum, duration, path);
    }

    pub async fn await_recording(&self) {
        self.inner.recorder.await_completion().await;
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recorder.is_active()
    }

    /// Stop accepting samples and dispose the spectrum bus. Windows already
    /// in flight publish into the disposed bus, which is a tolerated no-op.
    pub fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.spectrum.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn spectra_sink(processor: &SignalProcessor) -> Arc<StdMutex<Vec<Spectrum>>> {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        // Dropping the token does not unsubscribe, so the sink stays live.
        let _ = processor
            .spectrum()
            .subscribe(move |spectrum| sink.lock().unwrap().push(spectrum.clone()));
        collected
    }

    fn sine(n: usize, cycles: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * cycles * i as f64 / n as f64).sin())
            .collect()
    }

    #[test]
    fn test_bulk_batch_publishes_one_sliced_spectrum() {
        let processor = SignalProcessor::new(ProcessorConfig::default()).unwrap();
        let collected = spectra_sink(&processor);

        processor.process_batch(sine(512, 10.0));

        let collected = collected.lock().unwrap();
        assert_eq!(collected.len(), 1);
        // 512 samples at 512 Hz: 50 bins below 50 Hz, already a multiple of 10.
        assert_eq!(collected[0].len(), 50);
        assert_eq!(processor.last_spectrum().unwrap().len(), 50);
    }

    #[test]
    fn test_live_mode_pins_slice_at_48_bins() {
        let processor = SignalProcessor::new(ProcessorConfig {
            live_mode: true,
            ..Default::default()
        })
        .unwrap();
        let collected = spectra_sink(&processor);

        processor.process_batch(sine(512, 10.0));
        processor.process_batch(sine(16, 3.0));

        let collected = collected.lock().unwrap();
        assert_eq!(collected[0].len(), 48);
        assert_eq!(collected[1].len(), 9); // clamped to available bins
    }

    #[test]
    fn test_artifact_window_publishes_nothing() {
        let processor = SignalProcessor::new(ProcessorConfig::default()).unwrap();
        let collected = spectra_sink(&processor);

        let mut window = sine(512, 10.0);
        window[100] = 1.0e9; // blink-scale excursion, default threshold 5e7
        processor.process_batch(window);

        assert!(collected.lock().unwrap().is_empty());
        assert!(processor.last_spectrum().is_none());
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let processor = SignalProcessor::new(ProcessorConfig::default()).unwrap();
        let collected = spectra_sink(&processor);

        processor.process_batch(Vec::new());

        assert!(collected.lock().unwrap().is_empty());
        assert!(processor.last_spectrum().is_none());
    }

    #[test]
    fn test_spectral_peak_lands_on_signal_bin() {
        let processor = SignalProcessor::new(ProcessorConfig {
            batch_resolution: 128,
            sample_frequency: 128.0,
            live_mode: false,
            artifact_threshold: 100.0,
        })
        .unwrap();
        let collected = spectra_sink(&processor);

        processor.process_batch(sine(128, 10.0));

        let collected = collected.lock().unwrap();
        let spectrum = &collected[0];
        assert_eq!(spectrum.len(), 50);
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(bin, _)| bin)
            .unwrap();
        assert_eq!(peak_bin, 10);
    }

    #[test]
    fn test_sampling_rate_update_changes_slice() {
        let processor = SignalProcessor::new(ProcessorConfig {
            batch_resolution: 100,
            sample_frequency: 200.0,
            live_mode: false,
            artifact_threshold: 100.0,
        })
        .unwrap();
        let collected = spectra_sink(&processor);

        processor.process_batch(sine(100, 5.0));
        processor.set_sampling_rate(100.0);
        processor.process_batch(sine(100, 5.0));

        let collected = collected.lock().unwrap();
        assert_eq!(collected[0].len(), 20); // 2 Hz spacing: 25 bins -> 20
        assert_eq!(collected[1].len(), 50); // 1 Hz spacing: 50 bins -> 50
    }

    #[tokio::test]
    async fn test_streaming_path_emits_at_resolution_boundary() {
        let processor = SignalProcessor::new(ProcessorConfig {
            batch_resolution: 8,
            sample_frequency: 512.0,
            live_mode: true,
            artifact_threshold: 100.0,
        })
        .unwrap();
        let collected = spectra_sink(&processor);

        for round in 0..2 {
            for i in 0..8 {
                processor.add_sample(((round * 8 + i) as f64 * 0.3).sin());
            }
            let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
            while collected.lock().unwrap().len() <= round
                && tokio::time::Instant::now() < deadline
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        let collected = collected.lock().unwrap();
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(|spectrum| spectrum.len() == 5));
    }

    #[tokio::test]
    async fn test_close_stops_intake() {
        let processor = SignalProcessor::new(ProcessorConfig {
            batch_resolution: 4,
            ..Default::default()
        })
        .unwrap();
        let collected = spectra_sink(&processor);

        processor.close();
        for i in 0..8 {
            processor.add_sample(i as f64);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(collected.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let zero_resolution = SignalProcessor::new(ProcessorConfig {
            batch_resolution: 0,
            ..Default::default()
        });
        assert!(matches!(
            zero_resolution,
            Err(NeuroError::InvalidConfig { .. })
        ));

        let bad_frequency = SignalProcessor::new(ProcessorConfig {
            sample_frequency: 0.0,
            ..Default::default()
        });
        assert!(matches!(bad_frequency, Err(NeuroError::InvalidConfig { .. })));
    }
}
