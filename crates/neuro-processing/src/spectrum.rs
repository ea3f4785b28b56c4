//! Spectral estimation helpers for batch windows

use std::cell::RefCell;

use num_complex::Complex;
use realfft::RealFftPlanner;

use neuro_core::{NeuroError, NeuroResult};

/// Fixed bin count published in live mode, approximating a 0-48 Hz band.
pub const LIVE_SLICE_BINS: usize = 48;

/// Adaptive slicing keeps only bins below this frequency.
pub const ADAPTIVE_CUTOFF_HZ: f64 = 50.0;

/// Adaptive slice lengths are rounded down to a multiple of this.
const ADAPTIVE_GRANULARITY: usize = 10;

thread_local! {
    // FFT plans are cached per thread so repeated windows of the same
    // length reuse their twiddle tables.
    static PLANNER: RefCell<RealFftPlanner<f64>> = RefCell::new(RealFftPlanner::new());
}

/// One-sided real-FFT magnitude spectrum of `samples`: `floor(N/2)+1` bins
/// spaced `sample_frequency / N` apart.
pub fn magnitude_spectrum(samples: &[f64]) -> NeuroResult<Vec<f64>> {
    let fft = PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(samples.len()));
    let mut input = samples.to_vec();
    let mut output: Vec<Complex<f64>> = fft.make_output_vec();
    fft.process(&mut input, &mut output)
        .map_err(|fft_error| NeuroError::SpectralTransform {
            reason: fft_error.to_string(),
        })?;
    Ok(output.iter().map(|bin| bin.norm()).collect())
}

/// Number of leading bins retained for publication.
///
/// Live mode pins the slice at [`LIVE_SLICE_BINS`] for responsive display;
/// otherwise the count of bins below [`ADAPTIVE_CUTOFF_HZ`] is rounded
/// down to a multiple of ten so high-resolution batches cannot produce
/// unbounded spectra. Both are clamped to the available bin count.
pub fn slice_len(batch_size: usize, sample_frequency: f64, live_mode: bool) -> usize {
    let bins = batch_size / 2 + 1;
    if live_mode {
        return LIVE_SLICE_BINS.min(bins);
    }
    let spacing = sample_frequency / batch_size as f64;
    let below_cutoff = (0..bins)
        .filter(|bin| (*bin as f64) * spacing < ADAPTIVE_CUTOFF_HZ)
        .count();
    ((below_cutoff / ADAPTIVE_GRANULARITY) * ADAPTIVE_GRANULARITY).min(bins)
}
