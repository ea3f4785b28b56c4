//! Neuro-Processing: windowed spectral analysis for the raw-sample stream
//!
//! Batches incoming samples, rejects artifact-contaminated windows,
//! publishes FFT magnitude spectra, and offers PCA/ICA decomposition for
//! collected epoch matrices.

pub mod decompose;
pub mod processor;
pub mod spectrum;

pub use decompose::ComponentDecomposer;
pub use processor::{ProcessorConfig, SignalProcessor};
pub use spectrum::{magnitude_spectrum, slice_len, ADAPTIVE_CUTOFF_HZ, LIVE_SLICE_BINS};
