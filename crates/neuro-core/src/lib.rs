//! Neuro-Core: foundation primitives for the EEG stream framework
//!
//! Multicast stream bus, time-bounded recording, and shared signal types.

pub mod error;
pub mod recorder;
pub mod signal_types;
pub mod stream_bus;

pub use error::{NeuroError, NeuroResult};
pub use recorder::Recorder;
pub use signal_types::{RawSample, SampleRateTick, SignalQuality, Spectrum};
pub use stream_bus::{StreamBus, Subscription};
