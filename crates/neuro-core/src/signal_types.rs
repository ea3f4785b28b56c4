//! Shared signal types for the streaming pipeline

use serde::{Deserialize, Serialize};

/// A single raw EEG amplitude reading. No identity beyond arrival order.
pub type RawSample = i32;

/// Samples observed during the preceding one-second window.
pub type SampleRateTick = u32;

/// One-sided FFT magnitude values, indexed by frequency bin.
pub type Spectrum = Vec<f64>;

/// Headset contact quality: 0 is a clean signal, 200 means the electrode
/// has lost contact entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalQuality(pub u8);

impl SignalQuality {
    /// Sentinel reported by the headset when the electrode is off-skin.
    pub const POOR_CONTACT: SignalQuality = SignalQuality(200);

    pub fn is_poor(&self) -> bool {
        *self == Self::POOR_CONTACT
    }
}
