//! Wire protocol for the headset's line-delimited JSON stream
//!
//! The device speaks carriage-return/newline delimited JSON records. Each
//! record carries either a raw EEG amplitude or a contact-quality report in
//! one of two shapes, distinguished by field presence. Partial records at
//! chunk boundaries are expected and classified as skips, not faults.

use serde::Deserialize;

use neuro_core::SignalQuality;

/// Control message sent once after connecting, requesting raw output in
/// JSON format.
pub const RAW_OUTPUT_CONFIG: &[u8] = br#"{"enableRawOutput":true,"format":"Json"}"#;

/// A delimiter-free run longer than this is garbage, not a partial record.
const MAX_PENDING_BYTES: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
struct ESensePayload {
    #[serde(rename = "poorSignalLevel")]
    poor_signal_level: i64,
}

/// The two known record shapes, decoded deterministically by field
/// presence. Variant order prefers the nested quality payload over the
/// flat one when a record carries both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRecord {
    Raw {
        #[serde(rename = "rawEeg")]
        raw_eeg: i32,
    },
    Nested {
        #[serde(rename = "eSense")]
        e_sense: ESensePayload,
    },
    Flat {
        #[serde(rename = "poorSignalLevel")]
        poor_signal_level: i64,
    },
}

/// Classified outcome of decoding one fragment. `Skipped` is a named,
/// routine result so callers can account for it separately from faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedRecord {
    RawSample(i32),
    Quality(SignalQuality),
    Skipped,
}

/// Decode a single delimiter-free fragment.
pub fn parse_record(fragment: &str) -> ParsedRecord {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return ParsedRecord::Skipped;
    }
    match serde_json::from_str::<WireRecord>(fragment) {
        Ok(WireRecord::Raw { raw_eeg }) => ParsedRecord::RawSample(raw_eeg),
        Ok(WireRecord::Nested { e_sense }) => quality_record(e_sense.poor_signal_level),
        Ok(WireRecord::Flat { poor_signal_level }) => quality_record(poor_signal_level),
        Err(_) => ParsedRecord::Skipped,
    }
}

fn quality_record(level: i64) -> ParsedRecord {
    match u8::try_from(level) {
        Ok(level) => ParsedRecord::Quality(SignalQuality(level)),
        Err(_) => ParsedRecord::Skipped,
    }
}

/// Incremental splitter for the byte stream: yields complete fragments and
/// carries the trailing partial record over to the next chunk.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    pending: String,
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a socket chunk and return every fragment completed by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut fragments = Vec::new();
        while let Some(position) = self.pending.find(|c: char| c == '\r' || c == '\n') {
            let fragment = self.pending[..position].to_string();
            self.pending.drain(..=position);
            if !fragment.is_empty() {
                fragments.push(fragment);
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            self.pending.clear();
        }
        fragments
    }
}
