//! Neuro-Device: headset connector for line-delimited JSON EEG streams
//!
//! Owns the device socket, republishes raw samples, signal quality and
//! sampling rate over multicast buses, and ships a generator-backed debug
//! mode for running the pipeline without hardware.

pub mod connector;
pub mod generator;
pub mod protocol;

pub use connector::{ConnectorConfig, ConnectorState, DeviceConnector};
pub use generator::{GeneratorConfig, SampleGenerator};
pub use protocol::{parse_record, ParsedRecord, RecordSplitter};
