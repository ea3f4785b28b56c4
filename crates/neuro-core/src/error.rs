//! Error handling for the EEG stream framework
//!
//! Only faults that cross a component boundary get a variant here; routine
//! stream conditions (malformed fragments, rejected batches, re-entrant
//! recording requests) are absorbed locally and logged instead.

use std::fmt;

/// Result type alias for framework operations
pub type NeuroResult<T> = Result<T, NeuroError>;

/// Fault taxonomy for the connector and processing layers
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum NeuroError {
    /// Socket connect/reset/abort while bringing up the device link
    ConnectionFailed {
        /// Peer address and underlying I/O failure
        reason: String,
    },

    /// Rejected configuration at construction time
    InvalidConfig {
        /// Description of the offending parameter
        reason: String,
    },

    /// Zero-variance column handed to the component decomposer
    DegenerateColumn {
        /// Index of the column that cannot be z-scored
        column: usize,
    },

    /// PCA/ICA fit or transform failure reported by the numerics layer
    DecompositionFailed {
        /// Underlying algorithm error
        reason: String,
    },

    /// FFT transform failure for a spectral window
    SpectralTransform {
        /// Underlying transform error
        reason: String,
    },
}

impl fmt::Display for NeuroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeuroError::ConnectionFailed { reason } => {
                write!(f, "Device connection failed: {}", reason)
            }
            NeuroError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            NeuroError::DegenerateColumn { column } => {
                write!(
                    f,
                    "Column {} has zero variance and cannot be normalized",
                    column
                )
            }
            NeuroError::DecompositionFailed { reason } => {
                write!(f, "Component decomposition failed: {}", reason)
            }
            NeuroError::SpectralTransform { reason } => {
                write!(f, "Spectral transform failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for NeuroError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NeuroError::ConnectionFailed {
            reason: "127.0.0.1:13854: connection refused".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Device connection failed"));
        assert!(display.contains("13854"));
    }

    #[test]
    fn test_error_equality() {
        let error1 = NeuroError::DegenerateColumn { column: 3 };
        let error2 = NeuroError::DegenerateColumn { column: 3 };
        assert_eq!(error1, error2);
    }
}
