//! Debug-mode sample generation
//!
//! A bounded normal sampler standing in for the real headset so the rest of
//! the pipeline can be exercised without hardware or a network.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use neuro_core::{NeuroError, NeuroResult, RawSample, SignalQuality};

/// Configuration for synthetic sample generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Samples are rejected and redrawn outside (-bound, bound)
    pub amplitude_bound: i32,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            amplitude_bound: 150,
            seed: None,
        }
    }
}

/// Synthetic substitute for the device: amplitude readings from a bounded
/// normal distribution plus uniformly random contact quality.
pub struct SampleGenerator {
    rng: StdRng,
    normal: Normal<f64>,
    bound: i32,
}

impl SampleGenerator {
    pub fn new(config: GeneratorConfig) -> NeuroResult<Self> {
        if config.amplitude_bound <= 0 {
            return Err(NeuroError::InvalidConfig {
                reason: format!("amplitude bound must be positive, got {}", config.amplitude_bound),
            });
        }

        let seed = config.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        });
        let normal = Normal::new(0.0, config.amplitude_bound as f64).map_err(|e| {
            NeuroError::InvalidConfig {
                reason: format!("failed to create normal distribution: {}", e),
            }
        })?;

        Ok(SampleGenerator {
            rng: StdRng::seed_from_u64(seed),
            normal,
            bound: config.amplitude_bound,
        })
    }

    /// Draw the next amplitude: reject-and-resample until the value falls
    /// strictly inside the configured bound, then floor to an integer.
    pub fn next_sample(&mut self) -> RawSample {
        loop {
            let value = self.normal.sample(&mut self.rng).floor() as i32;
            if value > -self.bound && value < self.bound {
                return value;
            }
        }
    }

    /// Uniformly random contact quality in [0, 100).
    pub fn next_quality(&mut self) -> SignalQuality {
        SignalQuality(self.rng.gen_range(0..100u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> SampleGenerator {
        SampleGenerator::new(GeneratorConfig {
            amplitude_bound: 150,
            seed: Some(seed),
        })
        .unwrap()
    }

    #[test]
    fn test_samples_stay_inside_bound() {
        let mut generator = seeded(7);
        for _ in 0..2000 {
            let sample = generator.next_sample();
            assert!(sample > -150 && sample < 150, "sample {} out of bound", sample);
        }
    }

    #[test]
    fn test_quality_stays_in_range() {
        let mut generator = seeded(7);
        for _ in 0..500 {
            let quality = generator.next_quality();
            assert!(quality.0 < 100);
            assert!(!quality.is_poor());
        }
    }

    #[test]
    fn test_same_seed_reproduces_stream() {
        let mut first = seeded(42);
        let mut second = seeded(42);
        let a: Vec<_> = (0..100).map(|_| first.next_sample()).collect();
        let b: Vec<_> = (0..100).map(|_| second.next_sample()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_nonpositive_bound() {
        let result = SampleGenerator::new(GeneratorConfig {
            amplitude_bound: 0,
            seed: None,
        });
        assert!(matches!(result, Err(NeuroError::InvalidConfig { .. })));
    }
}
