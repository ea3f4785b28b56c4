//! Linear component decomposition for collected epoch matrices
//!
//! Stateless per call: each invocation z-score normalizes the observation
//! matrix and re-fits a fixed-rank PCA or FastICA on it. Acceptable because
//! decomposition runs on bounded, already-collected batches, never on the
//! live per-sample path.

use linfa::prelude::*;
use linfa_ica::fast_ica::FastIca;
use linfa_reduction::Pca;
use ndarray::Array2;

use neuro_core::{NeuroError, NeuroResult};

/// Fixed-rank PCA/ICA transform over observation matrices
/// (rows = samples, columns = channels/epochs).
pub struct ComponentDecomposer {
    components: usize,
    max_iterations: usize,
    tolerance: f64,
}

impl ComponentDecomposer {
    pub fn new(components: usize) -> NeuroResult<Self> {
        Self::with_params(components, 200, 1e-4)
    }

    /// FastICA iteration knobs are tunable; PCA ignores them.
    pub fn with_params(
        components: usize,
        max_iterations: usize,
        tolerance: f64,
    ) -> NeuroResult<Self> {
        if components == 0 {
            return Err(NeuroError::InvalidConfig {
                reason: "component count must be at least 1".to_string(),
            });
        }
        if max_iterations == 0 {
            return Err(NeuroError::InvalidConfig {
                reason: "max iterations must be at least 1".to_string(),
            });
        }
        Ok(ComponentDecomposer {
            components,
            max_iterations,
            tolerance,
        })
    }

    pub fn components(&self) -> usize {
        self.components
    }

    /// Project `observations` onto its leading principal components.
    /// Row count is preserved; column count becomes the configured rank.
    pub fn pca(&self, observations: &Array2<f64>) -> NeuroResult<Array2<f64>> {
        let normalized = self.normalize(observations)?;
        let dataset = DatasetBase::from(normalized.clone());
        let model = Pca::params(self.components)
            .whiten(false)
            .fit(&dataset)
            .map_err(|fit_error| NeuroError::DecompositionFailed {
                reason: format!("PCA fit: {}", fit_error),
            })?;
        Ok(model.predict(&normalized))
    }

    /// Unmix `observations` into the configured number of independent
    /// components via FastICA.
    pub fn ica(&self, observations: &Array2<f64>) -> NeuroResult<Array2<f64>> {
        let normalized = self.normalize(observations)?;
        let dataset = DatasetBase::from(normalized.clone());
        let model = FastIca::params()
            .ncomponents(self.components)
            .max_iter(self.max_iterations)
            .tol(self.tolerance)
            .fit(&dataset)
            .map_err(|fit_error| NeuroError::DecompositionFailed {
                reason: format!("FastICA fit: {:?}", fit_error),
            })?;
        Ok(model.predict(&normalized))
    }

    fn normalize(&self, observations: &Array2<f64>) -> NeuroResult<Array2<f64>> {
        if observations.nrows() == 0 {
            return Err(NeuroError::DecompositionFailed {
                reason: "empty observation matrix".to_string(),
            });
        }
        if self.components > observations.ncols() {
            return Err(NeuroError::DecompositionFailed {
                reason: format!(
                    "component count {} exceeds column count {}",
                    self.components,
                    observations.ncols()
                ),
            });
        }
        zscore_columns(observations)
    }
}

/// Subtract each column's mean and divide by its standard deviation. A
/// zero-variance column is the caller's error, never a silent NaN.
fn zscore_columns(observations: &Array2<f64>) -> NeuroResult<Array2<f64>> {
    let rows = observations.nrows() as f64;
    let mut normalized = observations.clone();
    for (column, mut values) in normalized.columns_mut().into_iter().enumerate() {
        let mean = values.mean().unwrap_or(0.0);
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / rows;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return Err(NeuroError::DegenerateColumn { column });
        }
        values.mapv_inplace(|v| (v - mean) / std_dev);
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Mixed sinusoidal sources, one mixture per column.
    fn epoch_matrix(rows: usize, columns: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, columns), |(i, j)| {
            let t = i as f64 / 256.0;
            let f1 = 5.0 + j as f64;
            let f2 = 10.0 + j as f64 * 0.5;
            (2.0 * PI * f1 * t).sin() + 0.5 * (2.0 * PI * f2 * t).cos()
        })
    }

    #[test]
    fn test_pca_projects_to_configured_rank() {
        let decomposer = ComponentDecomposer::new(3).unwrap();
        let observations = epoch_matrix(120, 6);

        let transformed = decomposer.pca(&observations).unwrap();

        assert_eq!(transformed.nrows(), 120);
        assert_eq!(transformed.ncols(), 3);
        assert!(transformed.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_ica_unmixes_to_configured_rank() {
        let decomposer = ComponentDecomposer::new(4).unwrap();
        let observations = epoch_matrix(1024, 4);

        let transformed = decomposer.ica(&observations).unwrap();

        assert_eq!(transformed.nrows(), 1024);
        assert_eq!(transformed.ncols(), 4);
        assert!(transformed.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_variance_column_is_rejected() {
        let decomposer = ComponentDecomposer::new(2).unwrap();
        let mut observations = epoch_matrix(64, 4);
        observations.column_mut(2).fill(1.5);

        let result = decomposer.pca(&observations);
        assert_eq!(result, Err(NeuroError::DegenerateColumn { column: 2 }));
    }

    #[test]
    fn test_rank_above_column_count_is_rejected() {
        let decomposer = ComponentDecomposer::new(5).unwrap();
        let observations = epoch_matrix(64, 3);

        assert!(matches!(
            decomposer.ica(&observations),
            Err(NeuroError::DecompositionFailed { .. })
        ));
    }

    #[test]
    fn test_zero_rank_is_rejected_at_construction() {
        assert!(matches!(
            ComponentDecomposer::new(0),
            Err(NeuroError::InvalidConfig { .. })
        ));
    }
}
