//! # Performance Model
//! Tree-ensemble regressor mapping parameter vectors to predicted pipeline
//! performance, plus the feature scaler fitted alongside it. Both are
//! serialized to disk after every successful training and loaded on startup
//! when present. The on-disk format is component-private.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::{mean_squared_error, r2};
use smartcore::model_selection::train_test_split;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::errors::AnalyzerError;

/// Split seed kept fixed so retraining on identical history is reproducible.
const SPLIT_SEED: u64 = 42;
const TEST_FRACTION: f32 = 0.2;

/// Quality gates a freshly trained model must clear.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingGates {
    pub r2_floor: f64,
    pub mse_ceiling: f64,
}

impl Default for TrainingGates {
    fn default() -> Self {
        Self {
            r2_floor: 0.7,
            mse_ceiling: 0.1,
        }
    }
}

/// Evaluation of the held-out split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows: usize,
    pub r2: f64,
    pub mse: f64,
}

/// Mean/std feature scaler, the counterpart of the regressor's training
/// distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FeatureScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, AnalyzerError> {
        let Some(first) = rows.first() else {
            return Err(AnalyzerError::Optimizer("cannot fit scaler on empty data".into()));
        };
        let dims = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; dims];
        for row in rows {
            for (i, v) in row.iter().enumerate() {
                means[i] += v / n;
            }
        }
        let mut stds = vec![0.0; dims];
        for row in rows {
            for (i, v) in row.iter().enumerate() {
                stds[i] += (v - means[i]).powi(2) / n;
            }
        }
        for s in stds.iter_mut() {
            *s = s.sqrt();
            if *s < 1e-12 {
                *s = 1.0; // constant feature, pass through unscaled
            }
        }
        Ok(Self { means, stds })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, v)| (v - self.means.get(i).unwrap_or(&0.0)) / self.stds.get(i).unwrap_or(&1.0))
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Trained regressor plus its scaler.
#[derive(Serialize, Deserialize)]
pub struct PerformanceModel {
    forest: Forest,
    scaler: FeatureScaler,
}

impl PerformanceModel {
    /// Train on `(features, performance)` rows, evaluate on a held-out
    /// split, and enforce the quality gates.
    pub fn train(
        features: &[Vec<f64>],
        targets: &[f64],
        gates: TrainingGates,
    ) -> Result<(Self, TrainingReport), AnalyzerError> {
        if features.len() != targets.len() || features.len() < 5 {
            return Err(AnalyzerError::Optimizer(format!(
                "not enough aligned training rows: {}",
                features.len()
            )));
        }

        let scaler = FeatureScaler::fit(features)?;
        let scaled = scaler.transform_all(features);

        let x = DenseMatrix::from_2d_vec(&scaled);
        let y = targets.to_vec();
        let (x_train, x_test, y_train, y_test) =
            train_test_split(&x, &y, TEST_FRACTION, true, Some(SPLIT_SEED));

        let forest = Forest::fit(&x_train, &y_train, Default::default())
            .map_err(|e| AnalyzerError::Optimizer(format!("forest fit: {e}")))?;

        let y_pred = forest
            .predict(&x_test)
            .map_err(|e| AnalyzerError::Optimizer(format!("holdout predict: {e}")))?;

        let report = TrainingReport {
            rows: features.len(),
            r2: r2(&y_test, &y_pred),
            mse: mean_squared_error(&y_test, &y_pred),
        };

        if report.r2 < gates.r2_floor || report.mse > gates.mse_ceiling {
            return Err(AnalyzerError::Optimizer(format!(
                "model below quality gates: r2 {:.3} (floor {:.2}), mse {:.4} (ceiling {:.2})",
                report.r2, gates.r2_floor, report.mse, gates.mse_ceiling
            )));
        }

        info!(target: "optimizer", rows = report.rows, r2 = report.r2, mse = report.mse, "model trained");
        Ok((Self { forest, scaler }, report))
    }

    /// Predicted performance for one raw (unscaled) parameter row.
    pub fn predict(&self, row: &[f64]) -> Result<f64, AnalyzerError> {
        let scaled = vec![self.scaler.transform(row)];
        let x = DenseMatrix::from_2d_vec(&scaled);
        let out = self
            .forest
            .predict(&x)
            .map_err(|e| AnalyzerError::Optimizer(format!("predict: {e}")))?;
        out.first()
            .copied()
            .ok_or_else(|| AnalyzerError::Optimizer("empty prediction".into()))
    }

    /// Persist regressor and scaler as the two component-private artifacts.
    pub fn save(&self, dir: &Path) -> Result<(), AnalyzerError> {
        fs::create_dir_all(dir)
            .map_err(|e| AnalyzerError::Persistence(format!("create {}: {e}", dir.display())))?;
        let forest_bytes = bincode::serialize(&self.forest)
            .map_err(|e| AnalyzerError::Persistence(format!("serialize predictor: {e}")))?;
        let scaler_bytes = bincode::serialize(&self.scaler)
            .map_err(|e| AnalyzerError::Persistence(format!("serialize scaler: {e}")))?;
        fs::write(dir.join("predictor.bin"), forest_bytes)
            .map_err(|e| AnalyzerError::Persistence(format!("write predictor: {e}")))?;
        fs::write(dir.join("scaler.bin"), scaler_bytes)
            .map_err(|e| AnalyzerError::Persistence(format!("write scaler: {e}")))?;
        Ok(())
    }

    /// Load previously persisted artifacts; `None` when absent.
    pub fn load(dir: &Path) -> Result<Option<Self>, AnalyzerError> {
        let predictor = dir.join("predictor.bin");
        let scaler = dir.join("scaler.bin");
        if !predictor.exists() || !scaler.exists() {
            return Ok(None);
        }
        let forest_bytes = fs::read(&predictor)
            .map_err(|e| AnalyzerError::Persistence(format!("read predictor: {e}")))?;
        let scaler_bytes = fs::read(&scaler)
            .map_err(|e| AnalyzerError::Persistence(format!("read scaler: {e}")))?;
        let forest = bincode::deserialize(&forest_bytes)
            .map_err(|e| AnalyzerError::Persistence(format!("decode predictor: {e}")))?;
        let scaler = bincode::deserialize(&scaler_bytes)
            .map_err(|e| AnalyzerError::Persistence(format!("decode scaler: {e}")))?;
        Ok(Some(Self { forest, scaler }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic surface: performance rises with the first feature, falls
    /// with the second. Learnable by a small forest.
    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut features = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        for i in 0..n {
            let a = (i % 10) as f64 / 10.0;
            let b = ((i / 10) % 10) as f64 / 10.0;
            features.push(vec![a, b, 0.5]);
            targets.push(0.3 + 0.5 * a - 0.2 * b);
        }
        (features, targets)
    }

    #[test]
    fn scaler_centers_and_scales() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let s = FeatureScaler::fit(&rows).unwrap();
        let t = s.transform(&[3.0, 10.0]);
        assert!(t[0].abs() < 1e-9); // mean maps to zero
        assert!(t[1].abs() < 1e-9); // constant feature passes through
    }

    #[test]
    fn trains_and_predicts_monotone_surface() {
        let (features, targets) = synthetic(100);
        let (model, report) = PerformanceModel::train(&features, &targets, TrainingGates::default()).unwrap();
        assert!(report.r2 >= 0.7, "r2 {}", report.r2);

        let low = model.predict(&[0.1, 0.5, 0.5]).unwrap();
        let high = model.predict(&[0.9, 0.5, 0.5]).unwrap();
        assert!(high > low);
    }

    #[test]
    fn noise_fails_the_quality_gates() {
        // Targets unrelated to features: the holdout r2 cannot clear 0.7.
        let features: Vec<Vec<f64>> = (0..60).map(|i| vec![(i % 7) as f64, (i % 3) as f64]).collect();
        let targets: Vec<f64> = (0..60).map(|i| ((i * 37) % 11) as f64 / 11.0).collect();
        assert!(PerformanceModel::train(&features, &targets, TrainingGates::default()).is_err());
    }

    #[test]
    fn save_then_load_roundtrips_predictions() {
        let tmp = tempfile::tempdir().unwrap();
        let (features, targets) = synthetic(100);
        let (model, _) = PerformanceModel::train(&features, &targets, TrainingGates::default()).unwrap();
        model.save(tmp.path()).unwrap();

        let loaded = PerformanceModel::load(tmp.path()).unwrap().expect("artifacts present");
        let probe = vec![0.4, 0.2, 0.5];
        assert!((model.predict(&probe).unwrap() - loaded.predict(&probe).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn load_without_artifacts_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PerformanceModel::load(tmp.path()).unwrap().is_none());
    }
}
