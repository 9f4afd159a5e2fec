//! Drift detection (spec §5): compare a model's predictions against observed
//! data with MAPE, RMSE, and a two-sided CUSUM changepoint test.

use crate::error::{PelError, PelResult};

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub mape: f64,
    pub rmse: f64,
    pub cusum_detected: bool,
    pub cusum_changepoint: Option<usize>,
    pub cusum_statistic: Vec<f64>,
    pub drift_threshold_exceeded: bool,
    pub recommendations: Vec<String>,
}

pub struct DriftDetector {
    pub mape_threshold: f64,
    pub rmse_threshold: Option<f64>,
    pub cusum_threshold: f64,
    pub cusum_slack: f64,
}

impl Default for DriftDetector {
    fn default() -> Self {
        DriftDetector { mape_threshold: 0.15, rmse_threshold: None, cusum_threshold: 5.0, cusum_slack: 0.5 }
    }
}

impl DriftDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_mape(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        let pairs: Vec<(f64, f64)> = observed.iter().zip(predicted).filter(|(o, _)| **o != 0.0).map(|(o, p)| (*o, *p)).collect();
        if pairs.is_empty() {
            return f64::INFINITY;
        }
        pairs.iter().map(|(o, p)| ((o - p) / o).abs()).sum::<f64>() / pairs.len() as f64
    }

    pub fn compute_rmse(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        let n = observed.len() as f64;
        (observed.iter().zip(predicted).map(|(o, p)| (o - p).powi(2)).sum::<f64>() / n).sqrt()
    }

    /// Two-sided CUSUM test over standardized residuals. Returns
    /// `(detected, changepoint_index, cusum_max_series)`.
    pub fn cusum_test(&self, observed: &[f64], predicted: &[f64]) -> (bool, Option<usize>, Vec<f64>) {
        let residuals: Vec<f64> = observed.iter().zip(predicted).map(|(o, p)| o - p).collect();
        let n = residuals.len();
        let mean_residual = residuals.iter().sum::<f64>() / n as f64;
        let std_residual = (residuals.iter().map(|r| (r - mean_residual).powi(2)).sum::<f64>() / n as f64).sqrt();

        if std_residual == 0.0 {
            return (false, None, vec![0.0; n]);
        }

        let standardized: Vec<f64> = residuals.iter().map(|r| (r - mean_residual) / std_residual).collect();
        let mut cusum_pos = vec![0.0; n];
        let mut cusum_neg = vec![0.0; n];
        for i in 1..n {
            cusum_pos[i] = (cusum_pos[i - 1] + standardized[i] - self.cusum_slack).max(0.0);
            cusum_neg[i] = (cusum_neg[i - 1] - standardized[i] - self.cusum_slack).max(0.0);
        }
        let cusum_max: Vec<f64> = cusum_pos.iter().zip(&cusum_neg).map(|(p, n)| p.max(*n)).collect();
        let changepoint = cusum_max.iter().position(|v| *v > self.cusum_threshold);
        (changepoint.is_some(), changepoint, cusum_max)
    }

    pub fn detect_drift(&self, observed: &[f64], predicted: &[f64]) -> PelResult<DriftReport> {
        if observed.len() != predicted.len() {
            return Err(PelError::Calibration("observed and predicted series must have the same length".to_string()));
        }
        if observed.is_empty() {
            return Err(PelError::Calibration("cannot detect drift with empty series".to_string()));
        }

        let mape = self.compute_mape(observed, predicted);
        let rmse = self.compute_rmse(observed, predicted);
        let (cusum_detected, cusum_changepoint, cusum_statistic) = self.cusum_test(observed, predicted);

        let mut drift_threshold_exceeded = mape > self.mape_threshold;
        if let Some(rmse_threshold) = self.rmse_threshold {
            drift_threshold_exceeded = drift_threshold_exceeded || rmse > rmse_threshold;
        }

        let mut recommendations = Vec::new();
        if drift_threshold_exceeded {
            recommendations.push(format!("model drift detected: MAPE={:.1}% exceeds threshold {:.1}%", mape * 100.0, self.mape_threshold * 100.0));
        }
        if cusum_detected {
            recommendations.push(format!("CUSUM test detected a changepoint at observation {}", cusum_changepoint.unwrap()));
            recommendations.push("consider recalibrating with recent data only".to_string());
        }
        if mape > 0.25 {
            recommendations.push("high prediction error; model may need structural changes".to_string());
        } else if mape > self.mape_threshold {
            recommendations.push("moderate prediction error; recalibration recommended".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("predictions are accurate; no action needed".to_string());
        }

        Ok(DriftReport {
            mape,
            rmse,
            cusum_detected,
            cusum_changepoint,
            cusum_statistic,
            drift_threshold_exceeded,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_error_and_no_drift() {
        let observed = vec![100.0, 110.0, 120.0, 130.0];
        let detector = DriftDetector::new();
        let report = detector.detect_drift(&observed, &observed).unwrap();
        assert_eq!(report.mape, 0.0);
        assert_eq!(report.rmse, 0.0);
        assert!(!report.drift_threshold_exceeded);
    }

    #[test]
    fn large_mape_exceeds_threshold() {
        let observed = vec![100.0, 100.0, 100.0, 100.0];
        let predicted = vec![50.0, 50.0, 50.0, 50.0];
        let detector = DriftDetector::new();
        let report = detector.detect_drift(&observed, &predicted).unwrap();
        assert!(report.drift_threshold_exceeded);
        assert_eq!(report.mape, 0.5);
    }

    #[test]
    fn cusum_detects_changepoint_within_five_indices_of_the_shift() {
        let mut observed = Vec::new();
        let mut predicted = Vec::new();
        for _ in 0..20 {
            observed.push(10.0);
            predicted.push(10.0);
        }
        for _ in 0..20 {
            observed.push(10.0);
            predicted.push(5.0);
        }
        let detector = DriftDetector::new();
        let (detected, changepoint, _) = detector.cusum_test(&observed, &predicted);
        assert!(detected);
        let cp = changepoint.unwrap();
        assert!((cp as i64 - 20).abs() <= 5, "changepoint {cp} should be within 5 of index 20");
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        let detector = DriftDetector::new();
        assert!(detector.detect_drift(&[1.0, 2.0], &[1.0]).is_err());
    }
}
