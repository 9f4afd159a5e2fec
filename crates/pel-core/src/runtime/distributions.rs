//! Distribution sampling and closed-form means (spec §4.6). Sampling goes
//! through `statrs`, exactly as the teacher's Monte Carlo module samples
//! Normal/LogNormal/Triangular/Uniform; Beta and PERT extend that pattern
//! (PERT is a reparameterized, rescaled Beta).

use crate::ast::DistKind;
use rand::Rng;
use rand_pcg::Pcg64Mcg;
use statrs::distribution::{Beta, Continuous, LogNormal, Normal, Triangular, Uniform};

#[derive(Debug, thiserror::Error)]
#[error("invalid distribution parameters: {0}")]
pub struct DistributionError(pub String);

/// Draw one sample from `kind` given its positional parameters, in the
/// order the parser accepts them (spec §4.2):
/// `Normal(mean, std_dev)`, `LogNormal(mu, sigma)`, `Beta(alpha, beta)`,
/// `Triangular(min, mode, max)`, `Uniform(min, max)`, `PERT(min, mode, max)`.
pub fn sample(kind: DistKind, params: &[f64], rng: &mut Pcg64Mcg) -> Result<f64, DistributionError> {
    match kind {
        DistKind::Normal => {
            let [mean, std_dev] = two(params)?;
            let d = Normal::new(mean, std_dev).map_err(|e| DistributionError(e.to_string()))?;
            Ok(rng.sample(d))
        }
        DistKind::LogNormal => {
            let [mu, sigma] = two(params)?;
            let d = LogNormal::new(mu, sigma).map_err(|e| DistributionError(e.to_string()))?;
            Ok(rng.sample(d))
        }
        DistKind::Beta => {
            let [alpha, beta] = two(params)?;
            let d = Beta::new(alpha, beta).map_err(|e| DistributionError(e.to_string()))?;
            Ok(rng.sample(d))
        }
        DistKind::Triangular => {
            let [min, mode, max] = three(params)?;
            let d = Triangular::new(min, max, mode).map_err(|e| DistributionError(e.to_string()))?;
            Ok(rng.sample(d))
        }
        DistKind::Uniform => {
            let [min, max] = two(params)?;
            let d = Uniform::new(min, max).map_err(|e| DistributionError(e.to_string()))?;
            Ok(rng.sample(d))
        }
        DistKind::Pert => {
            let [min, mode, max] = three(params)?;
            let (alpha, beta) = pert_shape(min, mode, max)?;
            let d = Beta::new(alpha, beta).map_err(|e| DistributionError(e.to_string()))?;
            let unit_sample = rng.sample(d);
            Ok(min + (max - min) * unit_sample)
        }
    }
}

/// Closed-form distribution mean (spec §4.6), used for sensitivity analysis
/// and as the deterministic-mode value of a `~`-bound parameter.
pub fn mean(kind: DistKind, params: &[f64]) -> Result<f64, DistributionError> {
    match kind {
        DistKind::Normal => Ok(two(params)?[0]),
        DistKind::LogNormal => {
            let [mu, sigma] = two(params)?;
            Ok((mu + sigma * sigma / 2.0).exp())
        }
        DistKind::Beta => {
            let [alpha, beta] = two(params)?;
            Ok(alpha / (alpha + beta))
        }
        DistKind::Triangular => {
            let [min, mode, max] = three(params)?;
            Ok((min + mode + max) / 3.0)
        }
        DistKind::Uniform => {
            let [min, max] = two(params)?;
            Ok((min + max) / 2.0)
        }
        DistKind::Pert => {
            let [min, mode, max] = three(params)?;
            Ok((min + 4.0 * mode + max) / 6.0)
        }
    }
}

fn pert_shape(min: f64, mode: f64, max: f64) -> Result<(f64, f64), DistributionError> {
    if !(min < mode && mode < max) {
        return Err(DistributionError(format!(
            "PERT requires min < mode < max, got ({min}, {mode}, {max})"
        )));
    }
    let span = max - min;
    let alpha = 1.0 + 4.0 * (mode - min) / span;
    let beta = 1.0 + 4.0 * (max - mode) / span;
    Ok((alpha, beta))
}

fn two(params: &[f64]) -> Result<[f64; 2], DistributionError> {
    match params {
        [a, b] => Ok([*a, *b]),
        _ => Err(DistributionError(format!("expected 2 parameters, got {}", params.len()))),
    }
}

fn three(params: &[f64]) -> Result<[f64; 3], DistributionError> {
    match params {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(DistributionError(format!("expected 3 parameters, got {}", params.len()))),
    }
}

/// Log-density, used by the calibrator's MLE fit (spec §4.7).
pub fn log_pdf(kind: DistKind, params: &[f64], x: f64) -> Result<f64, DistributionError> {
    match kind {
        DistKind::Normal => {
            let [mean, std_dev] = two(params)?;
            let d = Normal::new(mean, std_dev).map_err(|e| DistributionError(e.to_string()))?;
            Ok(d.ln_pdf(x))
        }
        DistKind::LogNormal => {
            let [mu, sigma] = two(params)?;
            let d = LogNormal::new(mu, sigma).map_err(|e| DistributionError(e.to_string()))?;
            Ok(d.ln_pdf(x))
        }
        DistKind::Beta => {
            let [alpha, beta] = two(params)?;
            let d = Beta::new(alpha, beta).map_err(|e| DistributionError(e.to_string()))?;
            Ok(d.pdf(x).ln())
        }
        _ => Err(DistributionError(format!("{kind:?} is not calibrated by MLE"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::rng::fork;

    #[test]
    fn uniform_mean_matches_midpoint() {
        assert_eq!(mean(DistKind::Uniform, &[0.03, 0.07]).unwrap(), 0.05);
    }

    #[test]
    fn triangular_mean_matches_formula() {
        let m = mean(DistKind::Triangular, &[0.0, 0.05, 0.10]).unwrap();
        assert!((m - 0.05).abs() < 1e-9);
    }

    #[test]
    fn pert_mean_matches_formula() {
        let m = mean(DistKind::Pert, &[1.0, 4.0, 10.0]).unwrap();
        assert!((m - (1.0 + 16.0 + 10.0) / 6.0).abs() < 1e-9);
    }

    #[test]
    fn beta_mean_matches_alpha_over_sum() {
        let m = mean(DistKind::Beta, &[2.0, 3.0]).unwrap();
        assert!((m - 0.4).abs() < 1e-9);
    }

    #[test]
    fn sampling_is_deterministic_for_a_fixed_seed() {
        let mut a = fork(42, 0);
        let mut b = fork(42, 0);
        let sa = sample(DistKind::Normal, &[0.0, 1.0], &mut a).unwrap();
        let sb = sample(DistKind::Normal, &[0.0, 1.0], &mut b).unwrap();
        assert_eq!(sa, sb);
    }

    #[test]
    fn normal_sample_mean_converges_within_3_sigma_over_sqrt_n() {
        let mut rng = fork(7, 0);
        let n = 20_000;
        let sum: f64 = (0..n).map(|_| sample(DistKind::Normal, &[100.0, 10.0], &mut rng).unwrap()).sum();
        let sample_mean = sum / n as f64;
        let tolerance = 3.0 * 10.0 / (n as f64).sqrt();
        assert!((sample_mean - 100.0).abs() < tolerance, "mean={sample_mean}");
    }
}
