//! Statistical calibration (spec §4.7): fit distributions to observed data,
//! rewrite a deep copy of the IR with the fitted parameters, and optionally
//! check drift against a paired prediction column. A calibration run never
//! aborts on one parameter's failure — every other requested parameter still
//! gets a chance to fit, and both outcomes land in the same report.

pub mod csv_connector;
pub mod drift;
pub mod fit;
pub mod report;

use crate::ast::{DistKind, Expr, Provenance};
use crate::error::{PelResult, Span};
use crate::ir::{Ir, IrNodeKind};
use csv_connector::{CsvTable, MissingValuePolicy, OutlierMethod};
use drift::{DriftDetector, DriftReport};
use fit::FitResult;
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParamCalibrationConfig {
    pub data_column: String,
    pub distribution: DistKind,
    #[serde(default = "default_missing_value_policy")]
    pub missing_value_policy: MissingValuePolicy,
    #[serde(default)]
    pub outlier_filter: Option<(OutlierMethod, f64)>,
    #[serde(default)]
    pub use_bootstrap: bool,
    #[serde(default = "default_bootstrap_samples")]
    pub bootstrap_samples: u64,
    #[serde(default)]
    pub bootstrap_seed: u64,
    #[serde(default)]
    pub predicted_column: Option<String>,
}

fn default_missing_value_policy() -> MissingValuePolicy {
    MissingValuePolicy::Drop
}

fn default_bootstrap_samples() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CalibrationConfig {
    pub parameters: HashMap<String, ParamCalibrationConfig>,
}

#[derive(Debug, Clone)]
pub enum CalibrationStatus {
    Fitted(FitResult),
    Failed(String),
}

pub struct CalibrationResult {
    pub model_name: String,
    pub timestamp: String,
    pub outcomes: Vec<(String, CalibrationStatus)>,
    pub drift_reports: HashMap<String, DriftReport>,
    pub updated_ir: Ir,
}

/// Run the full calibration pipeline against `ir`, producing a deep copy of
/// the IR with every successfully-fitted param's `value_expr`/`provenance`
/// replaced.
pub fn calibrate(ir: &Ir, table: &CsvTable, config: &CalibrationConfig, now: &str) -> PelResult<CalibrationResult> {
    tracing::info!(model = %ir.model.name, params = config.parameters.len(), rows = table.row_count, "calibrating model");
    let mut updated_ir = ir.clone();
    let mut outcomes = Vec::new();
    let mut drift_reports = HashMap::new();

    for (param_name, param_config) in &config.parameters {
        match calibrate_one(table, param_config) {
            Ok(fit_result) => {
                tracing::debug!(param = %param_name, "fit succeeded");
                apply_fit_to_node(&mut updated_ir, param_name, &fit_result, now);

                if let Some(predicted_column) = &param_config.predicted_column {
                    match run_drift(table, &param_config.data_column, predicted_column, param_config.missing_value_policy) {
                        Ok(report) => {
                            drift_reports.insert(param_name.clone(), report);
                        }
                        Err(e) => {
                            outcomes.push((format!("{param_name}.drift"), CalibrationStatus::Failed(e.to_string())));
                        }
                    }
                }

                outcomes.push((param_name.clone(), CalibrationStatus::Fitted(fit_result)));
            }
            Err(e) => {
                tracing::warn!(param = %param_name, error = %e, "fit failed");
                outcomes.push((param_name.clone(), CalibrationStatus::Failed(e.to_string())));
            }
        }
    }

    Ok(CalibrationResult { model_name: ir.model.name.clone(), timestamp: now.to_string(), outcomes, drift_reports, updated_ir })
}

fn calibrate_one(table: &CsvTable, config: &ParamCalibrationConfig) -> PelResult<FitResult> {
    let mut data = csv_connector::extract_column(table, &config.data_column, config.missing_value_policy)?;
    if let Some((method, threshold)) = config.outlier_filter {
        data = csv_connector::filter_outliers(&data, method, threshold);
    }

    if config.use_bootstrap {
        fit::fit_with_bootstrap(&data, config.distribution, config.bootstrap_samples, config.bootstrap_seed)
    } else {
        fit::fit(&data, config.distribution)
    }
}

fn run_drift(table: &CsvTable, observed_column: &str, predicted_column: &str, policy: MissingValuePolicy) -> PelResult<DriftReport> {
    let observed = csv_connector::extract_column(table, observed_column, policy)?;
    let predicted = csv_connector::extract_column(table, predicted_column, policy)?;
    let n = observed.len().min(predicted.len());
    DriftDetector::new().detect_drift(&observed[..n], &predicted[..n])
}

/// Rewrite the named `Param` node's `value_expr` to a distribution
/// expression carrying the fitted parameters, and its provenance to the
/// calibrated-source shape (spec §4.7 step 4).
fn apply_fit_to_node(ir: &mut Ir, param_name: &str, fit_result: &FitResult, now: &str) {
    let Some(node) = ir.model.nodes.iter_mut().find(|n| n.kind == IrNodeKind::Param && n.name == param_name) else {
        return;
    };

    let args = fit_result.params.iter().map(|v| Expr::NumberLit { value: *v, unit_suffix: None, span: Span::default() }).collect();
    node.value_expr = Some(Expr::Distribution { kind: fit_result.distribution, args, span: Span::default() });

    node.provenance = Some(Provenance {
        source: "calibrated".to_string(),
        method: "mle".to_string(),
        confidence: (1.0 - fit_result.ks_pvalue).clamp(0.0, 1.0),
        correlated_with: node.provenance.as_ref().map(|p| p.correlated_with.clone()).unwrap_or_default(),
        calibration_timestamp: Some(now.to_string()),
        aic: Some(fit_result.aic),
        bic: Some(fit_result.bic),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrEmitter;
    use crate::parser::parse;
    use crate::typeck::TypeChecker;
    use std::collections::HashMap;
    use std::io::Write;

    fn build_ir(src: &str) -> Ir {
        let model = parse(src).expect("parse");
        let typed = TypeChecker::new().check_model(&model).expect("typecheck");
        IrEmitter::new().emit(&typed)
    }

    fn write_csv(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("pel_calib_mod_test_{}_{}.csv", std::process::id(), contents.len()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn calibration_rewrites_value_expr_and_provenance() {
        let ir = build_ir(
            r#"
            model M {
                param churn: Fraction ~ Normal(0.1, 0.02) { source:"guess", method:"expert", confidence:0.5 }
            }
        "#,
        );
        let path = write_csv("churn\n0.09\n0.11\n0.10\n0.095\n0.105\n0.10\n0.098\n0.102\n");
        let table = csv_connector::load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut parameters = HashMap::new();
        parameters.insert(
            "churn".to_string(),
            ParamCalibrationConfig {
                data_column: "churn".to_string(),
                distribution: DistKind::Normal,
                missing_value_policy: MissingValuePolicy::Drop,
                outlier_filter: None,
                use_bootstrap: false,
                bootstrap_samples: 0,
                bootstrap_seed: 0,
                predicted_column: None,
            },
        );
        let config = CalibrationConfig { parameters };

        let result = calibrate(&ir, &table, &config, "2026-07-28T00:00:00Z").unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert!(matches!(result.outcomes[0].1, CalibrationStatus::Fitted(_)));

        let node = result.updated_ir.model.nodes.iter().find(|n| n.name == "churn").unwrap();
        assert!(matches!(node.value_expr, Some(Expr::Distribution { .. })));
        assert_eq!(node.provenance.as_ref().unwrap().source, "calibrated");
    }

    #[test]
    fn a_failing_param_does_not_block_other_params() {
        let ir = build_ir(
            r#"
            model M {
                param a: Fraction ~ Normal(0.1, 0.02) { source:"s", method:"m", confidence:0.5 }
                param b: Fraction ~ Beta(2, 8) { source:"s", method:"m", confidence:0.5 }
            }
        "#,
        );
        let path = write_csv("a,b\n0.09,0.2\n0.11,1.5\n0.10,0.25\n");
        let table = csv_connector::load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut parameters = HashMap::new();
        parameters.insert(
            "a".to_string(),
            ParamCalibrationConfig {
                data_column: "a".to_string(),
                distribution: DistKind::Normal,
                missing_value_policy: MissingValuePolicy::Drop,
                outlier_filter: None,
                use_bootstrap: false,
                bootstrap_samples: 0,
                bootstrap_seed: 0,
                predicted_column: None,
            },
        );
        parameters.insert(
            "b".to_string(),
            ParamCalibrationConfig {
                data_column: "b".to_string(),
                distribution: DistKind::Beta,
                missing_value_policy: MissingValuePolicy::Drop,
                outlier_filter: None,
                use_bootstrap: false,
                bootstrap_samples: 0,
                bootstrap_seed: 0,
                predicted_column: None,
            },
        );
        let config = CalibrationConfig { parameters };

        let result = calibrate(&ir, &table, &config, "2026-07-28T00:00:00Z").unwrap();
        let statuses: HashMap<_, _> = result.outcomes.iter().cloned().collect();
        assert!(matches!(statuses["a"], CalibrationStatus::Fitted(_)));
        assert!(matches!(statuses["b"], CalibrationStatus::Failed(_)));
    }
}
