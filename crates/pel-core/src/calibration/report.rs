//! Calibration report rendering (spec §4.7, §7): a machine-readable JSON
//! report and a human-readable Markdown report, both derived from the same
//! `CalibrationResult`.

use crate::calibration::{CalibrationResult, CalibrationStatus};
use crate::error::PelResult;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
struct ParamReport {
    distribution: String,
    parameters: HashMap<String, f64>,
    confidence_intervals: HashMap<String, (f64, f64)>,
    aic: f64,
    bic: f64,
    ks_pvalue: f64,
}

#[derive(Debug, Serialize)]
struct DriftReportJson {
    mape: f64,
    rmse: f64,
    cusum_detected: bool,
    cusum_changepoint: Option<usize>,
    drift_threshold_exceeded: bool,
    recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct JsonReport {
    model_name: String,
    timestamp: String,
    succeeded: HashMap<String, ParamReport>,
    failed: HashMap<String, String>,
    drift: HashMap<String, DriftReportJson>,
}

pub fn to_json(result: &CalibrationResult) -> PelResult<String> {
    let mut succeeded = HashMap::new();
    let mut failed = HashMap::new();
    let mut drift = HashMap::new();

    for (name, status) in &result.outcomes {
        match status {
            CalibrationStatus::Fitted(fit) => {
                let parameters = fit.param_names.iter().cloned().zip(fit.params.iter().copied()).map(|(k, v)| (k.to_string(), v)).collect();
                let confidence_intervals = fit
                    .param_names
                    .iter()
                    .cloned()
                    .zip(fit.confidence_intervals.iter().copied())
                    .map(|(k, v)| (k.to_string(), v))
                    .collect();
                succeeded.insert(
                    name.clone(),
                    ParamReport { distribution: format!("{:?}", fit.distribution), parameters, confidence_intervals, aic: fit.aic, bic: fit.bic, ks_pvalue: fit.ks_pvalue },
                );
            }
            CalibrationStatus::Failed(reason) => {
                failed.insert(name.clone(), reason.clone());
            }
        }
        if let Some(report) = result.drift_reports.get(name) {
            drift.insert(
                name.clone(),
                DriftReportJson {
                    mape: report.mape,
                    rmse: report.rmse,
                    cusum_detected: report.cusum_detected,
                    cusum_changepoint: report.cusum_changepoint,
                    drift_threshold_exceeded: report.drift_threshold_exceeded,
                    recommendations: report.recommendations.clone(),
                },
            );
        }
    }

    let payload = JsonReport { model_name: result.model_name.clone(), timestamp: result.timestamp.clone(), succeeded, failed, drift };
    Ok(serde_json::to_string_pretty(&payload)?)
}

pub fn to_markdown(result: &CalibrationResult) -> String {
    let mut lines = vec![format!("# Calibration Report: {}", result.model_name), String::new(), format!("**Generated:** {}", result.timestamp), String::new(), "## Fitted Parameters".to_string(), String::new()];

    for (name, status) in &result.outcomes {
        lines.push(format!("### {name}"));
        lines.push(String::new());
        match status {
            CalibrationStatus::Fitted(fit) => {
                lines.push(format!("**Distribution:** {:?}", fit.distribution));
                lines.push(String::new());
                lines.push("**Fitted parameters:**".to_string());
                for (pname, pvalue) in fit.param_names.iter().zip(&fit.params) {
                    let idx = fit.param_names.iter().position(|n| n == pname).unwrap();
                    let (lo, hi) = fit.confidence_intervals[idx];
                    lines.push(format!("- {pname}: {pvalue:.6} (95% CI: [{lo:.6}, {hi:.6}])"));
                }
                lines.push(String::new());
                lines.push("**Goodness of fit:**".to_string());
                lines.push(format!("- AIC: {:.2}", fit.aic));
                lines.push(format!("- BIC: {:.2}", fit.bic));
                lines.push(format!("- Kolmogorov-Smirnov p-value: {:.4}", fit.ks_pvalue));
            }
            CalibrationStatus::Failed(reason) => {
                lines.push(format!("**Failed:** {reason}"));
            }
        }
        lines.push(String::new());

        if let Some(report) = result.drift_reports.get(name) {
            lines.push("**Drift detection:**".to_string());
            lines.push(format!("- MAPE: {:.2}%", report.mape * 100.0));
            lines.push(format!("- RMSE: {:.4}", report.rmse));
            lines.push(format!("- CUSUM: {}", if report.cusum_detected { "detected" } else { "not detected" }));
            if let Some(cp) = report.cusum_changepoint {
                lines.push(format!("- Changepoint: observation {cp}"));
            }
            for rec in &report.recommendations {
                lines.push(format!("- {rec}"));
            }
            lines.push(String::new());
        }
    }

    let succeeded = result.outcomes.iter().filter(|(_, s)| matches!(s, CalibrationStatus::Fitted(_))).count();
    let failed = result.outcomes.len() - succeeded;
    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push(format!("{succeeded} parameter(s) calibrated, {failed} failed."));

    lines.join("\n")
}
