//! Deterministic, Monte Carlo, and sensitivity execution of an emitted IR
//! (spec §4.6). A replication is always single-threaded; "parallel" only
//! ever means "map replications independently, combine by index" (spec §5,
//! §9) — this crate runs them sequentially, which is bitwise identical to
//! any parallel combination by construction.

pub mod constraints;
pub mod distributions;
pub mod eval;
pub mod monte_carlo;
pub mod rng;
pub mod sensitivity;
pub mod value;

use crate::ast::Provenance;
use crate::error::PelResult;
use crate::ir::{Ir, IrNodeKind};
use crate::runtime::eval::{evaluate, EvalContext, EvalMode};
use crate::runtime::monte_carlo::{aggregate_scalar, ReplicationResult, VariableAggregate};
use crate::runtime::sensitivity::SensitivityPoint;
use crate::runtime::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Deterministic,
    MonteCarlo,
    Sensitivity,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub seed: u64,
    pub runs: u64,
    pub timesteps: i64,
    /// Fractional perturbation used by `RunMode::Sensitivity` (e.g. `0.10`
    /// for a ±10% sweep).
    pub sensitivity_pct: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            mode: RunMode::Deterministic,
            seed: 0,
            runs: 1,
            timesteps: 1,
            sensitivity_pct: 0.10,
        }
    }
}

/// The `.results.json` payload (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub model: String,
    pub mode: RunMode,
    pub seed: u64,
    pub timesteps: i64,
    pub status: String,
    pub assumptions: BTreeMap<String, Provenance>,
    pub variables: BTreeMap<String, Value>,
    pub constraint_violations: Vec<constraints::ConstraintViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_runs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs: Option<Vec<ReplicationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<BTreeMap<String, VariableAggregate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Vec<SensitivityPoint>>,
}

/// Every map reaching `.results.json` is a `BTreeMap` (as `ir.rs` does for
/// `Unit::dims`) so the same `(model, seed, N)` always serializes
/// byte-identical JSON regardless of `HashMap`'s randomized iteration order.
fn collect_assumptions(ir: &Ir) -> BTreeMap<String, Provenance> {
    ir.model
        .nodes
        .iter()
        .filter(|n| n.kind == IrNodeKind::Param)
        .filter_map(|n| n.provenance.clone().map(|p| (n.name.clone(), p)))
        .collect()
}

/// Execute `ir` under `config.mode`. Compilation failure is a separate,
/// earlier stage (parse/typecheck/provenance); a simulation failure here
/// still produces a `RunResults` with `status = "failed"` rather than an
/// error, per spec §7.
pub fn run(ir: &Ir, config: &RunConfig) -> PelResult<RunResults> {
    tracing::info!(model = %ir.model.name, mode = ?config.mode, seed = config.seed, "running model");
    let assumptions = collect_assumptions(ir);

    match config.mode {
        RunMode::Deterministic => {
            let mut ctx = EvalContext {
                mode: EvalMode::Deterministic,
                timesteps: config.timesteps,
                rng: None,
                perturbations: HashMap::new(),
            };
            let evaluation = evaluate(ir, &mut ctx)?;
            let status = status_of(&evaluation);
            Ok(RunResults {
                model: ir.model.name.clone(),
                mode: config.mode,
                seed: config.seed,
                timesteps: config.timesteps,
                status,
                assumptions,
                variables: evaluation.scope.into_iter().collect(),
                constraint_violations: evaluation.constraints.violations,
                num_runs: None,
                runs: None,
                aggregates: None,
                sensitivity: None,
            })
        }
        RunMode::MonteCarlo => {
            let runs = monte_carlo::run(ir, config.seed, config.timesteps, config.runs)?;
            let variable_names: Vec<String> = ir
                .model
                .nodes
                .iter()
                .filter(|n| n.kind == IrNodeKind::Var || n.kind == IrNodeKind::Param)
                .map(|n| n.name.clone())
                .collect();
            let aggregates: BTreeMap<String, VariableAggregate> = variable_names
                .iter()
                .filter_map(|name| aggregate_scalar(&runs, name).map(|a| (name.clone(), a)))
                .collect();
            let status = if runs.iter().any(|r| r.status != "success") {
                "failed".to_string()
            } else {
                "success".to_string()
            };
            Ok(RunResults {
                model: ir.model.name.clone(),
                mode: config.mode,
                seed: config.seed,
                timesteps: config.timesteps,
                status,
                assumptions,
                variables: BTreeMap::new(),
                constraint_violations: Vec::new(),
                num_runs: Some(config.runs),
                runs: Some(runs),
                aggregates: Some(aggregates),
                sensitivity: None,
            })
        }
        RunMode::Sensitivity => {
            let points = sensitivity::sweep(ir, config.timesteps, config.sensitivity_pct)?;
            Ok(RunResults {
                model: ir.model.name.clone(),
                mode: config.mode,
                seed: config.seed,
                timesteps: config.timesteps,
                status: "success".to_string(),
                assumptions,
                variables: BTreeMap::new(),
                constraint_violations: Vec::new(),
                num_runs: None,
                runs: None,
                aggregates: None,
                sensitivity: Some(points),
            })
        }
    }
}

fn status_of(evaluation: &eval::Evaluation) -> String {
    if evaluation.aborted_at.is_some() || evaluation.constraints.has_failure() {
        "failed".to_string()
    } else {
        "success".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrEmitter;
    use crate::parser::parse;
    use crate::typeck::TypeChecker;

    fn build_ir(src: &str) -> Ir {
        let model = parse(src).expect("parse");
        let typed = TypeChecker::new().check_model(&model).expect("typecheck");
        IrEmitter::new().emit(&typed)
    }

    #[test]
    fn deterministic_run_reports_success_status() {
        let ir = build_ir(
            r#"
            model M {
                param price: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
            }
        "#,
        );
        let results = run(&ir, &RunConfig { mode: RunMode::Deterministic, ..Default::default() }).unwrap();
        assert_eq!(results.status, "success");
        assert_eq!(results.variables["price"].as_scalar(), Some(10.0));
    }

    #[test]
    fn monte_carlo_run_is_deterministic_for_fixed_seed() {
        let ir = build_ir(
            r#"
            model M {
                param x: Fraction ~ Normal(0, 1) { source:"s", method:"m", confidence:0.9 }
            }
        "#,
        );
        let config = RunConfig { mode: RunMode::MonteCarlo, seed: 42, runs: 1000, timesteps: 1, ..Default::default() };
        let a = run(&ir, &config).unwrap();
        let b = run(&ir, &config).unwrap();
        assert_eq!(a.aggregates.unwrap()["x"].mean, b.aggregates.unwrap()["x"].mean);
    }
}
