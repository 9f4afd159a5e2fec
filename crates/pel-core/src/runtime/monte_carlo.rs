//! Monte Carlo replication driver (spec §4.6, §5, §8). Each replication is
//! evaluated independently from a forked RNG stream; results are combined by
//! replication index so the aggregate is bitwise identical whether
//! replications are produced serially or (conceptually) in parallel.

use crate::error::PelResult;
use crate::ir::Ir;
use crate::runtime::eval::{evaluate, EvalContext, EvalMode};
use crate::runtime::rng;
use crate::runtime::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationResult {
    pub index: u64,
    pub variables: BTreeMap<String, Value>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableAggregate {
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

/// Run `num_runs` independent replications of `ir`, seeded from `run_seed`,
/// and return them ordered by replication index (spec §8 Monte Carlo
/// determinism property: sorted per-replication output is order-invariant).
pub fn run(ir: &Ir, run_seed: u64, timesteps: i64, num_runs: u64) -> PelResult<Vec<ReplicationResult>> {
    let mut runs = Vec::with_capacity(num_runs as usize);
    for index in 0..num_runs {
        let mut replication_rng = rng::fork(run_seed, index);
        let mut ctx = EvalContext {
            mode: EvalMode::MonteCarlo,
            timesteps,
            rng: Some(&mut replication_rng),
            perturbations: HashMap::new(),
        };
        let evaluation = evaluate(ir, &mut ctx)?;
        let status = if evaluation.aborted_at.is_some() || evaluation.constraints.has_failure() {
            "failed"
        } else {
            "success"
        };
        runs.push(ReplicationResult {
            index,
            variables: evaluation.scope.into_iter().collect(),
            status: status.to_string(),
        });
    }
    Ok(runs)
}

/// Aggregate one scalar-valued variable's samples across replications into
/// mean/std-dev/percentile summary statistics.
pub fn aggregate_scalar(runs: &[ReplicationResult], name: &str) -> Option<VariableAggregate> {
    let mut samples: Vec<f64> = runs
        .iter()
        .filter_map(|r| r.variables.get(name))
        .filter_map(Value::as_scalar)
        .collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(VariableAggregate {
        mean,
        std_dev: variance.sqrt(),
        p5: percentile(&samples, 5.0),
        p50: percentile(&samples, 50.0),
        p95: percentile(&samples, 95.0),
    })
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
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
    fn same_seed_produces_identical_aggregate_regardless_of_order() {
        let ir = build_ir(
            r#"
            model M {
                param churn: Fraction ~ Beta(2, 8) { source:"survey", method:"mle", confidence:0.8 }
            }
        "#,
        );
        let a = run(&ir, 42, 1, 1000).unwrap();
        let b = run(&ir, 42, 1, 1000).unwrap();
        let agg_a = aggregate_scalar(&a, "churn").unwrap();
        let agg_b = aggregate_scalar(&b, "churn").unwrap();
        assert_eq!(agg_a.mean, agg_b.mean);
        assert_eq!(agg_a.p50, agg_b.p50);
    }

    #[test]
    fn distinct_replications_are_independent_samples() {
        let ir = build_ir(
            r#"
            model M {
                param x: Fraction ~ Normal(0, 1) { source:"s", method:"m", confidence:0.9 }
            }
        "#,
        );
        let runs = run(&ir, 7, 1, 50).unwrap();
        let values: Vec<f64> = runs.iter().filter_map(|r| r.variables.get("x")).filter_map(Value::as_scalar).collect();
        let all_same = values.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "expected independent samples across replications");
    }
}
