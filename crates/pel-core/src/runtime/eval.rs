//! Deterministic staged evaluator (spec §4.6): topological evaluation order
//! over the *instantaneous* (same-`t`) dependency graph, a time loop for
//! series variables, and constraint checking with severity-based abort.

use crate::ast::{BinOp, DistKind, Expr, Provenance, Severity, UnOp};
use crate::error::{Diagnostic, ErrorCode, PelResult, Span};
use crate::ir::{Ir, IrNode, IrNodeKind};
use crate::runtime::constraints::ConstraintLog;
use crate::runtime::distributions;
use crate::runtime::value::Value;
use crate::units::{BaseKind, Unit};
use rand_pcg::Pcg64Mcg;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Deterministic,
    MonteCarlo,
    Sensitivity,
}

/// Per-run knobs threaded through evaluation without any global state.
pub struct EvalContext<'a> {
    pub mode: EvalMode,
    pub timesteps: i64,
    pub rng: Option<&'a mut Pcg64Mcg>,
    /// Multiplicative perturbation applied to a named param's sampled/mean
    /// value, used by sensitivity sweeps (spec §4.6).
    pub perturbations: HashMap<String, f64>,
}

pub struct Evaluation {
    pub scope: HashMap<String, Value>,
    pub constraints: ConstraintLog,
    pub aborted_at: Option<i64>,
}

struct ParamSpec {
    name: String,
    value_expr: Expr,
    unit: Unit,
    #[allow(dead_code)]
    provenance: Provenance,
}

struct VarSpec {
    name: String,
    unit: Unit,
    value_expr: Option<Expr>,
    recurrence: Option<Expr>,
}

struct ConstraintSpec {
    name: String,
    condition: Expr,
    severity: Severity,
    message: String,
}

enum Node {
    Param(ParamSpec),
    Var(VarSpec),
}

/// Merge every `var` IR node sharing a name into one spec (the parser emits
/// one node per `var name[...] = ...` line; the IR carries them flat).
fn merge_var_specs(nodes: &[IrNode]) -> Vec<VarSpec> {
    let mut order = Vec::new();
    let mut by_name: HashMap<String, VarSpec> = HashMap::new();
    for node in nodes {
        if node.kind != IrNodeKind::Var {
            continue;
        }
        let entry = by_name.entry(node.name.clone()).or_insert_with(|| {
            order.push(node.name.clone());
            VarSpec {
                name: node.name.clone(),
                unit: node.unit.clone(),
                value_expr: None,
                recurrence: None,
            }
        });
        if node.value_expr.is_some() {
            entry.value_expr = node.value_expr.clone();
        }
        if node.recurrence.is_some() {
            entry.recurrence = node.recurrence.clone();
        }
    }
    order
        .into_iter()
        .map(|name| by_name.remove(&name).unwrap())
        .collect()
}

fn is_timeseries(unit: &Unit) -> bool {
    matches!(unit.base, BaseKind::TimeSeries(_))
}

fn references_name(expr: &Expr, target: &str) -> bool {
    match expr {
        Expr::Variable { name, .. } => name == target,
        Expr::NumberLit { .. } | Expr::StringLit { .. } | Expr::BoolLit { .. } => false,
        Expr::Index { series, index, .. } => references_name(series, target) || references_name(index, target),
        Expr::Binary { lhs, rhs, .. } => references_name(lhs, target) || references_name(rhs, target),
        Expr::Unary { operand, .. } => references_name(operand, target),
        Expr::Call { args, .. } | Expr::Distribution { args, .. } => args.iter().any(|a| references_name(a, target)),
        Expr::If { cond, then_branch, else_branch, .. } => {
            references_name(cond, target) || references_name(then_branch, target) || references_name(else_branch, target)
        }
    }
}

/// Collect the names this expression depends on *at the same timestep*,
/// i.e. every bare `Variable` reference and every `series[t]` index whose
/// index is exactly the loop variable `t` (spec §4.6, §9). A `series[t-1]`
/// lag reference is resolved by the time loop, not the topological pass.
fn instantaneous_deps(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Variable { name, .. } => {
            if name != "t" {
                out.insert(name.clone());
            }
        }
        Expr::NumberLit { .. } | Expr::StringLit { .. } | Expr::BoolLit { .. } => {}
        Expr::Index { series, index, .. } => {
            let same_t = matches!(index.as_ref(), Expr::Variable { name, .. } if name == "t");
            if same_t {
                if let Expr::Variable { name, .. } = series.as_ref() {
                    out.insert(name.clone());
                }
            }
            instantaneous_deps(index, out);
        }
        Expr::Binary { lhs, rhs, .. } => {
            instantaneous_deps(lhs, out);
            instantaneous_deps(rhs, out);
        }
        Expr::Unary { operand, .. } => instantaneous_deps(operand, out),
        Expr::Call { args, .. } | Expr::Distribution { args, .. } => {
            for a in args {
                instantaneous_deps(a, out);
            }
        }
        Expr::If { cond, then_branch, else_branch, .. } => {
            instantaneous_deps(cond, out);
            instantaneous_deps(then_branch, out);
            instantaneous_deps(else_branch, out);
        }
    }
}

/// Kahn's algorithm over the instantaneous dependency graph; a remaining
/// edge once the queue drains indicates a cycle (spec §4.6 `E0500`).
fn topo_order(names: &[String], deps: &HashMap<String, HashSet<String>>) -> Result<Vec<String>, ()> {
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in names {
        for dep in deps.get(name).into_iter().flatten() {
            if in_degree.contains_key(dep.as_str()) {
                *in_degree.get_mut(name.as_str()).unwrap() += 1;
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }
    }

    let mut queue: Vec<&str> = names
        .iter()
        .map(|n| n.as_str())
        .filter(|n| in_degree[n] == 0)
        .collect();
    let mut order = Vec::new();
    while let Some(n) = queue.pop() {
        order.push(n.to_string());
        if let Some(deps) = dependents.get(n) {
            for &d in deps {
                let e = in_degree.get_mut(d).unwrap();
                *e -= 1;
                if *e == 0 {
                    queue.push(d);
                }
            }
        }
    }

    if order.len() == names.len() {
        Ok(order)
    } else {
        Err(())
    }
}

pub fn evaluate(ir: &Ir, ctx: &mut EvalContext) -> PelResult<Evaluation> {
    let mut params = Vec::new();
    let mut constraints = Vec::new();
    for node in &ir.model.nodes {
        match node.kind {
            IrNodeKind::Param => {
                if let Some(value_expr) = node.value_expr.clone() {
                    params.push(ParamSpec {
                        name: node.name.clone(),
                        value_expr,
                        unit: node.unit.clone(),
                        provenance: node.provenance.clone().unwrap_or(Provenance {
                            source: String::new(),
                            method: String::new(),
                            confidence: 0.0,
                            correlated_with: Vec::new(),
                            calibration_timestamp: None,
                            aic: None,
                            bic: None,
                        }),
                    });
                }
            }
            IrNodeKind::Constraint => constraints.push(ConstraintSpec {
                name: node.name.clone(),
                condition: node.condition.clone().unwrap_or(Expr::BoolLit { value: true, span: Span::default() }),
                severity: node.severity.unwrap_or(Severity::Warning),
                message: node.message.clone().unwrap_or_default(),
            }),
            _ => {}
        }
    }
    let var_specs = merge_var_specs(&ir.model.nodes);

    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
    let mut names = Vec::new();
    for p in &params {
        let mut d = HashSet::new();
        instantaneous_deps(&p.value_expr, &mut d);
        names.push(p.name.clone());
        deps.insert(p.name.clone(), d);
    }
    for v in &var_specs {
        let mut d = HashSet::new();
        if let Some(e) = &v.value_expr {
            instantaneous_deps(e, &mut d);
        }
        if let Some(e) = &v.recurrence {
            instantaneous_deps(e, &mut d);
        }
        names.push(v.name.clone());
        deps.insert(v.name.clone(), d);
    }

    let order = topo_order(&names, &deps).map_err(|_| {
        crate::error::PelError::single(Diagnostic::new(
            ErrorCode::E0500,
            "cyclic dependency among same-timestep references",
        ))
    })?;

    let mut nodes_by_name: HashMap<String, Node> = HashMap::new();
    for p in params {
        nodes_by_name.insert(p.name.clone(), Node::Param(p));
    }
    for v in var_specs {
        nodes_by_name.insert(v.name.clone(), Node::Var(v));
    }

    let mut scope: HashMap<String, Value> = HashMap::new();
    let mut constraint_log = ConstraintLog::new();
    let mut aborted_at = None;

    'eval: for name in &order {
        match nodes_by_name.get(name) {
            Some(Node::Param(p)) => {
                let v = eval_expr(&p.value_expr, &scope, None, ctx)?;
                scope.insert(name.clone(), Value::Scalar { value: v, unit: p.unit.clone() });
            }
            Some(Node::Var(v)) => {
                if is_timeseries(&v.unit) {
                    let inner_unit = series_inner_unit(&v.unit);
                    let timesteps = ctx.timesteps.max(1);
                    let mut values = vec![0.0; timesteps as usize];
                    if let Some(base) = &v.value_expr {
                        values[0] = eval_expr(base, &scope, Some(0), ctx)?;
                    }
                    scope.insert(name.clone(), Value::Series { values, unit: inner_unit });
                    if let Some(rec) = &v.recurrence {
                        for t in 1..timesteps {
                            let val = eval_expr(rec, &scope, Some(t), ctx)?;
                            if let Some(Value::Series { values, .. }) = scope.get_mut(name) {
                                values[t as usize] = val;
                            }
                        }
                    }
                } else if let Some(expr) = &v.value_expr {
                    let val = eval_expr(expr, &scope, None, ctx)?;
                    scope.insert(name.clone(), Value::Scalar { value: val, unit: v.unit.clone() });
                }
            }
            None => {}
        }
    }

    for c in &constraints {
        let time_dependent = references_name(&c.condition, "t");
        let ts = if time_dependent { ctx.timesteps.max(1) } else { 1 };
        for t in 0..ts {
            let t_arg = if time_dependent { Some(t) } else { None };
            let ok = eval_expr(&c.condition, &scope, t_arg, ctx)? != 0.0;
            if !ok {
                constraint_log.record(&c.name, c.severity, &c.message, t_arg);
                if c.severity == Severity::Fatal {
                    aborted_at = Some(t_arg.unwrap_or(0));
                    break 'eval;
                }
            }
        }
    }

    Ok(Evaluation { scope, constraints: constraint_log, aborted_at })
}

fn series_inner_unit(ty: &Unit) -> Unit {
    match &ty.base {
        BaseKind::TimeSeries(inner) => (**inner).clone(),
        _ => ty.clone(),
    }
}

fn eval_expr(expr: &Expr, scope: &HashMap<String, Value>, t: Option<i64>, ctx: &mut EvalContext) -> PelResult<f64> {
    match expr {
        Expr::NumberLit { value, .. } => Ok(*value),
        Expr::BoolLit { value, .. } => Ok(if *value { 1.0 } else { 0.0 }),
        Expr::StringLit { .. } => Ok(0.0),
        Expr::Variable { name, span } => {
            if name == "t" {
                return Ok(t.unwrap_or(0) as f64);
            }
            let mut v = match scope.get(name) {
                Some(Value::Scalar { value, .. }) => *value,
                Some(Value::Series { values, .. }) => {
                    let idx = t.unwrap_or(0).clamp(0, values.len() as i64 - 1) as usize;
                    values[idx]
                }
                _ => {
                    return Err(crate::error::PelError::single(
                        Diagnostic::new(ErrorCode::E0402, format!("undefined variable '{name}' at runtime")).at(*span),
                    ))
                }
            };
            if let Some(factor) = ctx.perturbations.get(name) {
                v *= factor;
            }
            Ok(v)
        }
        Expr::Index { series, index, span } => {
            let idx = eval_expr(index, scope, t, ctx)?.round() as i64;
            let name = match series.as_ref() {
                Expr::Variable { name, .. } => name.clone(),
                _ => {
                    return Err(crate::error::PelError::single(
                        Diagnostic::new(ErrorCode::E0404, "index target must be a named series").at(*span),
                    ))
                }
            };
            match scope.get(&name) {
                Some(Value::Series { values, .. }) => {
                    if idx >= ctx.timesteps {
                        return Err(crate::error::PelError::single(
                            Diagnostic::new(
                                ErrorCode::E0501,
                                format!("index {idx} out of bounds [0, {})", ctx.timesteps),
                            )
                            .at(*span),
                        ));
                    }
                    let clamped = idx.max(0) as usize;
                    Ok(values.get(clamped).copied().unwrap_or(0.0))
                }
                Some(Value::Scalar { value, .. }) => Ok(*value),
                _ => Err(crate::error::PelError::single(
                    Diagnostic::new(ErrorCode::E0404, format!("'{name}' is not indexable")).at(*span),
                )),
            }
        }
        Expr::Unary { op, operand, .. } => {
            let v = eval_expr(operand, scope, t, ctx)?;
            Ok(match op {
                UnOp::Neg => -v,
                UnOp::Not => {
                    if v == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            })
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = eval_expr(lhs, scope, t, ctx)?;
            let r = eval_expr(rhs, scope, t, ctx)?;
            Ok(apply_binop(*op, l, r))
        }
        Expr::If { cond, then_branch, else_branch, .. } => {
            if eval_expr(cond, scope, t, ctx)? != 0.0 {
                eval_expr(then_branch, scope, t, ctx)
            } else {
                eval_expr(else_branch, scope, t, ctx)
            }
        }
        Expr::Call { func, args, span } => eval_builtin_call(func, args, scope, t, ctx, *span),
        Expr::Distribution { kind, args, span } => eval_distribution(*kind, args, scope, t, ctx, *span),
    }
}

fn apply_binop(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Pow => l.powf(r),
        BinOp::Eq => bool_f(l == r),
        BinOp::NotEq => bool_f(l != r),
        BinOp::Lt => bool_f(l < r),
        BinOp::Lte => bool_f(l <= r),
        BinOp::Gt => bool_f(l > r),
        BinOp::Gte => bool_f(l >= r),
        BinOp::And => bool_f(l != 0.0 && r != 0.0),
        BinOp::Or => bool_f(l != 0.0 || r != 0.0),
    }
}

fn bool_f(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn eval_builtin_call(
    func: &str,
    args: &[Expr],
    scope: &HashMap<String, Value>,
    t: Option<i64>,
    ctx: &mut EvalContext,
    span: Span,
) -> PelResult<f64> {
    let vals: Vec<f64> = args
        .iter()
        .map(|a| eval_expr(a, scope, t, ctx))
        .collect::<PelResult<Vec<_>>>()?;
    match func {
        "min" => Ok(vals.into_iter().fold(f64::INFINITY, f64::min)),
        "max" => Ok(vals.into_iter().fold(f64::NEG_INFINITY, f64::max)),
        "abs" => Ok(vals.first().copied().unwrap_or(0.0).abs()),
        "sqrt" => Ok(vals.first().copied().unwrap_or(0.0).sqrt()),
        "round" => Ok(vals.first().copied().unwrap_or(0.0).round()),
        "floor" => Ok(vals.first().copied().unwrap_or(0.0).floor()),
        "ceil" => Ok(vals.first().copied().unwrap_or(0.0).ceil()),
        "sum" => Ok(vals.iter().sum::<f64>()),
        "mean" => Ok(vals.iter().sum::<f64>() / vals.len().max(1) as f64),
        other => Err(crate::error::PelError::single(
            Diagnostic::new(ErrorCode::E0402, format!("call to undefined function '{other}'")).at(span),
        )),
    }
}

fn eval_distribution(
    kind: DistKind,
    args: &[Expr],
    scope: &HashMap<String, Value>,
    t: Option<i64>,
    ctx: &mut EvalContext,
    span: Span,
) -> PelResult<f64> {
    let params: Vec<f64> = args
        .iter()
        .map(|a| eval_expr(a, scope, t, ctx))
        .collect::<PelResult<Vec<_>>>()?;
    match ctx.mode {
        EvalMode::MonteCarlo => {
            let rng = ctx
                .rng
                .as_deref_mut()
                .ok_or_else(|| crate::error::PelError::Runtime("monte carlo mode requires an RNG".to_string()))?;
            distributions::sample(kind, &params, rng)
                .map_err(|e| crate::error::PelError::single(Diagnostic::new(ErrorCode::E0001, e.0).at(span)))
        }
        EvalMode::Deterministic | EvalMode::Sensitivity => distributions::mean(kind, &params)
            .map_err(|e| crate::error::PelError::single(Diagnostic::new(ErrorCode::E0001, e.0).at(span))),
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

    fn ctx(mode: EvalMode, timesteps: i64) -> EvalContext<'static> {
        EvalContext { mode, timesteps, rng: None, perturbations: HashMap::new() }
    }

    #[test]
    fn deterministic_revenue_equals_price_times_units() {
        let ir = build_ir(
            r#"
            model M {
                param price: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
                param units: Count = 5 { source:"s", method:"m", confidence:0.9 }
                var revenue: Currency<USD> = price * units
            }
        "#,
        );
        let mut c = ctx(EvalMode::Deterministic, 1);
        let eval = evaluate(&ir, &mut c).unwrap();
        assert_eq!(eval.scope["revenue"].as_scalar(), Some(50.0));
    }

    #[test]
    fn time_indexed_recurrence_compounds() {
        let ir = build_ir(
            r#"
            model M {
                var mrr: TimeSeries<Currency<USD>>
                var mrr[0] = 1000 USD
                var mrr[t] = mrr[t-1] * 1.10
            }
        "#,
        );
        let mut c = ctx(EvalMode::Deterministic, 3);
        let eval = evaluate(&ir, &mut c).unwrap();
        match &eval.scope["mrr"] {
            Value::Series { values, .. } => {
                assert_eq!(values[0], 1000.0);
                assert!((values[1] - 1100.0).abs() < 1e-9);
                assert!((values[2] - 1210.0).abs() < 1e-9);
            }
            other => panic!("expected series, got {other:?}"),
        }
    }

    #[test]
    fn cyclic_same_t_dependency_is_e0500() {
        let ir = build_ir(
            r#"
            model M {
                var a: Currency<USD> = b
                var b: Currency<USD> = a
            }
        "#,
        );
        let mut c = ctx(EvalMode::Deterministic, 1);
        let err = evaluate(&ir, &mut c).unwrap_err();
        assert_eq!(err.first_code(), Some(ErrorCode::E0500));
    }

    #[test]
    fn fatal_constraint_aborts_without_failing_whole_run() {
        let ir = build_ir(
            r#"
            model M {
                param cash: Currency<USD> = -10 USD { source:"s", method:"m", confidence:0.9 }
                constraint solvent: cash >= 0 USD { severity: fatal, message: "out of cash" }
            }
        "#,
        );
        let mut c = ctx(EvalMode::Deterministic, 1);
        let eval = evaluate(&ir, &mut c).unwrap();
        assert!(eval.constraints.has_fatal());
        assert!(eval.aborted_at.is_some());
    }

    #[test]
    fn non_fatal_constraint_does_not_change_variables_output() {
        let with_constraint = build_ir(
            r#"
            model M {
                param cash: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
                constraint warn: cash >= 100 USD { severity: warning, message: "low" }
            }
        "#,
        );
        let without_constraint = build_ir(
            r#"
            model M {
                param cash: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
            }
        "#,
        );
        let mut c1 = ctx(EvalMode::Deterministic, 1);
        let mut c2 = ctx(EvalMode::Deterministic, 1);
        let a = evaluate(&with_constraint, &mut c1).unwrap();
        let b = evaluate(&without_constraint, &mut c2).unwrap();
        assert_eq!(a.scope["cash"].as_scalar(), b.scope["cash"].as_scalar());
    }
}
