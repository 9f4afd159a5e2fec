//! Bidirectional dimensional type checker (spec §4.3). `infer` computes a
//! `Unit` for an expression; `check` verifies an expression against an
//! expected `Unit`. Errors are collected across the whole model rather than
//! aborting at the first mismatch, mirroring the provenance and parser
//! passes' batch-diagnostic style.

use crate::ast::*;
use crate::error::{Diagnostic, ErrorCode, Span};
use crate::units::{BaseKind, Unit};
use std::collections::HashMap;

pub struct TypeChecker {
    scope: HashMap<String, Unit>,
    diagnostics: Vec<Diagnostic>,
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker {
            scope: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn check_model(mut self, model: &Model) -> Result<TypedModel, Vec<Diagnostic>> {
        // First pass: register every declared name's annotated type so
        // forward references between params/vars type-check.
        for decl in &model.decls {
            if let Some((name, ty)) = declared_name_and_type(decl) {
                self.scope.insert(name, ty);
            }
        }

        let mut decls = Vec::new();
        for decl in &model.decls {
            if let Some(typed) = self.check_decl(decl) {
                decls.push(typed);
            }
        }

        if self.diagnostics.is_empty() {
            Ok(TypedModel {
                name: model.name.clone(),
                decls,
            })
        } else {
            Err(self.diagnostics)
        }
    }

    fn error(&mut self, code: ErrorCode, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(code, message).at(span));
    }

    fn check_decl(&mut self, decl: &Decl) -> Option<TypedDecl> {
        match decl {
            Decl::Param(p) => {
                let declared = resolve_type_annotation(&p.ty);
                let inferred = self.infer(&p.value_expr)?;
                if !units_compatible(&declared, &inferred) {
                    self.error(
                        ErrorCode::E0403,
                        p.span,
                        format!(
                            "param '{}' declared as {declared} but value has type {inferred}",
                            p.name
                        ),
                    );
                    return None;
                }
                Some(TypedDecl {
                    decl: decl.clone(),
                    ty: declared,
                })
            }
            Decl::Var(v) => {
                let declared = resolve_type_annotation(&v.ty);
                if let Some(expr) = &v.value_expr {
                    let inferred = self.infer(expr)?;
                    let base = series_element(&declared).unwrap_or_else(|| declared.clone());
                    if !units_compatible(&base, &inferred) {
                        self.error(
                            ErrorCode::E0403,
                            v.span,
                            format!(
                                "var '{}' declared as {declared} but value has type {inferred}",
                                v.name
                            ),
                        );
                        return None;
                    }
                }
                if let Some(expr) = &v.recurrence {
                    let base = series_element(&declared).unwrap_or_else(|| declared.clone());
                    let inferred = self.infer(expr)?;
                    if !units_compatible(&base, &inferred) {
                        self.error(
                            ErrorCode::E0403,
                            v.span,
                            format!(
                                "recurrence for '{}' has type {inferred}, expected {base}",
                                v.name
                            ),
                        );
                        return None;
                    }
                }
                Some(TypedDecl {
                    decl: decl.clone(),
                    ty: declared,
                })
            }
            Decl::Constraint(c) => {
                let ty = self.infer(&c.condition)?;
                if !matches!(ty.base, BaseKind::Boolean) {
                    self.error(
                        ErrorCode::E0401,
                        c.span,
                        format!("constraint '{}' condition must be Boolean, found {ty}", c.name),
                    );
                    return None;
                }
                Some(TypedDecl {
                    decl: decl.clone(),
                    ty,
                })
            }
            Decl::Policy(p) => {
                for inner in &p.body {
                    self.check_decl(inner);
                }
                Some(TypedDecl {
                    decl: decl.clone(),
                    ty: Unit::fraction(),
                })
            }
        }
    }

    /// Bidirectional `infer`: compute the type of an expression bottom-up.
    fn infer(&mut self, expr: &Expr) -> Option<Unit> {
        match expr {
            Expr::NumberLit { unit_suffix, span, .. } => Some(unit_from_suffix(unit_suffix, *span)),
            Expr::StringLit { .. } => Some(Unit::string()),
            Expr::BoolLit { .. } => Some(Unit::boolean()),
            Expr::Variable { name, span } => match self.scope.get(name) {
                Some(u) => Some(u.clone()),
                None => {
                    self.error(ErrorCode::E0402, *span, format!("undefined variable '{name}'"));
                    None
                }
            },
            Expr::Index { series, index, span } => {
                let series_ty = self.infer(series)?;
                let _ = self.infer(index)?;
                match series_ty.base {
                    BaseKind::TimeSeries(inner) => Some(*inner),
                    other => {
                        self.error(
                            ErrorCode::E0404,
                            *span,
                            format!("cannot index into non-TimeSeries type {other}"),
                        );
                        None
                    }
                }
            }
            Expr::Unary { op, operand, span } => {
                let ty = self.infer(operand)?;
                match op {
                    UnOp::Neg => Some(ty),
                    UnOp::Not => {
                        if matches!(ty.base, BaseKind::Boolean) {
                            Some(ty)
                        } else {
                            self.error(ErrorCode::E0401, *span, format!("'not' requires Boolean, found {ty}"));
                            None
                        }
                    }
                }
            }
            Expr::Binary { op, lhs, rhs, span } => self.infer_binary(*op, lhs, rhs, *span),
            Expr::Call { func, args, span } => {
                for a in args {
                    self.infer(a)?;
                }
                Some(builtin_call_type(func, *span))
            }
            Expr::Distribution { kind, args, span } => {
                for a in args {
                    self.infer(a)?;
                }
                let _ = kind;
                let _ = span;
                // A distribution draw yields the unit of its first parameter
                // (e.g. `Normal(100 USD, 10 USD)` draws a Currency<USD>).
                match args.first() {
                    Some(a) => self.infer(a),
                    None => Some(Unit::fraction()),
                }
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                let cond_ty = self.infer(cond)?;
                if !matches!(cond_ty.base, BaseKind::Boolean) {
                    self.error(ErrorCode::E0401, *span, format!("if-condition must be Boolean, found {cond_ty}"));
                    return None;
                }
                let then_ty = self.infer(then_branch)?;
                let else_ty = self.infer(else_branch)?;
                if !units_compatible(&then_ty, &else_ty) {
                    self.error(
                        ErrorCode::E0401,
                        *span,
                        format!("if-branches have incompatible types: {then_ty} vs {else_ty}"),
                    );
                    return None;
                }
                Some(then_ty)
            }
        }
    }

    fn infer_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Option<Unit> {
        let lty = self.infer(lhs)?;
        let rty = self.infer(rhs)?;
        match op {
            BinOp::Add | BinOp::Sub => {
                if units_compatible(&lty, &rty) {
                    Some(lty)
                } else {
                    self.error(
                        ErrorCode::E0401,
                        span,
                        format!("'+'/'-' require equal units, found {lty} and {rty}"),
                    );
                    None
                }
            }
            BinOp::Mul => Some(lty.multiply(&rty)),
            BinOp::Div => Some(lty.divide(&rty)),
            BinOp::Pow => Some(lty),
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
                if units_compatible(&lty, &rty) {
                    Some(Unit::boolean())
                } else {
                    self.error(
                        ErrorCode::E0401,
                        span,
                        format!("comparison requires equal units, found {lty} and {rty}"),
                    );
                    None
                }
            }
            BinOp::And | BinOp::Or => {
                if matches!(lty.base, BaseKind::Boolean) && matches!(rty.base, BaseKind::Boolean) {
                    Some(Unit::boolean())
                } else {
                    self.error(ErrorCode::E0401, span, "'and'/'or' require Boolean operands");
                    None
                }
            }
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn declared_name_and_type(decl: &Decl) -> Option<(String, Unit)> {
    match decl {
        Decl::Param(p) => Some((p.name.clone(), resolve_type_annotation(&p.ty))),
        Decl::Var(v) => Some((v.name.clone(), resolve_type_annotation(&v.ty))),
        Decl::Constraint(_) | Decl::Policy(_) => None,
    }
}

fn series_element(ty: &Unit) -> Option<Unit> {
    match &ty.base {
        BaseKind::TimeSeries(inner) => Some((**inner).clone()),
        _ => None,
    }
}

/// Two units are compatible for `+`, `-`, and comparison when their base
/// kind and dimension multiset match exactly (spec §4.3). A bare
/// dimensionless literal (`Fraction`, empty dims) also satisfies any other
/// dimensionless declared base, so `param n: Count = 5` type-checks without
/// requiring an artificial unit suffix on `5`.
fn units_compatible(a: &Unit, b: &Unit) -> bool {
    if a == b {
        return true;
    }
    let dimensionless = |u: &Unit| u.dims.is_empty() && matches!(u.base, BaseKind::Fraction);
    (dimensionless(a) && b.dims.is_empty()) || (dimensionless(b) && a.dims.is_empty())
}

/// Resolve a parsed `TypeAnnotation` (primary name + optional type args +
/// `per`/`in` tail) to a semantic `Unit`.
fn resolve_type_annotation(ann: &TypeAnnotation) -> Unit {
    let base = match ann.name.as_str() {
        "Currency" => BaseKind::Currency,
        "Rate" => BaseKind::Rate,
        "Duration" => BaseKind::Duration,
        "Count" => BaseKind::Count,
        "Capacity" => BaseKind::Capacity,
        "Fraction" => BaseKind::Fraction,
        "Boolean" => BaseKind::Boolean,
        "String" => BaseKind::String,
        "TimeSeries" => {
            let inner = ann
                .type_args
                .first()
                .map(resolve_type_annotation)
                .unwrap_or_else(Unit::fraction);
            BaseKind::TimeSeries(Box::new(inner))
        }
        "Distribution" => {
            let inner = ann
                .type_args
                .first()
                .map(resolve_type_annotation)
                .unwrap_or_else(Unit::fraction);
            BaseKind::Distribution(Box::new(inner))
        }
        "Array" => {
            let inner = ann
                .type_args
                .first()
                .map(resolve_type_annotation)
                .unwrap_or_else(Unit::fraction);
            BaseKind::Array(Box::new(inner))
        }
        // An unrecognized type-annotation name is treated as a Count-kind
        // entity label (`Count<Customer>` written bare as `Customer`).
        _other => BaseKind::Count,
    };

    let mut unit = Unit::new(base);
    // `type_args` for parametric bases (Currency<USD>) attach as a
    // dimension word with exponent 1 on the outer unit so `Currency<USD>`
    // and `Currency per X` compose through the same dims map.
    if !matches!(ann.name.as_str(), "TimeSeries" | "Distribution" | "Array") {
        for arg in &ann.type_args {
            unit = unit.with_dim(arg.name.clone(), 1);
        }
    }
    for (word, is_per) in &ann.unit_tail {
        let exp = if *is_per { -1 } else { 1 };
        let existing = unit.dims.get(word).copied().unwrap_or(0);
        unit = unit.with_dim(word.clone(), existing + exp);
    }
    unit
}

fn unit_from_suffix(suffix: &Option<String>, _span: Span) -> Unit {
    match suffix {
        None => Unit::fraction(),
        Some(s) => parse_suffix(s),
    }
}

/// Parse a lexed unit-suffix string (`"USD"`, `"months"`, `"/1mo"`) into a
/// `Unit`. `/1mo`-style attached suffixes denote "per Month".
fn parse_suffix(raw: &str) -> Unit {
    if let Some(rest) = raw.strip_prefix('/') {
        let word = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        return Unit::new(BaseKind::Rate).with_dim(capitalize_unit_word(word), -1);
    }
    match raw {
        "USD" | "EUR" | "GBP" => Unit::new(BaseKind::Currency).with_dim(raw, 1),
        "months" | "month" | "mo" => Unit::new(BaseKind::Duration).with_dim("Month", 1),
        "years" | "year" | "yr" => Unit::new(BaseKind::Duration).with_dim("Year", 1),
        "days" | "day" => Unit::new(BaseKind::Duration).with_dim("Day", 1),
        _ => Unit::new(BaseKind::Currency).with_dim(raw, 1),
    }
}

fn capitalize_unit_word(word: &str) -> String {
    match word {
        "mo" | "month" | "months" => "Month".to_string(),
        "yr" | "year" | "years" => "Year".to_string(),
        "day" | "days" => "Day".to_string(),
        other => other.to_string(),
    }
}

fn builtin_call_type(func: &str, _span: Span) -> Unit {
    match func {
        "min" | "max" | "abs" | "sqrt" | "round" | "floor" | "ceil" => Unit::fraction(),
        "sum" | "mean" => Unit::fraction(),
        _ => Unit::fraction(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn typecheck(src: &str) -> Result<TypedModel, Vec<Diagnostic>> {
        let model = parse(src).expect("parse should succeed");
        TypeChecker::new().check_model(&model)
    }

    #[test]
    fn accepts_matching_currency_addition() {
        let src = r#"
            model M {
                param a: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
                param b: Currency<USD> = 20 USD { source:"s", method:"m", confidence:0.9 }
                constraint c: a + b == 30 USD
            }
        "#;
        typecheck(src).unwrap();
    }

    #[test]
    fn rejects_dimensional_mismatch_with_e0401() {
        let src = r#"
            model M {
                param a: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
                param b: Duration per Month = 3 months { source:"s", method:"m", confidence:0.9 }
                constraint c: a == b
            }
        "#;
        let errs = typecheck(src).unwrap_err();
        assert!(errs.iter().any(|d| d.code == ErrorCode::E0401));
    }

    #[test]
    fn division_of_currency_by_duration_yields_rate() {
        let src = r#"
            model M {
                param price: Currency<USD> = 100 USD { source:"s", method:"m", confidence:0.9 }
                param term: Duration<Month> = 5 months { source:"s", method:"m", confidence:0.9 }
                var burn: Currency<USD> per Month = price / term
            }
        "#;
        typecheck(src).unwrap();
    }

    #[test]
    fn undefined_variable_is_e0402() {
        let src = r#"
            model M {
                constraint c: undefined_thing == 1
            }
        "#;
        let errs = typecheck(src).unwrap_err();
        assert!(errs.iter().any(|d| d.code == ErrorCode::E0402));
    }
}
