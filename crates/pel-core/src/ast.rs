//! AST node definitions (spec §3). Tokens exist only during parsing; AST
//! nodes live from parse through IR emission, at which point the IR is
//! immutable.

use crate::error::Span;
use crate::units::Unit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// Distribution families recognized by the parser (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistKind {
    Normal,
    LogNormal,
    Beta,
    Triangular,
    Uniform,
    Pert,
}

impl DistKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Normal" => DistKind::Normal,
            "LogNormal" => DistKind::LogNormal,
            "Beta" => DistKind::Beta,
            "Triangular" => DistKind::Triangular,
            "Uniform" => DistKind::Uniform,
            "PERT" => DistKind::Pert,
            _ => return None,
        })
    }
}

/// An untyped expression produced by the parser. The type checker annotates
/// each node with a `Unit` to produce a `TypedExpr` (see `typeck`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    NumberLit {
        value: f64,
        unit_suffix: Option<String>,
        span: Span,
    },
    StringLit {
        value: String,
        span: Span,
    },
    BoolLit {
        value: bool,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    Index {
        series: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        span: Span,
    },
    Distribution {
        kind: DistKind,
        args: Vec<Expr>,
        span: Span,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::NumberLit { span, .. }
            | Expr::StringLit { span, .. }
            | Expr::BoolLit { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Index { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Distribution { span, .. }
            | Expr::If { span, .. } => *span,
        }
    }
}

/// Parsed type annotation: a primary type name, optional type arguments, and
/// a sequence of `per`/`in` dimension words (spec §4.2 `unit_tail`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAnnotation {
    pub name: String,
    pub type_args: Vec<TypeAnnotation>,
    /// `(dimension_word, is_per)`; `is_per = true` for `per X`, `false` for `in X`.
    pub unit_tail: Vec<(String, bool)>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub method: String,
    pub confidence: f64,
    pub correlated_with: Vec<String>,
    pub calibration_timestamp: Option<String>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeAnnotation,
    pub value_expr: Expr,
    pub provenance: Provenance,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeAnnotation,
    /// For a time-indexed var, the base clause assigns `s[0]`; `recurrence`
    /// (if present) assigns `s[t]` for `t >= 1` in terms of `t` and `s[t-k]`.
    pub value_expr: Option<Expr>,
    pub recurrence: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDecl {
    pub name: String,
    pub condition: Expr,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecl {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Decl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decl {
    Param(ParamDecl),
    Var(VarDecl),
    Constraint(ConstraintDecl),
    Policy(PolicyDecl),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub decls: Vec<Decl>,
    pub span: Span,
}

/// A declaration annotated with its checked unit type, produced by `typeck`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedDecl {
    pub decl: Decl,
    pub ty: Unit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedModel {
    pub name: String,
    pub decls: Vec<TypedDecl>,
}
