//! Provenance completeness gate (spec §4.4). Runs after type checking and
//! before IR emission; it never mutates the AST, only validates it.

use crate::ast::{Decl, Provenance, TypedModel};
use crate::error::{Diagnostic, ErrorCode};

/// Default completeness ratio required before a model may proceed to IR
/// emission. Configurable by callers; the identifier and error code stay
/// stable regardless of the configured value (spec §9, Open Question).
pub const DEFAULT_COMPLETENESS_THRESHOLD: f64 = 0.90;

pub struct ProvenanceChecker {
    threshold: f64,
}

impl ProvenanceChecker {
    pub fn new() -> Self {
        ProvenanceChecker {
            threshold: DEFAULT_COMPLETENESS_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        ProvenanceChecker { threshold }
    }

    /// Validate every `param`'s provenance record. Returns the completeness
    /// ratio (non-empty source+method fields) alongside any diagnostics.
    pub fn check(&self, model: &TypedModel) -> Result<f64, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let mut total = 0usize;
        let mut complete = 0usize;

        for typed in &model.decls {
            if let Decl::Param(p) = &typed.decl {
                total += 1;
                let prov = &p.provenance;

                if prov.confidence < 0.0 || prov.confidence > 1.0 {
                    diagnostics.push(
                        Diagnostic::new(
                            ErrorCode::E0405,
                            format!(
                                "param '{}' has confidence {} outside [0, 1]",
                                p.name, prov.confidence
                            ),
                        )
                        .at(p.span),
                    );
                    continue;
                }

                if is_complete(prov) {
                    complete += 1;
                }
            }
        }

        let ratio = if total == 0 {
            1.0
        } else {
            complete as f64 / total as f64
        };

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        if ratio < self.threshold {
            return Err(vec![Diagnostic::new(
                ErrorCode::E0400,
                format!(
                    "provenance completeness {:.2} is below required threshold {:.2}",
                    ratio, self.threshold
                ),
            )
            .with_hint("attach source/method to every param, or recalibrate the model")]);
        }

        Ok(ratio)
    }
}

impl Default for ProvenanceChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_complete(prov: &Provenance) -> bool {
    !prov.source.trim().is_empty() && !prov.method.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::typeck::TypeChecker;

    fn checked(src: &str) -> TypedModel {
        let model = parse(src).expect("parse");
        TypeChecker::new().check_model(&model).expect("typecheck")
    }

    #[test]
    fn passes_when_all_params_have_source_and_method() {
        let model = checked(
            r#"
            model M {
                param a: Currency<USD> = 10 USD { source:"survey", method:"analyst", confidence:0.9 }
            }
        "#,
        );
        let ratio = ProvenanceChecker::new().check(&model).unwrap();
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn fails_with_e0400_when_below_threshold() {
        let model = checked(
            r#"
            model M {
                param a: Currency<USD> = 10 USD { source:"", method:"", confidence:0.9 }
            }
        "#,
        );
        let errs = ProvenanceChecker::new().check(&model).unwrap_err();
        assert!(errs.iter().any(|d| d.code == ErrorCode::E0400));
    }

    #[test]
    fn out_of_range_confidence_is_fatal_e0405() {
        let model = checked(
            r#"
            model M {
                param a: Currency<USD> = 10 USD { source:"s", method:"m", confidence:1.5 }
            }
        "#,
        );
        let errs = ProvenanceChecker::new().check(&model).unwrap_err();
        assert!(errs.iter().any(|d| d.code == ErrorCode::E0405));
    }
}
