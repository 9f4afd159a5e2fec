//! Severity-ordered constraint violation tracking (spec §4.6). `error`
//! marks the run `status = "failed"` but evaluation continues; `fatal`
//! aborts the current replication immediately.

use crate::ast::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub name: String,
    pub severity: Severity,
    pub message: String,
    pub t: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintLog {
    pub violations: Vec<ConstraintViolation>,
}

impl ConstraintLog {
    pub fn new() -> Self {
        ConstraintLog::default()
    }

    pub fn record(&mut self, name: &str, severity: Severity, message: &str, t: Option<i64>) {
        self.violations.push(ConstraintViolation {
            name: name.to_string(),
            severity,
            message: message.to_string(),
            t,
        });
    }

    /// A run's `status` is `"failed"` once any `error` or `fatal` violation
    /// has been recorded.
    pub fn has_failure(&self) -> bool {
        self.violations.iter().any(|v| v.severity >= Severity::Error)
    }

    pub fn has_fatal(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_spec() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn error_marks_failure_but_warning_does_not() {
        let mut log = ConstraintLog::new();
        log.record("c1", Severity::Warning, "low confidence", None);
        assert!(!log.has_failure());
        log.record("c2", Severity::Error, "budget exceeded", Some(3));
        assert!(log.has_failure());
        assert!(!log.has_fatal());
    }
}
