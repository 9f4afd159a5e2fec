use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stable, test-referenced error code (see spec §6, "Error codes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Lex/parse: unexpected token.
    E0001,
    /// Lex: byte sequence does not form a valid token.
    E0002,
    /// Parse: a `per X` unit phrase was repeated inside a type annotation.
    E0700,
    /// Type: equal-unit requirement violated by `+`/`-`/comparison.
    E0401,
    /// Type: reference to an undefined variable/parameter.
    E0402,
    /// Type: declared type incompatible with inferred type.
    E0403,
    /// Type: index into a non-`TimeSeries` value.
    E0404,
    /// Provenance: completeness ratio below threshold.
    E0400,
    /// Provenance: confidence outside `[0, 1]`.
    E0405,
    /// Runtime: dependency cycle through same-`t` references.
    E0500,
    /// Runtime: time index out of `[0, T)` bounds.
    E0501,
    /// Calibration: named data column missing from the observed table.
    E0600,
    /// Calibration: distribution family rejects the supplied data.
    E0601,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Source position of a diagnostic, one-based for human display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

/// A structured compiler diagnostic: `{ code, message, line?, col?, hint? }` (spec §7).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub span: Option<Span>,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span: None,
            hint: None,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Top-level error type threaded through every pass. Lex/parse/type/provenance
/// passes collect diagnostics rather than aborting on the first; `Diagnostics`
/// carries the whole batch so a single run can report more than one error.
#[derive(Debug, Error)]
pub enum PelError {
    #[error("{0} error(s) found")]
    Diagnostics(Vec<Diagnostic>),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PelError {
    pub fn single(diag: Diagnostic) -> Self {
        PelError::Diagnostics(vec![diag])
    }

    /// The first error code in the batch, used as the process exit reason.
    pub fn first_code(&self) -> Option<ErrorCode> {
        match self {
            PelError::Diagnostics(ds) => ds.first().map(|d| d.code),
            _ => None,
        }
    }
}

pub type PelResult<T> = Result<T, PelError>;
