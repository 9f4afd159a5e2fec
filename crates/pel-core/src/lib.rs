//! Compiler, type checker, and deterministic runtime for the Programmable
//! Economic Language (PEL): a small DSL for dimensionally-typed, provenance-
//! tracked economic models evaluated deterministically, via Monte Carlo, or
//! via sensitivity sweep, with a statistical calibrator that fits parameters
//! against observed data.

pub mod ast;
pub mod calibration;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod provenance;
pub mod runtime;
pub mod typeck;
pub mod units;

pub use error::{Diagnostic, ErrorCode, PelError, PelResult, Span};
