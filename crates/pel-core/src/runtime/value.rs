//! Dynamic-shape runtime values (spec §9): a scalar, a time-indexed series,
//! or a categorical vector, each carrying its checked `Unit`. Replacing the
//! exception-driven dynamic typing of the original implementation with an
//! explicit sum type keeps every runtime operation a total match.

use crate::units::Unit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Value {
    Scalar { value: f64, unit: Unit },
    Series { values: Vec<f64>, unit: Unit },
    Categorical { values: Vec<String> },
}

impl Value {
    pub fn unit(&self) -> Option<&Unit> {
        match self {
            Value::Scalar { unit, .. } | Value::Series { unit, .. } => Some(unit),
            Value::Categorical { .. } => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().map(|v| v != 0.0)
    }

    pub fn index_at(&self, t: i64, timesteps: i64) -> f64 {
        match self {
            Value::Series { values, .. } => {
                let idx = if t < 0 {
                    0
                } else if t >= timesteps {
                    // Fatal per spec §4.6; callers check bounds before
                    // reaching here and surface E0501 instead.
                    (timesteps - 1).max(0) as usize
                } else {
                    t as usize
                };
                values.get(idx).copied().unwrap_or(0.0)
            }
            Value::Scalar { value, .. } => *value,
            Value::Categorical { .. } => 0.0,
        }
    }
}
