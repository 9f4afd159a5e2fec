//! The unit type `U`: a symbolic quantity composed of a base kind and a
//! free commutative monoid of dimension words (spec §3, §4.3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The base kind of a unit type, independent of its dimension words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseKind {
    Currency,
    Rate,
    Duration,
    Count,
    Capacity,
    Fraction,
    Boolean,
    String,
    TimeSeries(Box<Unit>),
    Distribution(Box<Unit>),
    Array(Box<Unit>),
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseKind::Currency => write!(f, "Currency"),
            BaseKind::Rate => write!(f, "Rate"),
            BaseKind::Duration => write!(f, "Duration"),
            BaseKind::Count => write!(f, "Count"),
            BaseKind::Capacity => write!(f, "Capacity"),
            BaseKind::Fraction => write!(f, "Fraction"),
            BaseKind::Boolean => write!(f, "Boolean"),
            BaseKind::String => write!(f, "String"),
            BaseKind::TimeSeries(t) => write!(f, "TimeSeries<{t}>"),
            BaseKind::Distribution(t) => write!(f, "Distribution<{t}>"),
            BaseKind::Array(t) => write!(f, "Array<{t}>"),
        }
    }
}

/// A unit type: a base kind plus a multiset of dimension words with integer
/// exponents, e.g. `Currency<USD>`, `Rate per Month` (`dims = {Month: -1}`),
/// `Count<Customer>` (`dims = {Customer: 1}`). `Fraction` with no dims is the
/// multiplicative identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub base: BaseKind,
    /// Dimension word -> exponent. Never stores a zero exponent.
    pub dims: BTreeMap<String, i32>,
}

impl Unit {
    pub fn new(base: BaseKind) -> Self {
        Unit {
            base,
            dims: BTreeMap::new(),
        }
    }

    pub fn with_dim(mut self, name: impl Into<String>, exp: i32) -> Self {
        if exp != 0 {
            self.dims.insert(name.into(), exp);
        }
        self
    }

    pub fn fraction() -> Self {
        Unit::new(BaseKind::Fraction)
    }

    pub fn boolean() -> Self {
        Unit::new(BaseKind::Boolean)
    }

    pub fn string() -> Self {
        Unit::new(BaseKind::String)
    }

    pub fn is_fraction_identity(&self) -> bool {
        matches!(self.base, BaseKind::Fraction) && self.dims.is_empty()
    }

    /// The monoid product of two units' dimensions, base-independent.
    /// Used by `*` and `/` to accumulate dimension exponents.
    pub fn merge_dims(a: &BTreeMap<String, i32>, b: &BTreeMap<String, i32>, sign: i32) -> BTreeMap<String, i32> {
        let mut out = a.clone();
        for (k, v) in b {
            let entry = out.entry(k.clone()).or_insert(0);
            *entry += sign * v;
            if *entry == 0 {
                out.remove(k);
            }
        }
        out
    }

    /// Result unit of `self * other`: bases compose to `Fraction` unless one
    /// side is the fraction identity, in which case the other side's base
    /// carries through with combined dimensions (spec §4.3, `*`).
    pub fn multiply(&self, other: &Unit) -> Unit {
        let dims = Unit::merge_dims(&self.dims, &other.dims, 1);
        let base = if self.is_fraction_identity() {
            other.base.clone()
        } else if other.is_fraction_identity() {
            self.base.clone()
        } else {
            self.base.clone()
        };
        Unit { base, dims }
    }

    /// Result unit of `self / other`: the dividend's base kind carries
    /// through with the divisor's dimensions subtracted, e.g.
    /// `Currency<USD> / Duration in Months` becomes `Currency<USD> per Month`
    /// (spec §4.3, `/`).
    pub fn divide(&self, other: &Unit) -> Unit {
        let dims = Unit::merge_dims(&self.dims, &other.dims, -1);
        Unit {
            base: self.base.clone(),
            dims,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for (name, exp) in &self.dims {
            if *exp > 0 {
                for _ in 0..*exp {
                    write!(f, " per {name}")?;
                }
            } else {
                for _ in 0..(-*exp) {
                    write!(f, " in {name}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_multiplicative_identity() {
        let usd = Unit::new(BaseKind::Currency).with_dim("USD", 1);
        let frac = Unit::fraction();
        assert_eq!(usd.multiply(&frac), usd);
        assert_eq!(frac.multiply(&usd), usd);
    }

    #[test]
    fn divide_combines_dims_with_negative_sign() {
        let usd = Unit::new(BaseKind::Currency).with_dim("USD", 1);
        let months = Unit::new(BaseKind::Duration).with_dim("Month", 1);
        let rate = usd.divide(&months);
        assert_eq!(rate.dims.get("USD"), Some(&1));
        assert_eq!(rate.dims.get("Month"), Some(&-1));
    }

    #[test]
    fn equal_units_are_order_independent_under_dim_map() {
        let a = Unit::new(BaseKind::Count).with_dim("Customer", 1).with_dim("Cohort", 1);
        let b = Unit::new(BaseKind::Count).with_dim("Cohort", 1).with_dim("Customer", 1);
        assert_eq!(a, b);
    }
}
