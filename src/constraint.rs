//! Linear weight-constraint algebra.
//!
//! A [`Constraint`] restricts the factor weights of a problem with a linear
//! inequality or equality over named factors, `Σ coeffs[f]·w[f] op rhs`.
//! Every problem implicitly carries its own normalization on top of the
//! constraints collected here (the weight simplex for value-based models, the
//! Charnes-Cooper normalization for ratio models).

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::error::{Result, RobustnessError};

/// Relational operator of a weight constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOperator {
    Leq,
    Geq,
    Eq,
}

/// A linear constraint over named factor weights.
#[derive(Clone, Debug)]
pub struct Constraint {
    operator: ConstraintOperator,
    rhs: f64,
    coefficients: BTreeMap<String, f64>,
}

impl Constraint {
    /// Create a constraint `Σ coeffs[f]·w[f] op rhs`.
    pub fn new<N, I>(operator: ConstraintOperator, rhs: f64, coefficients: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, f64)>,
    {
        Constraint {
            operator,
            rhs,
            coefficients: coefficients
                .into_iter()
                .map(|(name, coefficient)| (name.into(), coefficient))
                .collect(),
        }
    }

    /// Convenience for `w[factor] <= bound`.
    pub fn upper_bound(factor: impl Into<String>, bound: f64) -> Self {
        Constraint::new(ConstraintOperator::Leq, bound, [(factor.into(), 1.0)])
    }

    /// Convenience for `w[factor] >= bound`.
    pub fn lower_bound(factor: impl Into<String>, bound: f64) -> Self {
        Constraint::new(ConstraintOperator::Geq, bound, [(factor.into(), 1.0)])
    }

    pub fn operator(&self) -> ConstraintOperator {
        self.operator
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    pub fn coefficients(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coefficients
            .iter()
            .map(|(name, coefficient)| (name.as_str(), *coefficient))
    }

    /// Names referenced by this constraint.
    pub fn factors(&self) -> impl Iterator<Item = &str> {
        self.coefficients.keys().map(String::as_str)
    }

    pub(crate) fn validate_factors<'a>(
        &self,
        mut known: impl FnMut(&str) -> bool,
    ) -> Result<()> {
        for name in self.coefficients.keys() {
            if !known(name) {
                return Err(RobustnessError::config(format!(
                    "weight constraint references unknown factor `{name}`"
                )));
            }
        }
        Ok(())
    }

    /// Expand the constraint into a dense coefficient row over `dim` columns,
    /// using `column_of` to resolve factor names. Names that do not resolve
    /// are a configuration error.
    pub(crate) fn dense_row(
        &self,
        dim: usize,
        mut column_of: impl FnMut(&str) -> Option<usize>,
    ) -> Result<Array1<f64>> {
        let mut row = Array1::zeros(dim);
        for (name, coefficient) in &self.coefficients {
            let column = column_of(name).ok_or_else(|| {
                RobustnessError::config(format!(
                    "weight constraint references unknown factor `{name}`"
                ))
            })?;
            row[column] += coefficient;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_row_resolves_names() {
        let constraint = Constraint::new(
            ConstraintOperator::Geq,
            0.0,
            [("velocity", 1.0), ("capacity", -5.0)],
        );
        let names = ["capacity", "velocity"];
        let row = constraint
            .dense_row(2, |name| names.iter().position(|n| *n == name))
            .unwrap();
        assert_eq!(row[0], -5.0);
        assert_eq!(row[1], 1.0);
    }

    #[test]
    fn unknown_factor_is_rejected() {
        let constraint = Constraint::upper_bound("ghost", 0.5);
        assert!(constraint.dense_row(1, |_| None).is_err());
    }
}
