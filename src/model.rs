//! Solver-agnostic LP/MILP instances.
//!
//! Every robustness question is translated into a [`ModelSpec`]: an objective
//! direction, per-variable bounds and integrality, and a list of dense linear
//! constraints. Model builders emit specs; the solver adapter in
//! [`crate::solve`] turns a spec into an outcome. Questions that sweep over a
//! rival set clone a shared base spec and extend it, which amortizes the
//! construction cost of the many near-identical programs.

use std::collections::BTreeMap;

use crate::constraint::ConstraintOperator;

/// Objective direction of a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
    Minimize,
    Maximize,
}

/// A reference to a variable of a [`ModelSpec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Var(pub(crate) usize);

#[derive(Clone, Debug)]
pub(crate) struct VariableDef {
    pub objective: f64,
    pub lower: f64,
    pub upper: f64,
    pub integer: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Row {
    pub terms: Vec<(usize, f64)>,
    pub operator: ConstraintOperator,
    pub rhs: f64,
}

/// A linear or mixed-integer linear program over anonymous variables.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    direction: Objective,
    variables: Vec<VariableDef>,
    rows: Vec<Row>,
}

impl ModelSpec {
    pub fn new(direction: Objective) -> Self {
        ModelSpec {
            direction,
            variables: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn direction(&self) -> Objective {
        self.direction
    }

    /// Add a continuous variable with the given objective coefficient and
    /// `(lower, upper)` bounds. Unbounded sides use infinities.
    pub fn add_var(&mut self, objective: f64, (lower, upper): (f64, f64)) -> Var {
        self.variables.push(VariableDef {
            objective,
            lower,
            upper,
            integer: false,
        });
        Var(self.variables.len() - 1)
    }

    /// Add an integer variable. Only the imprecise ratio models ever need
    /// integrality and only through the adapter surface; bounds are rounded
    /// inward to the nearest integers.
    pub fn add_integer_var(&mut self, objective: f64, (lower, upper): (f64, f64)) -> Var {
        self.variables.push(VariableDef {
            objective,
            lower,
            upper,
            integer: true,
        });
        Var(self.variables.len() - 1)
    }

    /// Accumulate into a variable's objective coefficient. Builders that
    /// assemble objectives across several factor contributions use this
    /// instead of fixing the coefficient at variable creation.
    pub fn add_objective(&mut self, var: Var, delta: f64) {
        self.variables[var.0].objective += delta;
    }

    /// Add `Σ coeff·var op rhs`. Repeated variables are merged.
    pub fn add_constraint(
        &mut self,
        terms: impl IntoIterator<Item = (Var, f64)>,
        operator: ConstraintOperator,
        rhs: f64,
    ) {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for (var, coefficient) in terms {
            *merged.entry(var.0).or_insert(0.0) += coefficient;
        }
        merged.retain(|_, coefficient| *coefficient != 0.0);
        self.rows.push(Row {
            terms: merged.into_iter().collect(),
            operator,
            rhs,
        });
    }

    pub fn n_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_terms_are_merged() {
        let mut spec = ModelSpec::new(Objective::Maximize);
        let x = spec.add_var(1.0, (0.0, f64::INFINITY));
        spec.add_constraint([(x, 1.0), (x, 2.0)], ConstraintOperator::Leq, 4.0);
        assert_eq!(spec.rows()[0].terms, vec![(0, 3.0)]);
    }

    #[test]
    fn zero_coefficients_are_dropped() {
        let mut spec = ModelSpec::new(Objective::Minimize);
        let x = spec.add_var(1.0, (0.0, 1.0));
        let y = spec.add_var(0.0, (0.0, 1.0));
        spec.add_constraint([(x, 1.0), (y, 0.0)], ConstraintOperator::Eq, 1.0);
        assert_eq!(spec.rows()[0].terms, vec![(0, 1.0)]);
    }
}
