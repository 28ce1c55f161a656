use ndarray::Array2;

use super::{validate_performances, FactorLayout};
use crate::constraint::Constraint;
use crate::error::Result;

/// Precise DEA problem data for the ratio (CCR) model.
///
/// Rows of the performance matrices are DMUs in index order; columns follow
/// the factor-name vectors. Custom weight constraints are collected in
/// insertion order on top of the implicit nonnegativity of all weights.
#[derive(Clone, Debug)]
pub struct ProblemData {
    inputs: Array2<f64>,
    outputs: Array2<f64>,
    layout: FactorLayout,
    weight_constraints: Vec<Constraint>,
}

impl ProblemData {
    pub fn new<N1, N2>(
        inputs: Array2<f64>,
        outputs: Array2<f64>,
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        let layout = FactorLayout::new(input_names, output_names)?;
        validate_performances(&inputs, layout.n_inputs(), "input")?;
        validate_performances(&outputs, layout.n_outputs(), "output")?;
        if inputs.nrows() != outputs.nrows() {
            return Err(crate::error::RobustnessError::config(format!(
                "input matrix has {} DMUs but output matrix has {}",
                inputs.nrows(),
                outputs.nrows()
            )));
        }
        Ok(ProblemData {
            inputs,
            outputs,
            layout,
            weight_constraints: Vec::new(),
        })
    }

    /// Append a custom weight constraint. Factor names are checked against
    /// the problem's inputs and outputs.
    pub fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        constraint.validate_factors(|name| self.layout.column(name).is_some())?;
        self.weight_constraints.push(constraint);
        Ok(())
    }

    pub fn n_dmus(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn n_inputs(&self) -> usize {
        self.layout.n_inputs()
    }

    pub fn n_outputs(&self) -> usize {
        self.layout.n_outputs()
    }

    pub fn n_factors(&self) -> usize {
        self.layout.n_factors()
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Array2<f64> {
        &self.outputs
    }

    pub fn input_names(&self) -> &[String] {
        self.layout.input_names()
    }

    pub fn output_names(&self) -> &[String] {
        self.layout.output_names()
    }

    pub fn weight_constraints(&self) -> &[Constraint] {
        &self.weight_constraints
    }

    /// Combined factor column (inputs first, then outputs).
    pub fn factor_column(&self, name: &str) -> Option<usize> {
        self.layout.column(name)
    }

    pub(crate) fn layout(&self) -> &FactorLayout {
        &self.layout
    }

    /// Append a constraint whose names were validated against a wider
    /// namespace than the factor set (hierarchy category nodes).
    pub(crate) fn push_weight_constraint_unchecked(&mut self, constraint: Constraint) {
        self.weight_constraints.push(constraint);
    }

    /// Performance of `dmu` in combined-column order.
    pub(crate) fn performance(&self, dmu: usize, column: usize) -> f64 {
        if self.layout.is_input(column) {
            self.inputs[[dmu, column]]
        } else {
            self.outputs[[dmu, column - self.layout.n_inputs()]]
        }
    }
}
