use std::collections::HashMap;

use ndarray::Array2;

use super::{Hierarchy, ProblemData};
use crate::constraint::Constraint;
use crate::error::{Result, RobustnessError};

/// Direction of a marginal value function: whether larger performances are
/// better (`Gain`) or worse (`Cost`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Gain,
    Cost,
}

/// A monotone piecewise-linear marginal value function, given by
/// characteristic points `(x, u(x))` with strictly increasing abscissae and
/// values running from 0 to 1 (gain) or from 1 to 0 (cost).
#[derive(Clone, Debug)]
pub struct ValueFunction {
    points: Vec<(f64, f64)>,
    polarity: Polarity,
}

impl ValueFunction {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(RobustnessError::config(
                "a value function needs at least two characteristic points",
            ));
        }
        for window in points.windows(2) {
            if window[1].0 <= window[0].0 {
                return Err(RobustnessError::config(
                    "value function abscissae must be strictly increasing",
                ));
            }
        }
        if points.iter().any(|(_, u)| !(0.0..=1.0).contains(u)) {
            return Err(RobustnessError::config(
                "value function values must lie in [0, 1]",
            ));
        }
        let first = points.first().unwrap().1;
        let last = points.last().unwrap().1;
        let polarity = if first == 0.0 && last == 1.0 {
            Polarity::Gain
        } else if first == 1.0 && last == 0.0 {
            Polarity::Cost
        } else {
            return Err(RobustnessError::config(
                "value function endpoints must be 0 and 1 (gain) or 1 and 0 (cost)",
            ));
        };
        let monotone = points.windows(2).all(|w| match polarity {
            Polarity::Gain => w[1].1 >= w[0].1,
            Polarity::Cost => w[1].1 <= w[0].1,
        });
        if !monotone {
            return Err(RobustnessError::config(
                "value function values must be monotone in the direction set by the endpoints",
            ));
        }
        Ok(ValueFunction { points, polarity })
    }

    /// Build from points already known to be valid (sampler output).
    pub(crate) fn raw(points: Vec<(f64, f64)>, polarity: Polarity) -> Self {
        ValueFunction { points, polarity }
    }

    /// The default shape: linear normalization of the observed range.
    pub(crate) fn linear(lo: f64, hi: f64, polarity: Polarity) -> Self {
        let points = match polarity {
            Polarity::Gain => vec![(lo, 0.0), (hi, 1.0)],
            Polarity::Cost => vec![(lo, 1.0), (hi, 0.0)],
        };
        ValueFunction { points, polarity }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Evaluate at `x`, clamping outside the characteristic range.
    pub fn evaluate(&self, x: f64) -> f64 {
        let points = &self.points;
        if x <= points[0].0 {
            return points[0].1;
        }
        if x >= points[points.len() - 1].0 {
            return points[points.len() - 1].1;
        }
        let segment = points.windows(2).find(|w| x <= w[1].0).unwrap();
        let (x0, u0) = segment[0];
        let (x1, u1) = segment[1];
        u0 + (u1 - u0) * (x - x0) / (x1 - x0)
    }

    /// The endpoint of `[lo, hi]` with the larger value, and its mate.
    pub(crate) fn best_endpoint(&self, lo: f64, hi: f64) -> f64 {
        match self.polarity {
            Polarity::Gain => hi,
            Polarity::Cost => lo,
        }
    }

    pub(crate) fn worst_endpoint(&self, lo: f64, hi: f64) -> f64 {
        match self.polarity {
            Polarity::Gain => lo,
            Polarity::Cost => hi,
        }
    }
}

/// A range of admissible value functions: a lower and an upper envelope
/// sharing abscissae, with `lower ≤ upper` pointwise. A single fixed shape is
/// the degenerate range with `lower == upper`.
#[derive(Clone, Debug)]
pub struct ValueFunctionRange {
    lower: ValueFunction,
    upper: ValueFunction,
}

impl ValueFunctionRange {
    pub fn new(lower: ValueFunction, upper: ValueFunction) -> Result<Self> {
        if lower.points().len() != upper.points().len()
            || lower
                .points()
                .iter()
                .zip(upper.points())
                .any(|(l, u)| l.0 != u.0)
        {
            return Err(RobustnessError::config(
                "value function envelopes must share their abscissae",
            ));
        }
        if lower
            .points()
            .iter()
            .zip(upper.points())
            .any(|(l, u)| l.1 > u.1)
        {
            return Err(RobustnessError::config(
                "the lower value function envelope must not exceed the upper one",
            ));
        }
        if lower.polarity() != upper.polarity() {
            return Err(RobustnessError::config(
                "value function envelopes must share their direction",
            ));
        }
        Ok(ValueFunctionRange { lower, upper })
    }

    pub fn fixed(shape: ValueFunction) -> Self {
        ValueFunctionRange {
            lower: shape.clone(),
            upper: shape,
        }
    }

    pub fn lower(&self) -> &ValueFunction {
        &self.lower
    }

    pub fn upper(&self) -> &ValueFunction {
        &self.upper
    }

    pub fn polarity(&self) -> Polarity {
        self.lower.polarity()
    }
}

/// Problem data for the additive value-based model (VDEA).
///
/// Factors without an explicit shape get the linear normalization of their
/// observed performance range, oriented cost-wise for inputs and gain-wise
/// for outputs.
#[derive(Clone, Debug)]
pub struct VdeaProblemData {
    base: ProblemData,
    shapes: HashMap<String, ValueFunction>,
}

impl VdeaProblemData {
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
        Ok(VdeaProblemData {
            base: ProblemData::new(inputs, outputs, input_names, output_names)?,
            shapes: HashMap::new(),
        })
    }

    /// Set the marginal value function of a factor from characteristic points.
    pub fn set_function_shape(
        &mut self,
        factor: impl Into<String>,
        points: Vec<(f64, f64)>,
    ) -> Result<()> {
        let factor = factor.into();
        if self.base.factor_column(&factor).is_none() {
            return Err(RobustnessError::config(format!(
                "value function refers to unknown factor `{factor}`"
            )));
        }
        self.shapes.insert(factor, ValueFunction::new(points)?);
        Ok(())
    }

    pub fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        self.base.add_weight_constraint(constraint)
    }

    pub fn n_dmus(&self) -> usize {
        self.base.n_dmus()
    }

    pub fn n_factors(&self) -> usize {
        self.base.n_factors()
    }

    pub fn factor_column(&self, name: &str) -> Option<usize> {
        self.base.factor_column(name)
    }

    pub fn weight_constraints(&self) -> &[Constraint] {
        self.base.weight_constraints()
    }

    pub(crate) fn base(&self) -> &ProblemData {
        &self.base
    }

    /// The effective shape of a factor column: the explicit one, or the
    /// default linear normalization of the observed range.
    pub(crate) fn shape(&self, column: usize) -> ValueFunction {
        let name = self.base.layout().name(column);
        if let Some(shape) = self.shapes.get(name) {
            return shape.clone();
        }
        let polarity = if self.base.layout().is_input(column) {
            Polarity::Cost
        } else {
            Polarity::Gain
        };
        let performances = (0..self.base.n_dmus()).map(|dmu| self.base.performance(dmu, column));
        let lo = performances.clone().fold(f64::INFINITY, f64::min);
        let hi = performances.fold(f64::NEG_INFINITY, f64::max);
        if hi > lo {
            ValueFunction::linear(lo, hi, polarity)
        } else {
            // Constant column: every DMU sits at the top of the scale.
            ValueFunction::linear(lo - 1.0, lo, Polarity::Gain)
        }
    }

    /// Marginal values `u_f(p_{f,k})` for all DMUs and factor columns.
    pub(crate) fn value_matrix(&self) -> Array2<f64> {
        let n = self.base.n_dmus();
        let m = self.base.n_factors();
        let mut values = Array2::zeros((n, m));
        for column in 0..m {
            let shape = self.shape(column);
            for dmu in 0..n {
                values[[dmu, column]] = shape.evaluate(self.base.performance(dmu, column));
            }
        }
        values
    }
}

/// VDEA data with a criteria hierarchy; analysis questions are asked at a
/// named node and see only its subtree.
#[derive(Clone, Debug)]
pub struct HierarchicalVdeaProblemData {
    vdea: VdeaProblemData,
    hierarchy: Hierarchy,
}

impl HierarchicalVdeaProblemData {
    pub fn new<N1, N2>(
        inputs: Array2<f64>,
        outputs: Array2<f64>,
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
        hierarchy: Hierarchy,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        let vdea = VdeaProblemData::new(inputs, outputs, input_names, output_names)?;
        let mut leaves: Vec<&str> = hierarchy.leaf_names().collect();
        leaves.sort_unstable();
        let mut factors: Vec<&str> = vdea
            .base()
            .input_names()
            .iter()
            .chain(vdea.base().output_names())
            .map(String::as_str)
            .collect();
        factors.sort_unstable();
        if leaves != factors {
            return Err(RobustnessError::config(
                "hierarchy leaves must coincide with the problem's inputs and outputs",
            ));
        }
        Ok(HierarchicalVdeaProblemData { vdea, hierarchy })
    }

    /// Append a weight constraint; names may reference leaf factors or inner
    /// category nodes.
    pub fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        constraint.validate_factors(|name| self.hierarchy.node(name).is_some())?;
        self.vdea.base.push_weight_constraint_unchecked(constraint);
        Ok(())
    }

    pub fn set_function_shape(
        &mut self,
        factor: impl Into<String>,
        points: Vec<(f64, f64)>,
    ) -> Result<()> {
        self.vdea.set_function_shape(factor, points)
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn n_dmus(&self) -> usize {
        self.vdea.n_dmus()
    }

    pub(crate) fn vdea(&self) -> &VdeaProblemData {
        &self.vdea
    }
}
