use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;

use super::{ordinal_order, validate_performances, FactorLayout};
use super::{Polarity, ValueFunction, ValueFunctionRange};
use crate::constraint::Constraint;
use crate::error::{Result, RobustnessError};

/// Shared backbone of the imprecise data variants: per-DMU, per-factor
/// performance intervals `[lo, hi]` plus the set of ordinal factors, whose
/// (degenerate) columns carry rank permutations instead of cardinal values.
#[derive(Clone, Debug)]
pub(crate) struct ImpreciseCore {
    min_inputs: Array2<f64>,
    max_inputs: Array2<f64>,
    min_outputs: Array2<f64>,
    max_outputs: Array2<f64>,
    layout: FactorLayout,
    weight_constraints: Vec<Constraint>,
    ordinal_factors: BTreeSet<String>,
}

impl ImpreciseCore {
    fn new<N1, N2>(
        min_inputs: Array2<f64>,
        min_outputs: Array2<f64>,
        max_inputs: Array2<f64>,
        max_outputs: Array2<f64>,
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        let layout = FactorLayout::new(input_names, output_names)?;
        validate_performances(&min_inputs, layout.n_inputs(), "minimal input")?;
        validate_performances(&max_inputs, layout.n_inputs(), "maximal input")?;
        validate_performances(&min_outputs, layout.n_outputs(), "minimal output")?;
        validate_performances(&max_outputs, layout.n_outputs(), "maximal output")?;
        let n = min_inputs.nrows();
        if [max_inputs.nrows(), min_outputs.nrows(), max_outputs.nrows()]
            .iter()
            .any(|&rows| rows != n)
        {
            return Err(RobustnessError::config(
                "all four performance matrices must describe the same DMUs",
            ));
        }
        let ordered = min_inputs
            .iter()
            .zip(&max_inputs)
            .chain(min_outputs.iter().zip(&max_outputs))
            .all(|(lo, hi)| lo <= hi);
        if !ordered {
            return Err(RobustnessError::config(
                "every performance interval needs lo <= hi",
            ));
        }
        Ok(ImpreciseCore {
            min_inputs,
            max_inputs,
            min_outputs,
            max_outputs,
            layout,
            weight_constraints: Vec::new(),
            ordinal_factors: BTreeSet::new(),
        })
    }

    fn set_ordinal_factor(&mut self, factor: &str) -> Result<()> {
        let column = self.layout.column(factor).ok_or_else(|| {
            RobustnessError::config(format!("ordinal factor `{factor}` is unknown"))
        })?;
        let (lo, hi): (Vec<f64>, Vec<f64>) = (0..self.n_dmus())
            .map(|dmu| (self.lo(dmu, column), self.hi(dmu, column)))
            .unzip();
        if lo != hi {
            return Err(RobustnessError::config(format!(
                "ordinal factor `{factor}` must carry a single rank per DMU, not an interval"
            )));
        }
        ordinal_order(&lo, factor)?;
        self.ordinal_factors.insert(factor.to_string());
        Ok(())
    }

    fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        constraint.validate_factors(|name| self.layout.column(name).is_some())?;
        self.weight_constraints.push(constraint);
        Ok(())
    }

    pub(crate) fn n_dmus(&self) -> usize {
        self.min_inputs.nrows()
    }

    pub(crate) fn layout(&self) -> &FactorLayout {
        &self.layout
    }

    pub(crate) fn weight_constraints(&self) -> &[Constraint] {
        &self.weight_constraints
    }

    pub(crate) fn is_ordinal(&self, column: usize) -> bool {
        self.ordinal_factors.contains(self.layout.name(column))
    }

    pub(crate) fn lo(&self, dmu: usize, column: usize) -> f64 {
        if self.layout.is_input(column) {
            self.min_inputs[[dmu, column]]
        } else {
            self.min_outputs[[dmu, column - self.layout.n_inputs()]]
        }
    }

    pub(crate) fn hi(&self, dmu: usize, column: usize) -> f64 {
        if self.layout.is_input(column) {
            self.max_inputs[[dmu, column]]
        } else {
            self.max_outputs[[dmu, column - self.layout.n_inputs()]]
        }
    }

    /// DMU indices of an ordinal column ordered by ascending rank.
    pub(crate) fn ordinal_ranking(&self, column: usize) -> Vec<usize> {
        let ranks: Vec<f64> = (0..self.n_dmus()).map(|dmu| self.lo(dmu, column)).collect();
        ordinal_order(&ranks, self.layout.name(column)).expect("validated at construction")
    }
}

/// Imprecise data for the additive value-based model: interval and ordinal
/// performances plus per-factor admissible value-function ranges.
#[derive(Clone, Debug)]
pub struct ImpreciseVdeaProblemData {
    core: ImpreciseCore,
    shapes: HashMap<String, ValueFunctionRange>,
}

impl ImpreciseVdeaProblemData {
    pub fn new<N1, N2>(
        min_inputs: Array2<f64>,
        min_outputs: Array2<f64>,
        max_inputs: Array2<f64>,
        max_outputs: Array2<f64>,
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        Ok(ImpreciseVdeaProblemData {
            core: ImpreciseCore::new(
                min_inputs,
                min_outputs,
                max_inputs,
                max_outputs,
                input_names,
                output_names,
            )?,
            shapes: HashMap::new(),
        })
    }

    /// Mark a factor as ordinal. Its column must carry one rank per DMU
    /// forming a permutation of `1..n`.
    pub fn set_ordinal_factor(&mut self, factor: &str) -> Result<()> {
        if self.shapes.contains_key(factor) {
            return Err(RobustnessError::config(format!(
                "ordinal factor `{factor}` cannot also carry a value function shape"
            )));
        }
        self.core.set_ordinal_factor(factor)
    }

    /// Set the admissible value-function range of a factor from lower and
    /// upper envelope characteristic points.
    pub fn set_function_range(
        &mut self,
        factor: impl Into<String>,
        lower: Vec<(f64, f64)>,
        upper: Vec<(f64, f64)>,
    ) -> Result<()> {
        let factor = factor.into();
        self.check_shape_target(&factor)?;
        let range = ValueFunctionRange::new(ValueFunction::new(lower)?, ValueFunction::new(upper)?)?;
        self.shapes.insert(factor, range);
        Ok(())
    }

    /// Set a single fixed shape (a degenerate range).
    pub fn set_function_shape(
        &mut self,
        factor: impl Into<String>,
        points: Vec<(f64, f64)>,
    ) -> Result<()> {
        let factor = factor.into();
        self.check_shape_target(&factor)?;
        self.shapes
            .insert(factor, ValueFunctionRange::fixed(ValueFunction::new(points)?));
        Ok(())
    }

    fn check_shape_target(&self, factor: &str) -> Result<()> {
        if self.core.layout.column(factor).is_none() {
            return Err(RobustnessError::config(format!(
                "value function refers to unknown factor `{factor}`"
            )));
        }
        if self.core.ordinal_factors.contains(factor) {
            return Err(RobustnessError::config(format!(
                "ordinal factor `{factor}` cannot carry a value function shape"
            )));
        }
        Ok(())
    }

    pub fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        self.core.add_weight_constraint(constraint)
    }

    pub fn n_dmus(&self) -> usize {
        self.core.n_dmus()
    }

    pub(crate) fn core(&self) -> &ImpreciseCore {
        &self.core
    }

    /// Effective value-function range of a non-ordinal column: the explicit
    /// one, or the degenerate linear normalization of the observed interval
    /// hull.
    pub(crate) fn function_range(&self, column: usize) -> ValueFunctionRange {
        let name = self.core.layout.name(column);
        if let Some(range) = self.shapes.get(name) {
            return range.clone();
        }
        let polarity = if self.core.layout.is_input(column) {
            Polarity::Cost
        } else {
            Polarity::Gain
        };
        let lo = (0..self.n_dmus())
            .map(|dmu| self.core.lo(dmu, column))
            .fold(f64::INFINITY, f64::min);
        let hi = (0..self.n_dmus())
            .map(|dmu| self.core.hi(dmu, column))
            .fold(f64::NEG_INFINITY, f64::max);
        let shape = if hi > lo {
            ValueFunction::linear(lo, hi, polarity)
        } else {
            ValueFunction::linear(lo - 1.0, lo, Polarity::Gain)
        };
        ValueFunctionRange::fixed(shape)
    }
}

/// Imprecise data for the ratio (CCR) model: interval and ordinal
/// performances, no value functions.
#[derive(Clone, Debug)]
pub struct ImpreciseCcrProblemData {
    core: ImpreciseCore,
}

impl ImpreciseCcrProblemData {
    pub fn new<N1, N2>(
        min_inputs: Array2<f64>,
        min_outputs: Array2<f64>,
        max_inputs: Array2<f64>,
        max_outputs: Array2<f64>,
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        Ok(ImpreciseCcrProblemData {
            core: ImpreciseCore::new(
                min_inputs,
                min_outputs,
                max_inputs,
                max_outputs,
                input_names,
                output_names,
            )?,
        })
    }

    pub fn set_ordinal_factor(&mut self, factor: &str) -> Result<()> {
        self.core.set_ordinal_factor(factor)
    }

    pub fn add_weight_constraint(&mut self, constraint: Constraint) -> Result<()> {
        self.core.add_weight_constraint(constraint)
    }

    pub fn n_dmus(&self) -> usize {
        self.core.n_dmus()
    }

    pub(crate) fn core(&self) -> &ImpreciseCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn robots() -> ImpreciseVdeaProblemData {
        // Two inputs (the second ordinal), one interval output, three DMUs.
        ImpreciseVdeaProblemData::new(
            array![[7.2, 2.0], [4.8, 3.0], [5.0, 1.0]],
            array![[50.0], [60.0], [40.0]],
            array![[7.2, 2.0], [4.8, 3.0], [5.0, 1.0]],
            array![[65.0], [70.0], [50.0]],
            ["cost", "reputation"],
            ["capacity"],
        )
        .unwrap()
    }

    #[test]
    fn ordinal_factors_need_rank_permutations() {
        let mut data = robots();
        assert!(data.set_ordinal_factor("reputation").is_ok());
        // The interval column is not a valid rank permutation.
        assert!(data.set_ordinal_factor("capacity").is_err());
        let column = data.core().layout().column("reputation").unwrap();
        assert!(data.core().is_ordinal(column));
        assert_eq!(data.core().ordinal_ranking(column), vec![2, 0, 1]);
    }

    #[test]
    fn shapes_and_ordinal_are_mutually_exclusive() {
        let mut data = robots();
        data.set_ordinal_factor("reputation").unwrap();
        assert!(data
            .set_function_shape("reputation", vec![(0.0, 0.0), (1.0, 1.0)])
            .is_err());
        assert!(data
            .set_function_shape("cost", vec![(4.0, 1.0), (8.0, 0.0)])
            .is_ok());
    }

    #[test]
    fn interval_order_is_validated() {
        assert!(ImpreciseCcrProblemData::new(
            array![[2.0]],
            array![[1.0]],
            array![[1.0]],
            array![[1.0]],
            ["i"],
            ["o"],
        )
        .is_err());
    }
}
