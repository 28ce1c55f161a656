//! Problem data for the four efficiency-model variants.
//!
//! All variants share the same backbone: dense `n × m` performance matrices
//! (rows are DMUs, columns are factors), factor-name vectors for inputs and
//! outputs, and an ordered collection of custom weight constraints. Data is
//! validated eagerly at construction and treated as immutable during analysis.

mod hierarchy;
mod imprecise;
mod problem;
mod vdea;

pub use hierarchy::Hierarchy;
pub use imprecise::{ImpreciseCcrProblemData, ImpreciseVdeaProblemData};
pub use problem::ProblemData;
pub use vdea::{
    HierarchicalVdeaProblemData, Polarity, ValueFunction, ValueFunctionRange, VdeaProblemData,
};

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::{Result, RobustnessError};

/// Factor bookkeeping shared by every data variant: input names followed by
/// output names, with a combined name → column index.
#[derive(Clone, Debug)]
pub(crate) struct FactorLayout {
    input_names: Vec<String>,
    output_names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FactorLayout {
    pub(crate) fn new<N1, N2>(
        input_names: impl IntoIterator<Item = N1>,
        output_names: impl IntoIterator<Item = N2>,
    ) -> Result<Self>
    where
        N1: Into<String>,
        N2: Into<String>,
    {
        let input_names: Vec<String> = input_names.into_iter().map(Into::into).collect();
        let output_names: Vec<String> = output_names.into_iter().map(Into::into).collect();
        if input_names.is_empty() || output_names.is_empty() {
            return Err(RobustnessError::config(
                "a problem needs at least one input and one output factor",
            ));
        }
        let mut index = HashMap::new();
        for (column, name) in input_names.iter().chain(&output_names).enumerate() {
            if index.insert(name.clone(), column).is_some() {
                return Err(RobustnessError::config(format!(
                    "factor name `{name}` is used more than once"
                )));
            }
        }
        Ok(FactorLayout {
            input_names,
            output_names,
            index,
        })
    }

    pub(crate) fn n_inputs(&self) -> usize {
        self.input_names.len()
    }

    pub(crate) fn n_outputs(&self) -> usize {
        self.output_names.len()
    }

    pub(crate) fn n_factors(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn column(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn is_input(&self, column: usize) -> bool {
        column < self.input_names.len()
    }

    pub(crate) fn name(&self, column: usize) -> &str {
        if column < self.input_names.len() {
            &self.input_names[column]
        } else {
            &self.output_names[column - self.input_names.len()]
        }
    }

    pub(crate) fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub(crate) fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

pub(crate) fn validate_performances(
    matrix: &Array2<f64>,
    expected_columns: usize,
    what: &str,
) -> Result<()> {
    if matrix.nrows() == 0 {
        return Err(RobustnessError::config(format!(
            "{what} matrix has no DMU rows"
        )));
    }
    if matrix.ncols() != expected_columns {
        return Err(RobustnessError::config(format!(
            "{what} matrix has {} columns but {expected_columns} factor names were given",
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|value| !value.is_finite()) {
        return Err(RobustnessError::config(format!(
            "{what} matrix contains a non-finite performance"
        )));
    }
    Ok(())
}

/// Check that an ordinal column carries a permutation of ranks `1..n` and
/// return the DMU indices ordered by ascending rank.
pub(crate) fn ordinal_order(column: &[f64], factor: &str) -> Result<Vec<usize>> {
    let n = column.len();
    let mut seen = vec![false; n];
    let mut order = vec![0usize; n];
    for (dmu, value) in column.iter().enumerate() {
        let rank = *value as usize;
        if *value != rank as f64 || rank < 1 || rank > n || seen[rank - 1] {
            return Err(RobustnessError::config(format!(
                "ordinal factor `{factor}` must rank DMUs with a permutation of 1..{n} (offending DMU {dmu})"
            )));
        }
        seen[rank - 1] = true;
        order[rank - 1] = dmu;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_rejects_duplicate_names() {
        assert!(FactorLayout::new(["a", "b"], ["b"]).is_err());
        assert!(FactorLayout::new(["a"], ["b"]).is_ok());
    }

    #[test]
    fn ordinal_order_wants_a_permutation() {
        assert_eq!(
            ordinal_order(&[2.0, 3.0, 1.0], "r").unwrap(),
            vec![2, 0, 1]
        );
        assert!(ordinal_order(&[1.0, 1.0, 3.0], "r").is_err());
        assert!(ordinal_order(&[0.0, 1.0, 2.0], "r").is_err());
        assert!(ordinal_order(&[1.5, 2.0, 3.0], "r").is_err());
    }
}
