//! Programs for the value-based model with a criteria hierarchy.
//!
//! An analysis is carried out *at* a named node: one weight variable per
//! subtree node, the subtree root normalized to 1, sibling-sum equalities for
//! every inner node, and only the custom constraints that live fully inside
//! the subtree. Efficiency contracts the leaf weights against the marginal
//! values, so analysing at the root coincides with the flat model.

use ndarray::{Array1, Array2};

use super::vdea::ValueScoreSampler;
use super::{
    DistanceModel, EfficiencyModel, Extremum, PairwiseTest, Quantifier, ScoreSampler, SmaaModel,
};
use crate::constraint::ConstraintOperator;
use crate::data::HierarchicalVdeaProblemData;
use crate::error::{Result, RobustnessError};
use crate::model::{ModelSpec, Objective, Var};
use crate::sampling::{stream_rng, HitAndRun, Polytope};

/// The hierarchical value-based model, pinned to one analysis node.
pub struct HierarchicalVdeaModel<'a> {
    data: &'a HierarchicalVdeaProblemData,
    subtree: Vec<usize>,
    /// Per-DMU score coefficients against the subtree weight variables;
    /// inner-node columns are zero.
    coefficients: Array2<f64>,
}

impl<'a> HierarchicalVdeaModel<'a> {
    pub fn new(data: &'a HierarchicalVdeaProblemData, node: &str) -> Result<Self> {
        let hierarchy = data.hierarchy();
        let root = hierarchy.node(node).ok_or_else(|| {
            RobustnessError::config(format!("hierarchy node `{node}` does not exist"))
        })?;
        let subtree = hierarchy.subtree(root);
        let values = data.vdea().value_matrix();
        let n = data.n_dmus();
        let mut coefficients = Array2::zeros((n, subtree.len()));
        for (column, &member) in subtree.iter().enumerate() {
            if hierarchy.is_leaf(member) {
                let factor = data
                    .vdea()
                    .factor_column(hierarchy.name(member))
                    .expect("hierarchy leaves are factors");
                for dmu in 0..n {
                    coefficients[[dmu, column]] = values[[dmu, factor]];
                }
            }
        }
        Ok(HierarchicalVdeaModel {
            data,
            subtree,
            coefficients,
        })
    }

    fn column_of(&self, node: usize) -> Option<usize> {
        self.subtree.iter().position(|&member| member == node)
    }

    /// Structural rows shared by programs and the sampling polytope:
    /// subtree-root normalization, sibling sums, and the custom constraints
    /// fully inside the subtree.
    fn structure(&self) -> Vec<(Array1<f64>, ConstraintOperator, f64)> {
        let dim = self.subtree.len();
        let hierarchy = self.data.hierarchy();
        let mut rows = Vec::new();
        let mut root_row = Array1::zeros(dim);
        root_row[0] = 1.0;
        rows.push((root_row, ConstraintOperator::Eq, 1.0));
        for (column, &member) in self.subtree.iter().enumerate() {
            if hierarchy.is_leaf(member) {
                continue;
            }
            let mut row = Array1::zeros(dim);
            row[column] = 1.0;
            for &child in hierarchy.children(member) {
                row[self.column_of(child).expect("children stay in the subtree")] = -1.0;
            }
            rows.push((row, ConstraintOperator::Eq, 0.0));
        }
        for constraint in self.data.vdea().weight_constraints() {
            let columns: Option<Vec<(usize, f64)>> = constraint
                .coefficients()
                .map(|(name, coefficient)| {
                    hierarchy
                        .node(name)
                        .and_then(|node| self.column_of(node))
                        .map(|column| (column, coefficient))
                })
                .collect();
            // Constraints referencing nodes outside the subtree do not bind
            // the analysis at this node.
            if let Some(columns) = columns {
                let mut row = Array1::zeros(dim);
                for (column, coefficient) in columns {
                    row[column] += coefficient;
                }
                rows.push((row, constraint.operator(), constraint.rhs()));
            }
        }
        rows
    }

    fn weight_program(
        &self,
        direction: Objective,
        objective: impl Fn(usize) -> f64,
    ) -> (ModelSpec, Vec<Var>) {
        let mut spec = ModelSpec::new(direction);
        let vars: Vec<Var> = (0..self.subtree.len())
            .map(|column| spec.add_var(objective(column), (0.0, f64::INFINITY)))
            .collect();
        for (row, operator, rhs) in self.structure() {
            let terms: Vec<(Var, f64)> = row
                .iter()
                .enumerate()
                .filter(|(_, &coefficient)| coefficient != 0.0)
                .map(|(column, &coefficient)| (vars[column], coefficient))
                .collect();
            spec.add_constraint(terms, operator, rhs);
        }
        (spec, vars)
    }

    fn weight_polytope(&self) -> Polytope {
        let mut polytope = Polytope::new(self.subtree.len());
        polytope.add_nonnegativity();
        for (row, operator, rhs) in self.structure() {
            polytope.add(row, operator, rhs);
        }
        polytope
    }
}

impl EfficiencyModel for HierarchicalVdeaModel<'_> {
    fn dmu_count(&self) -> usize {
        self.data.n_dmus()
    }

    fn label(&self) -> &'static str {
        "hierarchical VDEA"
    }

    fn efficiency_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        let direction = match extremum {
            Extremum::Min => Objective::Minimize,
            Extremum::Max => Objective::Maximize,
        };
        let (spec, _) =
            self.weight_program(direction, |column| self.coefficients[[subject, column]]);
        vec![spec]
    }

    fn preference_test(
        &self,
        subject: usize,
        rival: usize,
        quantifier: Quantifier,
    ) -> Result<PairwiseTest> {
        let direction = match quantifier {
            Quantifier::Necessary => Objective::Minimize,
            Quantifier::Possible => Objective::Maximize,
        };
        let (spec, _) = self.weight_program(direction, |column| {
            self.coefficients[[subject, column]] - self.coefficients[[rival, column]]
        });
        Ok(PairwiseTest {
            programs: vec![spec],
            threshold: 0.0,
            holds_when_infeasible: false,
        })
    }
}

impl DistanceModel for HierarchicalVdeaModel<'_> {
    fn distance_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        match extremum {
            Extremum::Min => {
                let (mut spec, vars) = self.weight_program(Objective::Minimize, |column| {
                    -self.coefficients[[subject, column]]
                });
                let best = spec.add_var(1.0, (f64::NEG_INFINITY, f64::INFINITY));
                for k in 0..self.dmu_count() {
                    let mut terms: Vec<(Var, f64)> = vars
                        .iter()
                        .enumerate()
                        .map(|(column, &var)| (var, self.coefficients[[k, column]]))
                        .collect();
                    terms.push((best, -1.0));
                    spec.add_constraint(terms, ConstraintOperator::Leq, 0.0);
                }
                vec![spec]
            }
            Extremum::Max => (0..self.dmu_count())
                .filter(|&rival| rival != subject)
                .map(|rival| {
                    let (spec, _) = self.weight_program(Objective::Maximize, |column| {
                        self.coefficients[[rival, column]] - self.coefficients[[subject, column]]
                    });
                    spec
                })
                .collect(),
        }
    }
}

impl SmaaModel for HierarchicalVdeaModel<'_> {
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>> {
        let chain = HitAndRun::new(
            self.weight_polytope(),
            stream_rng(seed, stream),
            &format!("the {} sampling region", self.label()),
        )?;
        Ok(Box::new(ValueScoreSampler {
            values: self.coefficients.clone(),
            chain,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Hierarchy;
    use crate::solve::solve;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // Two categories over two factors each; performances already on value
    // scales via explicit linear shapes.
    fn two_level() -> HierarchicalVdeaProblemData {
        let mut tree = Hierarchy::new("overall");
        tree.add_child("overall", "quality").unwrap();
        tree.add_child("quality", "q1").unwrap();
        tree.add_child("quality", "q2").unwrap();
        tree.add_child("overall", "costs").unwrap();
        tree.add_child("costs", "c1").unwrap();
        tree.add_child("costs", "c2").unwrap();
        let mut data = HierarchicalVdeaProblemData::new(
            array![[0.2, 0.4], [0.8, 0.6]],
            array![[0.9, 0.1], [0.3, 0.5]],
            ["c1", "c2"],
            ["q1", "q2"],
            tree,
        )
        .unwrap();
        for factor in ["c1", "c2"] {
            data.set_function_shape(factor, vec![(0.0, 1.0), (1.0, 0.0)])
                .unwrap();
        }
        for factor in ["q1", "q2"] {
            data.set_function_shape(factor, vec![(0.0, 0.0), (1.0, 1.0)])
                .unwrap();
        }
        data
    }

    #[test]
    fn unknown_nodes_are_rejected() {
        let data = two_level();
        assert!(HierarchicalVdeaModel::new(&data, "nope").is_err());
        assert!(HierarchicalVdeaModel::new(&data, "quality").is_ok());
    }

    #[test]
    fn root_analysis_matches_the_flat_model() {
        let data = two_level();
        let hierarchical = HierarchicalVdeaModel::new(&data, "overall").unwrap();
        let flat = crate::models::VdeaModel::new(data.vdea());
        for subject in 0..2 {
            for extremum in [Extremum::Min, Extremum::Max] {
                let tree_value =
                    solve(&hierarchical.efficiency_programs(subject, extremum)[0]).objective;
                let flat_value = solve(&flat.efficiency_programs(subject, extremum)[0]).objective;
                assert_abs_diff_eq!(tree_value, flat_value, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn subtree_analysis_renormalizes_its_leaves() {
        let data = two_level();
        let model = HierarchicalVdeaModel::new(&data, "quality").unwrap();
        // Within `quality` DMU0 scores 0.9 on q1 and 0.1 on q2; the extreme
        // efficiencies are attained at the simplex corners.
        let max = solve(&model.efficiency_programs(0, Extremum::Max)[0]).objective;
        let min = solve(&model.efficiency_programs(0, Extremum::Min)[0]).objective;
        assert_abs_diff_eq!(max, 0.9, epsilon = 1e-8);
        assert_abs_diff_eq!(min, 0.1, epsilon = 1e-8);
    }
}
