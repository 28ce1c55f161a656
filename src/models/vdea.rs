//! Programs for the additive value-based model (VDEA).
//!
//! With fixed marginal value functions the efficiency of a DMU is linear in
//! the factor weights, `E(k;w) = Σ_f w_f·u_f(p_{f,k})`, so every robustness
//! question is a small LP over the weight simplex intersected with the custom
//! constraints. The value matrix is precomputed once per model.

use ndarray::{Array1, Array2};

use super::{
    DistanceModel, EfficiencyModel, Extremum, PairwiseTest, Quantifier, ScoreSampler, SmaaModel,
};
use crate::constraint::ConstraintOperator;
use crate::data::VdeaProblemData;
use crate::error::Result;
use crate::model::{ModelSpec, Objective, Var};
use crate::sampling::{stream_rng, HitAndRun, Polytope};

/// The value-based model over precise problem data.
pub struct VdeaModel<'a> {
    data: &'a VdeaProblemData,
    values: Array2<f64>,
}

impl<'a> VdeaModel<'a> {
    pub fn new(data: &'a VdeaProblemData) -> Self {
        VdeaModel {
            data,
            values: data.value_matrix(),
        }
    }

    fn n_factors(&self) -> usize {
        self.data.n_factors()
    }

    /// Weight variables on the simplex plus the custom constraints.
    fn weight_program(
        &self,
        direction: Objective,
        objective: impl Fn(usize) -> f64,
    ) -> (ModelSpec, Vec<Var>) {
        let mut spec = ModelSpec::new(direction);
        let vars: Vec<Var> = (0..self.n_factors())
            .map(|column| spec.add_var(objective(column), (0.0, f64::INFINITY)))
            .collect();
        spec.add_constraint(
            vars.iter().map(|&var| (var, 1.0)),
            ConstraintOperator::Eq,
            1.0,
        );
        for constraint in self.data.weight_constraints() {
            let terms: Vec<(Var, f64)> = constraint
                .coefficients()
                .map(|(name, coefficient)| {
                    let column = self
                        .data
                        .factor_column(name)
                        .expect("validated at construction");
                    (vars[column], coefficient)
                })
                .collect();
            spec.add_constraint(terms, constraint.operator(), constraint.rhs());
        }
        (spec, vars)
    }

    fn weight_polytope(&self) -> Result<Polytope> {
        let dim = self.n_factors();
        let mut polytope = Polytope::new(dim);
        polytope.add_eq(Array1::ones(dim), 1.0);
        polytope.add_nonnegativity();
        for constraint in self.data.weight_constraints() {
            let row = constraint.dense_row(dim, |name| self.data.factor_column(name))?;
            polytope.add(row, constraint.operator(), constraint.rhs());
        }
        Ok(polytope)
    }
}

impl EfficiencyModel for VdeaModel<'_> {
    fn dmu_count(&self) -> usize {
        self.data.n_dmus()
    }

    fn label(&self) -> &'static str {
        "VDEA"
    }

    fn efficiency_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        let direction = match extremum {
            Extremum::Min => Objective::Minimize,
            Extremum::Max => Objective::Maximize,
        };
        let (spec, _) = self.weight_program(direction, |column| self.values[[subject, column]]);
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
            self.values[[subject, column]] - self.values[[rival, column]]
        });
        Ok(PairwiseTest {
            programs: vec![spec],
            threshold: 0.0,
            holds_when_infeasible: false,
        })
    }
}

impl DistanceModel for VdeaModel<'_> {
    fn distance_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        match extremum {
            // min_w [max_k E(k) − E(s)] with an auxiliary best-value
            // variable `z >= E(k)` that the minimization presses onto the
            // actual maximum.
            Extremum::Min => {
                let (mut spec, vars) = self.weight_program(Objective::Minimize, |column| {
                    -self.values[[subject, column]]
                });
                let best = spec.add_var(1.0, (f64::NEG_INFINITY, f64::INFINITY));
                for k in 0..self.dmu_count() {
                    let mut terms: Vec<(Var, f64)> = vars
                        .iter()
                        .enumerate()
                        .map(|(column, &var)| (var, self.values[[k, column]]))
                        .collect();
                    terms.push((best, -1.0));
                    spec.add_constraint(terms, ConstraintOperator::Leq, 0.0);
                }
                vec![spec]
            }
            // max_w,k [E(k) − E(s)], one program per rival.
            Extremum::Max => (0..self.dmu_count())
                .filter(|&rival| rival != subject)
                .map(|rival| {
                    let (spec, _) = self.weight_program(Objective::Maximize, |column| {
                        self.values[[rival, column]] - self.values[[subject, column]]
                    });
                    spec
                })
                .collect(),
        }
    }
}

pub(crate) struct ValueScoreSampler {
    pub(crate) values: Array2<f64>,
    pub(crate) chain: HitAndRun,
}

impl ScoreSampler for ValueScoreSampler {
    fn next_scores(&mut self) -> Array1<f64> {
        let weights = self.chain.draw();
        self.values.dot(&weights)
    }
}

impl SmaaModel for VdeaModel<'_> {
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>> {
        let chain = HitAndRun::new(
            self.weight_polytope()?,
            stream_rng(seed, stream),
            &format!("the {} sampling region", self.label()),
        )?;
        Ok(Box::new(ValueScoreSampler {
            values: self.values.clone(),
            chain,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::solve;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // Three DMUs on one input and one output whose default linear value
    // functions are u_in(x) = 1 − x and u_out(y) = y.
    fn aligned() -> VdeaProblemData {
        VdeaProblemData::new(
            array![[0.0], [0.5], [1.0]],
            array![[1.0], [0.5], [0.0]],
            ["i1"],
            ["o1"],
        )
        .unwrap()
    }

    #[test]
    fn aligned_units_score_independently_of_weights() {
        let data = aligned();
        let model = VdeaModel::new(&data);
        for (subject, expected) in [(0, 1.0), (1, 0.5), (2, 0.0)] {
            let max = solve(&model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            let min = solve(&model.efficiency_programs(subject, Extremum::Min)[0]).objective;
            assert_abs_diff_eq!(max, expected, epsilon = 1e-9);
            assert_abs_diff_eq!(min, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn distance_to_best_is_zero_for_the_top_unit() {
        let data = aligned();
        let model = VdeaModel::new(&data);
        let min = solve(&model.distance_programs(0, Extremum::Min)[0]).objective;
        assert_abs_diff_eq!(min, 0.0, epsilon = 1e-9);
        let worst: f64 = model
            .distance_programs(2, Extremum::Max)
            .iter()
            .map(|spec| solve(spec).objective)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_abs_diff_eq!(worst, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn weight_caps_bend_the_scores() {
        let mut data = VdeaProblemData::new(
            array![[0.0], [1.0]],
            array![[0.0], [1.0]],
            ["i1"],
            ["o1"],
        )
        .unwrap();
        // u_in: DMU0 -> 1, DMU1 -> 0; u_out: DMU0 -> 0, DMU1 -> 1.
        data.add_weight_constraint(crate::constraint::Constraint::upper_bound("i1", 0.3))
            .unwrap();
        let model = VdeaModel::new(&data);
        // DMU0 scores w_in, capped at 0.3.
        let max = solve(&model.efficiency_programs(0, Extremum::Max)[0]).objective;
        assert_abs_diff_eq!(max, 0.3, epsilon = 1e-9);
    }
}
