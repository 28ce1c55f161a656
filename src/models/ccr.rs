//! Programs for the ratio (CCR) efficiency model.
//!
//! Efficiency is the relative ratio `E(s) = ratio(s) / max_k ratio(k)` with
//! `ratio(k) = u·y_k / v·x_k`, so scores live in `[0, 1]` and at least one
//! DMU attains 1 for every admissible weight vector. All programs are
//! Charnes-Cooper linearizations; the weight cone is `u, v >= ε` plus the
//! problem's custom constraints, which must be homogeneous (ratio
//! efficiencies are scale-free, so a non-zero right-hand side would not be
//! well defined).

use ndarray::{Array1, Array2};

use super::{
    EfficiencyModel, Extremum, PairwiseTest, Quantifier, ScoreSampler, SmaaModel, DEFAULT_EPSILON,
};
use crate::constraint::ConstraintOperator;
use crate::data::ProblemData;
use crate::error::{Result, RobustnessError};
use crate::model::{ModelSpec, Objective, Var};
use crate::sampling::{stream_rng, HitAndRun, Polytope};

/// The ratio model over precise problem data.
pub struct CcrModel<'a> {
    data: &'a ProblemData,
    epsilon: f64,
}

impl<'a> CcrModel<'a> {
    pub fn new(data: &'a ProblemData) -> Result<Self> {
        let all_positive = (0..data.n_dmus()).all(|dmu| {
            (0..data.n_factors()).all(|column| data.performance(dmu, column) > 0.0)
        });
        if !all_positive {
            return Err(RobustnessError::config(
                "the ratio model needs strictly positive performances",
            ));
        }
        if data.weight_constraints().iter().any(|c| c.rhs() != 0.0) {
            return Err(RobustnessError::config(
                "ratio-model weight constraints must be homogeneous (rhs 0)",
            ));
        }
        Ok(CcrModel {
            data,
            epsilon: DEFAULT_EPSILON,
        })
    }

    /// Override the weight floor / strict-inequality tolerance.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    fn n_inputs(&self) -> usize {
        self.data.n_inputs()
    }

    fn n_factors(&self) -> usize {
        self.data.n_factors()
    }

    /// One variable per factor column (inputs are `v`, outputs are `u`),
    /// bounded below by the weight floor.
    fn weight_vars(&self, spec: &mut ModelSpec, objective: impl Fn(usize) -> f64) -> Vec<Var> {
        (0..self.n_factors())
            .map(|column| spec.add_var(objective(column), (self.epsilon, f64::INFINITY)))
            .collect()
    }

    fn input_terms(&self, vars: &[Var], dmu: usize) -> Vec<(Var, f64)> {
        (0..self.n_inputs())
            .map(|column| (vars[column], self.data.performance(dmu, column)))
            .collect()
    }

    fn output_terms(&self, vars: &[Var], dmu: usize) -> Vec<(Var, f64)> {
        (self.n_inputs()..self.n_factors())
            .map(|column| (vars[column], self.data.performance(dmu, column)))
            .collect()
    }

    /// `u·y_k − v·x_k <= 0` for every DMU except `exclude`.
    fn ratio_rows(&self, spec: &mut ModelSpec, vars: &[Var], exclude: Option<usize>) {
        for k in 0..self.data.n_dmus() {
            if Some(k) == exclude {
                continue;
            }
            let mut terms = self.output_terms(vars, k);
            terms.extend(
                self.input_terms(vars, k)
                    .into_iter()
                    .map(|(var, coefficient)| (var, -coefficient)),
            );
            spec.add_constraint(terms, ConstraintOperator::Leq, 0.0);
        }
    }

    fn custom_rows(&self, spec: &mut ModelSpec, vars: &[Var]) {
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
    }

    /// Charnes-Cooper maximization for `subject`, optionally excluding it
    /// from the ratio constraints (super-efficiency).
    fn max_program(&self, subject: usize, exclude_subject: bool) -> ModelSpec {
        let mut spec = ModelSpec::new(Objective::Maximize);
        let n_inputs = self.n_inputs();
        let subject_outputs: Vec<f64> = (n_inputs..self.n_factors())
            .map(|column| self.data.performance(subject, column))
            .collect();
        let vars = self.weight_vars(&mut spec, |column| {
            if column >= n_inputs {
                subject_outputs[column - n_inputs]
            } else {
                0.0
            }
        });
        spec.add_constraint(self.input_terms(&vars, subject), ConstraintOperator::Eq, 1.0);
        self.ratio_rows(&mut spec, &vars, exclude_subject.then_some(subject));
        self.custom_rows(&mut spec, &vars);
        spec
    }

    /// Minimization of the relative efficiency of `subject` when `best` is
    /// pinned to the top of the ranking; the minimum over all candidates is
    /// the extreme value.
    fn min_program(&self, subject: usize, best: usize) -> ModelSpec {
        let mut spec = ModelSpec::new(Objective::Minimize);
        let n_inputs = self.n_inputs();
        let subject_outputs: Vec<f64> = (n_inputs..self.n_factors())
            .map(|column| self.data.performance(subject, column))
            .collect();
        let vars = self.weight_vars(&mut spec, |column| {
            if column >= n_inputs {
                subject_outputs[column - n_inputs]
            } else {
                0.0
            }
        });
        spec.add_constraint(self.input_terms(&vars, subject), ConstraintOperator::Eq, 1.0);
        self.ratio_rows(&mut spec, &vars, None);
        let mut best_terms = self.output_terms(&vars, best);
        best_terms.extend(
            self.input_terms(&vars, best)
                .into_iter()
                .map(|(var, coefficient)| (var, -coefficient)),
        );
        spec.add_constraint(best_terms, ConstraintOperator::Eq, 0.0);
        self.custom_rows(&mut spec, &vars);
        spec
    }

    /// One side of the scale-separable ratio comparison: optimize
    /// `side·weights_of(subject)` with `side·weights_of(anchor) = 1`,
    /// carrying only the custom constraints that live fully on this side.
    fn side_program(
        &self,
        inputs: bool,
        objective_dmu: usize,
        anchor_dmu: usize,
        direction: Objective,
    ) -> Result<ModelSpec> {
        let mut spec = ModelSpec::new(direction);
        let columns: Vec<usize> = if inputs {
            (0..self.n_inputs()).collect()
        } else {
            (self.n_inputs()..self.n_factors()).collect()
        };
        // No weight floor here: the anchor normalization already rules out
        // the zero vector, and a floor would perturb exact pairwise ties
        // into spurious strict dominances.
        let vars: Vec<Var> = columns
            .iter()
            .map(|&column| {
                spec.add_var(
                    self.data.performance(objective_dmu, column),
                    (0.0, f64::INFINITY),
                )
            })
            .collect();
        let anchor_terms: Vec<(Var, f64)> = columns
            .iter()
            .zip(&vars)
            .map(|(&column, &var)| (var, self.data.performance(anchor_dmu, column)))
            .collect();
        spec.add_constraint(anchor_terms, ConstraintOperator::Eq, 1.0);
        for constraint in self.data.weight_constraints() {
            let on_this_side = constraint.factors().all(|name| {
                let column = self
                    .data
                    .factor_column(name)
                    .expect("validated at construction");
                columns.contains(&column)
            });
            let on_other_side = constraint.factors().all(|name| {
                let column = self
                    .data
                    .factor_column(name)
                    .expect("validated at construction");
                !columns.contains(&column)
            });
            if on_this_side {
                let terms: Vec<(Var, f64)> = constraint
                    .coefficients()
                    .map(|(name, coefficient)| {
                        let column = self.data.factor_column(name).unwrap();
                        let position = columns.iter().position(|&c| c == column).unwrap();
                        (vars[position], coefficient)
                    })
                    .collect();
                spec.add_constraint(terms, constraint.operator(), constraint.rhs());
            } else if !on_other_side {
                return Err(RobustnessError::config(
                    "rank bounds for the ratio model need weight constraints that do not mix inputs and outputs",
                ));
            }
        }
        Ok(spec)
    }
}

impl EfficiencyModel for CcrModel<'_> {
    fn dmu_count(&self) -> usize {
        self.data.n_dmus()
    }

    fn label(&self) -> &'static str {
        "CCR"
    }

    fn efficiency_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        match extremum {
            Extremum::Max => vec![self.max_program(subject, false)],
            Extremum::Min => (0..self.data.n_dmus())
                .map(|best| self.min_program(subject, best))
                .collect(),
        }
    }

    fn super_efficiency_program(&self, subject: usize) -> Option<ModelSpec> {
        Some(self.max_program(subject, true))
    }

    /// Preference conditions on the rival showing its best face: with
    /// `ratio(t) = 1` pinned to the top of the ranking and `v·x_s = 1`, the
    /// subject's relative efficiency is `u·y_s` and the relation compares it
    /// against 1. A rival that can never be top makes the relation vacuous.
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
        let mut spec = ModelSpec::new(direction);
        let n_inputs = self.n_inputs();
        let subject_outputs: Vec<f64> = (n_inputs..self.n_factors())
            .map(|column| self.data.performance(subject, column))
            .collect();
        let vars = self.weight_vars(&mut spec, |column| {
            if column >= n_inputs {
                subject_outputs[column - n_inputs]
            } else {
                0.0
            }
        });
        spec.add_constraint(self.input_terms(&vars, subject), ConstraintOperator::Eq, 1.0);
        let mut rival_terms = self.output_terms(&vars, rival);
        rival_terms.extend(
            self.input_terms(&vars, rival)
                .into_iter()
                .map(|(var, coefficient)| (var, -coefficient)),
        );
        spec.add_constraint(rival_terms, ConstraintOperator::Eq, 0.0);
        self.ratio_rows(&mut spec, &vars, None);
        self.custom_rows(&mut spec, &vars);
        Ok(PairwiseTest {
            programs: vec![spec],
            threshold: 1.0,
            holds_when_infeasible: true,
        })
    }

    /// Dominance splits into independent input- and output-side programs:
    /// `ratio(s)/ratio(r) = (u·y_s/u·y_r)·(v·x_r/v·x_s)` and the two factors
    /// optimize separately because `u` and `v` carry independent scale
    /// freedoms.
    fn dominance_test(
        &self,
        subject: usize,
        rival: usize,
        quantifier: Quantifier,
    ) -> Result<PairwiseTest> {
        let direction = match quantifier {
            Quantifier::Necessary => Objective::Minimize,
            Quantifier::Possible => Objective::Maximize,
        };
        let output_side = self.side_program(false, subject, rival, direction)?;
        let input_side = self.side_program(true, rival, subject, direction)?;
        Ok(PairwiseTest {
            programs: vec![output_side, input_side],
            threshold: 1.0,
            holds_when_infeasible: false,
        })
    }
}

struct CcrScoreSampler {
    inputs: Array2<f64>,
    outputs: Array2<f64>,
    n_inputs: usize,
    chain: HitAndRun,
}

impl ScoreSampler for CcrScoreSampler {
    fn next_scores(&mut self) -> Array1<f64> {
        let weights = self.chain.draw();
        let v = weights.slice(ndarray::s![..self.n_inputs]);
        let u = weights.slice(ndarray::s![self.n_inputs..]);
        let numerators = self.outputs.dot(&u);
        let denominators = self.inputs.dot(&v);
        let ratios = &numerators / &denominators;
        let best = ratios.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        ratios / best
    }
}

impl SmaaModel for CcrModel<'_> {
    /// The sampling slice of the weight cone: `Σu + Σv = 1` with the custom
    /// homogeneous constraints. Relative efficiencies are scale-free, so the
    /// slice fixes the sampling measure without changing any indicator.
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>> {
        let dim = self.n_factors();
        let mut polytope = Polytope::new(dim);
        polytope.add_eq(Array1::ones(dim), 1.0);
        polytope.add_nonnegativity();
        for constraint in self.data.weight_constraints() {
            let row = constraint.dense_row(dim, |name| self.data.factor_column(name))?;
            polytope.add(row, constraint.operator(), constraint.rhs());
        }
        let chain = HitAndRun::new(
            polytope,
            stream_rng(seed, stream),
            &format!("the {} sampling region", self.label()),
        )?;
        Ok(Box::new(CcrScoreSampler {
            inputs: self.data.inputs().clone(),
            outputs: self.data.outputs().clone(),
            n_inputs: self.n_inputs(),
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

    fn toy() -> ProblemData {
        ProblemData::new(
            array![
                [1.0, 2.0],
                [5.0, 7.0],
                [4.0, 2.0],
                [7.0, 4.0],
                [3.0, 8.0]
            ],
            array![[1.0], [10.0], [5.0], [7.0], [12.0]],
            ["in1", "in2"],
            ["out1"],
        )
        .unwrap()
    }

    #[test]
    fn max_efficiency_matches_the_published_toy_scores() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let expected = [0.25, 0.9047, 0.625, 0.4375, 1.0];
        for (subject, &score) in expected.iter().enumerate() {
            let spec = &model.efficiency_programs(subject, Extremum::Max)[0];
            let outcome = solve(spec);
            assert_abs_diff_eq!(outcome.objective, score, epsilon = 1e-3);
        }
    }

    #[test]
    fn super_efficiency_exceeds_one_for_the_efficient_unit() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let spec = model.super_efficiency_program(4).unwrap();
        assert!(solve(&spec).objective > 1.0);
    }

    #[test]
    fn nonpositive_performances_are_rejected() {
        let data = ProblemData::new(
            array![[1.0], [0.0]],
            array![[1.0], [1.0]],
            ["i"],
            ["o"],
        )
        .unwrap();
        assert!(CcrModel::new(&data).is_err());
    }

    #[test]
    fn inhomogeneous_constraints_are_rejected() {
        let mut data = toy();
        data.add_weight_constraint(crate::constraint::Constraint::upper_bound("in1", 0.5))
            .unwrap();
        assert!(CcrModel::new(&data).is_err());
    }

    #[test]
    fn output_scaling_leaves_relative_efficiencies_unchanged() {
        let data = toy();
        let scaled = ProblemData::new(
            data.inputs().clone(),
            data.outputs() * 3.0,
            ["in1", "in2"],
            ["out1"],
        )
        .unwrap();
        let model = CcrModel::new(&data).unwrap();
        let scaled_model = CcrModel::new(&scaled).unwrap();
        for subject in 0..5 {
            let plain = solve(&model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            let rescaled =
                solve(&scaled_model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            assert_abs_diff_eq!(plain, rescaled, epsilon = 1e-6);
        }
    }

    #[test]
    fn implied_constraints_change_nothing() {
        let data = toy();
        let mut redundant = toy();
        // Already implied by the weight cone.
        redundant
            .add_weight_constraint(crate::constraint::Constraint::new(
                crate::constraint::ConstraintOperator::Geq,
                0.0,
                [("in1", 1.0)],
            ))
            .unwrap();
        let model = CcrModel::new(&data).unwrap();
        let redundant_model = CcrModel::new(&redundant).unwrap();
        for subject in 0..5 {
            let plain = solve(&model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            let constrained =
                solve(&redundant_model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            assert_abs_diff_eq!(plain, constrained, epsilon = 1e-9);
        }
    }
}
