//! Programs for the ratio model with imprecise information.
//!
//! Interval and ordinal performances enter through the substitution
//! `ξ_{f,k} = w_f·z_{f,k}`: interval bounds become `w_f·lo <= ξ <= w_f·hi`
//! and the ordinal rank chain `z_{next} >= ordinal_ratio·z_{prev}`,
//! `z_{lowest} >= ordinal_min`, `z_top <= 1` stays linear after scaling by
//! the factor weight. Realizations are genuine program variables, so the
//! min/max direction of each question quantifies over them exactly.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use rand_chacha::ChaCha20Rng;

use super::{
    EfficiencyModel, Extremum, ImpreciseTolerances, PairwiseTest, Quantifier, ScoreSampler,
    SmaaModel, DEFAULT_EPSILON,
};
use crate::constraint::ConstraintOperator;
use crate::data::ImpreciseCcrProblemData;
use crate::error::{Result, RobustnessError};
use crate::model::{ModelSpec, Objective, Var};
use crate::sampling::performance::{interval_draw, ordinal_draw};
use crate::sampling::{stream_rng, HitAndRun, Polytope};

/// The ratio model over imprecise problem data.
pub struct ImpreciseCcrModel<'a> {
    data: &'a ImpreciseCcrProblemData,
    tolerances: ImpreciseTolerances,
    epsilon: f64,
}

impl<'a> ImpreciseCcrModel<'a> {
    pub fn new(data: &'a ImpreciseCcrProblemData, tolerances: ImpreciseTolerances) -> Result<Self> {
        tolerances.validate()?;
        let core = data.core();
        for column in 0..core.layout().n_factors() {
            if core.is_ordinal(column) {
                continue;
            }
            if (0..core.n_dmus()).any(|dmu| core.lo(dmu, column) <= 0.0) {
                return Err(RobustnessError::config(
                    "the ratio model needs strictly positive performances",
                ));
            }
        }
        if core.weight_constraints().iter().any(|c| c.rhs() != 0.0) {
            return Err(RobustnessError::config(
                "ratio-model weight constraints must be homogeneous (rhs 0)",
            ));
        }
        Ok(ImpreciseCcrModel {
            data,
            tolerances,
            epsilon: DEFAULT_EPSILON,
        })
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    fn n_inputs(&self) -> usize {
        self.data.core().layout().n_inputs()
    }

    fn n_factors(&self) -> usize {
        self.data.core().layout().n_factors()
    }
}

struct RatioBuilder<'m> {
    model: &'m ImpreciseCcrModel<'m>,
    spec: ModelSpec,
    /// Weight variable per column of this builder's factor subset.
    weights: HashMap<usize, Var>,
    columns: Vec<usize>,
    scaled_vars: HashMap<(usize, usize), Var>,
}

impl<'m> RatioBuilder<'m> {
    /// Weights, custom rows and ordinal chains over a subset of factor
    /// columns (the full set, or one side for the separable dominance
    /// programs).
    fn new(
        model: &'m ImpreciseCcrModel<'m>,
        direction: Objective,
        columns: Vec<usize>,
        weight_floor: f64,
    ) -> Result<Self> {
        let core = model.data.core();
        let mut spec = ModelSpec::new(direction);
        let weights: HashMap<usize, Var> = columns
            .iter()
            .map(|&column| (column, spec.add_var(0.0, (weight_floor, f64::INFINITY))))
            .collect();
        for constraint in core.weight_constraints() {
            let inside = constraint.factors().all(|name| {
                weights.contains_key(&core.layout().column(name).expect("validated"))
            });
            let outside = constraint.factors().all(|name| {
                !weights.contains_key(&core.layout().column(name).expect("validated"))
            });
            if inside {
                let terms: Vec<(Var, f64)> = constraint
                    .coefficients()
                    .map(|(name, coefficient)| {
                        let column = core.layout().column(name).expect("validated");
                        (weights[&column], coefficient)
                    })
                    .collect();
                spec.add_constraint(terms, constraint.operator(), constraint.rhs());
            } else if !outside {
                return Err(RobustnessError::config(
                    "rank bounds for the ratio model need weight constraints that do not mix inputs and outputs",
                ));
            }
        }
        let mut builder = RatioBuilder {
            model,
            spec,
            weights,
            columns,
            scaled_vars: HashMap::new(),
        };
        builder.ordinal_chains();
        Ok(builder)
    }

    fn full(model: &'m ImpreciseCcrModel<'m>, direction: Objective) -> Self {
        RatioBuilder::new(
            model,
            direction,
            (0..model.n_factors()).collect(),
            model.epsilon,
        )
        .expect("the full column set never splits a constraint")
    }

    /// Scaled-performance variables and rank-ratio chains for the ordinal
    /// columns of this builder.
    fn ordinal_chains(&mut self) {
        let core = self.model.data.core();
        let tolerances = self.model.tolerances;
        for position in 0..self.columns.len() {
            let column = self.columns[position];
            if !core.is_ordinal(column) {
                continue;
            }
            let ranking = core.ordinal_ranking(column);
            let weight = self.weights[&column];
            let vars: Vec<Var> = ranking
                .iter()
                .map(|_| self.spec.add_var(0.0, (0.0, f64::INFINITY)))
                .collect();
            // Realized performances are normalized into (0, 1]: the lowest
            // rank sits above ordinal_min, each step up multiplies by at
            // least ordinal_ratio, the top never exceeds the unit scale.
            self.spec.add_constraint(
                [(weight, tolerances.ordinal_min), (vars[0], -1.0)],
                ConstraintOperator::Leq,
                0.0,
            );
            for pair in vars.windows(2) {
                self.spec.add_constraint(
                    [(pair[0], tolerances.ordinal_ratio), (pair[1], -1.0)],
                    ConstraintOperator::Leq,
                    0.0,
                );
            }
            self.spec.add_constraint(
                [(vars[ranking.len() - 1], 1.0), (weight, -1.0)],
                ConstraintOperator::Leq,
                0.0,
            );
            for (rank_position, &dmu) in ranking.iter().enumerate() {
                self.scaled_vars.insert((column, dmu), vars[rank_position]);
            }
        }
    }

    /// Terms of `w_f·z_{f,dmu}` for one column.
    fn term(&mut self, column: usize, dmu: usize) -> (Var, f64) {
        let core = self.model.data.core();
        if let Some(&var) = self.scaled_vars.get(&(column, dmu)) {
            return (var, 1.0);
        }
        let (lo, hi) = (core.lo(dmu, column), core.hi(dmu, column));
        if lo == hi {
            return (self.weights[&column], lo);
        }
        let var = self.spec.add_var(0.0, (0.0, f64::INFINITY));
        let weight = self.weights[&column];
        self.spec
            .add_constraint([(weight, lo), (var, -1.0)], ConstraintOperator::Leq, 0.0);
        self.spec
            .add_constraint([(var, 1.0), (weight, -hi)], ConstraintOperator::Leq, 0.0);
        self.scaled_vars.insert((column, dmu), var);
        (var, 1.0)
    }

    fn side_terms(&mut self, dmu: usize, inputs: bool) -> Vec<(Var, f64)> {
        let n_inputs = self.model.n_inputs();
        let columns: Vec<usize> = self
            .columns
            .iter()
            .copied()
            .filter(|&column| (column < n_inputs) == inputs)
            .collect();
        columns
            .into_iter()
            .map(|column| self.term(column, dmu))
            .collect()
    }

    /// `OUT(k) − IN(k) <= 0` for every DMU except `exclude`.
    fn ratio_rows(&mut self, exclude: Option<usize>) {
        for k in 0..self.model.data.n_dmus() {
            if Some(k) == exclude {
                continue;
            }
            let mut terms = self.side_terms(k, false);
            terms.extend(
                self.side_terms(k, true)
                    .into_iter()
                    .map(|(var, coefficient)| (var, -coefficient)),
            );
            self.spec.add_constraint(terms, ConstraintOperator::Leq, 0.0);
        }
    }

    fn add_terms_to_objective(&mut self, terms: Vec<(Var, f64)>, sign: f64) {
        for (var, coefficient) in terms {
            self.spec.add_objective(var, sign * coefficient);
        }
    }
}

impl ImpreciseCcrModel<'_> {
    fn max_program(&self, subject: usize, exclude_subject: bool) -> ModelSpec {
        let mut builder = RatioBuilder::full(self, Objective::Maximize);
        let outputs = builder.side_terms(subject, false);
        builder.add_terms_to_objective(outputs, 1.0);
        let inputs = builder.side_terms(subject, true);
        builder.spec.add_constraint(inputs, ConstraintOperator::Eq, 1.0);
        builder.ratio_rows(exclude_subject.then_some(subject));
        builder.spec
    }

    fn min_program(&self, subject: usize, best: usize) -> ModelSpec {
        let mut builder = RatioBuilder::full(self, Objective::Minimize);
        let outputs = builder.side_terms(subject, false);
        builder.add_terms_to_objective(outputs, 1.0);
        let inputs = builder.side_terms(subject, true);
        builder.spec.add_constraint(inputs, ConstraintOperator::Eq, 1.0);
        builder.ratio_rows(None);
        let mut best_terms = builder.side_terms(best, false);
        best_terms.extend(
            builder
                .side_terms(best, true)
                .into_iter()
                .map(|(var, coefficient)| (var, -coefficient)),
        );
        builder.spec.add_constraint(best_terms, ConstraintOperator::Eq, 0.0);
        builder.spec
    }
}

impl EfficiencyModel for ImpreciseCcrModel<'_> {
    fn dmu_count(&self) -> usize {
        self.data.n_dmus()
    }

    fn label(&self) -> &'static str {
        "imprecise CCR"
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
        let mut builder = RatioBuilder::full(self, direction);
        let outputs = builder.side_terms(subject, false);
        builder.add_terms_to_objective(outputs, 1.0);
        let inputs = builder.side_terms(subject, true);
        builder.spec.add_constraint(inputs, ConstraintOperator::Eq, 1.0);
        let mut rival_terms = builder.side_terms(rival, false);
        rival_terms.extend(
            builder
                .side_terms(rival, true)
                .into_iter()
                .map(|(var, coefficient)| (var, -coefficient)),
        );
        builder.spec.add_constraint(rival_terms, ConstraintOperator::Eq, 0.0);
        builder.ratio_rows(None);
        Ok(PairwiseTest {
            programs: vec![builder.spec],
            threshold: 1.0,
            holds_when_infeasible: true,
        })
    }

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
        let n_inputs = self.n_inputs();
        // Zero weight floor on both sides: the anchor rows already rule out
        // degenerate weights and a floor would turn exact ties strict.
        let mut output_side = RatioBuilder::new(
            self,
            direction,
            (n_inputs..self.n_factors()).collect(),
            0.0,
        )?;
        let terms = output_side.side_terms(subject, false);
        output_side.add_terms_to_objective(terms, 1.0);
        let anchor = output_side.side_terms(rival, false);
        output_side
            .spec
            .add_constraint(anchor, ConstraintOperator::Eq, 1.0);
        // Input side: optimize IN(rival) with IN(subject) = 1.
        let mut input_side = RatioBuilder::new(self, direction, (0..n_inputs).collect(), 0.0)?;
        let terms = input_side.side_terms(rival, true);
        input_side.add_terms_to_objective(terms, 1.0);
        let anchor = input_side.side_terms(subject, true);
        input_side
            .spec
            .add_constraint(anchor, ConstraintOperator::Eq, 1.0);
        Ok(PairwiseTest {
            programs: vec![output_side.spec, input_side.spec],
            threshold: 1.0,
            holds_when_infeasible: false,
        })
    }
}

struct ImpreciseCcrScoreSampler {
    chain: HitAndRun,
    rng: ChaCha20Rng,
    n_inputs: usize,
    n: usize,
    /// Per column: either fixed per-DMU values, interval boxes, or an
    /// ordinal draw order.
    columns: Vec<RealizedColumn>,
    ordinal_floor: f64,
}

enum RealizedColumn {
    Boxes(Vec<(f64, f64)>),
    Ordinal(Vec<usize>),
}

impl ScoreSampler for ImpreciseCcrScoreSampler {
    fn next_scores(&mut self) -> Array1<f64> {
        let weights = self.chain.draw();
        let mut realized = Array2::zeros((self.n, self.columns.len()));
        for (column, kind) in self.columns.iter().enumerate() {
            match kind {
                RealizedColumn::Boxes(boxes) => {
                    for (dmu, &(lo, hi)) in boxes.iter().enumerate() {
                        realized[[dmu, column]] = interval_draw(&mut self.rng, lo, hi);
                    }
                }
                RealizedColumn::Ordinal(ranking) => {
                    let values = ordinal_draw(&mut self.rng, ranking, self.ordinal_floor);
                    for (dmu, value) in values.into_iter().enumerate() {
                        realized[[dmu, column]] = value;
                    }
                }
            }
        }
        let mut ratios = Array1::zeros(self.n);
        for dmu in 0..self.n {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for column in 0..self.columns.len() {
                let contribution = weights[column] * realized[[dmu, column]];
                if column < self.n_inputs {
                    denominator += contribution;
                } else {
                    numerator += contribution;
                }
            }
            ratios[dmu] = numerator / denominator;
        }
        let best = ratios.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        ratios / best
    }
}

impl SmaaModel for ImpreciseCcrModel<'_> {
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>> {
        let core = self.data.core();
        let dim = self.n_factors();
        let mut polytope = Polytope::new(dim);
        polytope.add_eq(Array1::ones(dim), 1.0);
        polytope.add_nonnegativity();
        for constraint in core.weight_constraints() {
            let row = constraint.dense_row(dim, |name| core.layout().column(name))?;
            polytope.add(row, constraint.operator(), constraint.rhs());
        }
        let chain = HitAndRun::new(
            polytope,
            stream_rng(seed, stream),
            &format!("the {} sampling region", self.label()),
        )?;
        let columns = (0..dim)
            .map(|column| {
                if core.is_ordinal(column) {
                    RealizedColumn::Ordinal(core.ordinal_ranking(column))
                } else {
                    RealizedColumn::Boxes(
                        (0..core.n_dmus())
                            .map(|dmu| (core.lo(dmu, column), core.hi(dmu, column)))
                            .collect(),
                    )
                }
            })
            .collect();
        Ok(Box::new(ImpreciseCcrScoreSampler {
            chain,
            rng: stream_rng(seed, stream ^ (1 << 63)),
            n_inputs: self.n_inputs(),
            n: core.n_dmus(),
            columns,
            ordinal_floor: self.tolerances.ordinal_min.max(1e-6),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::solve;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Degenerate imprecise data equal to the toy precise problem.
    fn degenerate_toy() -> ImpreciseCcrProblemData {
        let inputs = array![
            [1.0, 2.0],
            [5.0, 7.0],
            [4.0, 2.0],
            [7.0, 4.0],
            [3.0, 8.0]
        ];
        let outputs = array![[1.0], [10.0], [5.0], [7.0], [12.0]];
        ImpreciseCcrProblemData::new(
            inputs.clone(),
            outputs.clone(),
            inputs,
            outputs,
            ["in1", "in2"],
            ["out1"],
        )
        .unwrap()
    }

    #[test]
    fn degenerate_data_reproduces_the_precise_scores() {
        let data = degenerate_toy();
        let model = ImpreciseCcrModel::new(&data, ImpreciseTolerances::default()).unwrap();
        let expected = [0.25, 0.9047, 0.625, 0.4375, 1.0];
        for (subject, &score) in expected.iter().enumerate() {
            let outcome = solve(&model.efficiency_programs(subject, Extremum::Max)[0]);
            assert_abs_diff_eq!(outcome.objective, score, epsilon = 1e-3);
        }
    }

    #[test]
    fn widening_an_output_interval_raises_the_maximum() {
        let mut max_outputs = array![[1.0], [10.0], [5.0], [7.0], [12.0]];
        max_outputs[[0, 0]] = 3.0;
        let inputs = array![
            [1.0, 2.0],
            [5.0, 7.0],
            [4.0, 2.0],
            [7.0, 4.0],
            [3.0, 8.0]
        ];
        let data = ImpreciseCcrProblemData::new(
            inputs.clone(),
            array![[1.0], [10.0], [5.0], [7.0], [12.0]],
            inputs,
            max_outputs,
            ["in1", "in2"],
            ["out1"],
        )
        .unwrap();
        let model = ImpreciseCcrModel::new(&data, ImpreciseTolerances::default()).unwrap();
        let optimistic = solve(&model.efficiency_programs(0, Extremum::Max)[0]).objective;
        assert!(optimistic > 0.25 + 0.1, "got {optimistic}");
    }

    #[test]
    fn ordinal_input_is_normalized_by_the_chain() {
        // Two DMUs identical except for an ordinal input ranking.
        let mut data = ImpreciseCcrProblemData::new(
            array![[1.0, 1.0], [1.0, 2.0]],
            array![[1.0], [1.0]],
            array![[1.0, 1.0], [1.0, 2.0]],
            array![[1.0], [1.0]],
            ["i1", "rank"],
            ["o1"],
        )
        .unwrap();
        data.set_ordinal_factor("rank").unwrap();
        let tolerances = ImpreciseTolerances {
            ordinal_ratio: 1.1,
            ordinal_min: 0.01,
            ..ImpreciseTolerances::default()
        };
        let model = ImpreciseCcrModel::new(&data, tolerances).unwrap();
        // DMU0 holds the lower rank on an input, so it can only look better:
        // its best-case relative efficiency is 1.
        let outcome = solve(&model.efficiency_programs(0, Extremum::Max)[0]);
        assert_abs_diff_eq!(outcome.objective, 1.0, epsilon = 1e-6);
    }
}
