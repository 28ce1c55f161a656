//! Programs for the value-based model with imprecise information.
//!
//! Performance intervals, ordinal factors and value-function envelopes all
//! enter the programs through scaled marginal values `ν_{f,k} = w_f·u_f(z_{f,k})`:
//! the envelope bounds scale linearly with the factor weight, interval
//! realizations widen them to the endpoint hull, disjoint intervals chain the
//! values monotonically, and ordinal factors live directly in value space
//! with rank-ratio chains. Every robustness question stays a linear program;
//! the min/max direction of the question folds the exists/for-all quantifier
//! over realizations into the optimization itself.

use std::collections::HashMap;

use ndarray::Array1;
use rand_chacha::ChaCha20Rng;

use super::{
    DistanceModel, EfficiencyModel, Extremum, PairwiseTest, Quantifier, ScoreSampler, SmaaModel,
};
use crate::constraint::ConstraintOperator;
use crate::data::{ImpreciseVdeaProblemData, Polarity, ValueFunctionRange};
use crate::error::{Result, RobustnessError};
use crate::model::{ModelSpec, Objective, Var};
use crate::sampling::performance::{interval_draw, ordinal_draw};
use crate::sampling::{stream_rng, HitAndRun, Polytope, ValueFunctionSampler};

/// Tolerances shaping the admissible region of imprecise models.
#[derive(Clone, Copy, Debug)]
pub struct ImpreciseTolerances {
    /// Minimal multiplicative gap between realized ordinal performances of
    /// DMUs adjacent in rank.
    pub ordinal_ratio: f64,
    /// Minimal realized value assignable to the lowest-ranked DMU.
    pub ordinal_min: f64,
    /// Minimal ratio between consecutive value-function increments along an
    /// ordinal axis.
    pub vf_monotonicity_ratio: f64,
}

impl Default for ImpreciseTolerances {
    fn default() -> Self {
        ImpreciseTolerances {
            ordinal_ratio: 1.0001,
            ordinal_min: 0.0,
            vf_monotonicity_ratio: 1.0,
        }
    }
}

impl ImpreciseTolerances {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.ordinal_ratio < 1.0 || self.vf_monotonicity_ratio < 1.0 || self.ordinal_min < 0.0 {
            return Err(RobustnessError::config(
                "imprecise tolerances need ordinal_ratio >= 1, vf_monotonicity_ratio >= 1 and ordinal_min >= 0",
            ));
        }
        Ok(())
    }
}

enum Column {
    /// Rank-ordered factor handled in value space. `ranking` lists DMUs by
    /// ascending rank; `ascending_value` tells whether value grows with rank
    /// (outputs) or shrinks (inputs).
    Ordinal {
        ranking: Vec<usize>,
        ascending_value: bool,
    },
    /// Cardinal factor with a value-function envelope and per-DMU
    /// performance boxes.
    Envelope {
        range: ValueFunctionRange,
        boxes: Vec<(f64, f64)>,
    },
}

/// The value-based model over imprecise problem data.
pub struct ImpreciseVdeaModel<'a> {
    data: &'a ImpreciseVdeaProblemData,
    tolerances: ImpreciseTolerances,
    columns: Vec<Column>,
}

impl<'a> ImpreciseVdeaModel<'a> {
    pub fn new(
        data: &'a ImpreciseVdeaProblemData,
        tolerances: ImpreciseTolerances,
    ) -> Result<Self> {
        tolerances.validate()?;
        let core = data.core();
        let n = core.n_dmus();
        let columns = (0..core.layout().n_factors())
            .map(|column| {
                if core.is_ordinal(column) {
                    Column::Ordinal {
                        ranking: core.ordinal_ranking(column),
                        ascending_value: !core.layout().is_input(column),
                    }
                } else {
                    Column::Envelope {
                        range: data.function_range(column),
                        boxes: (0..n)
                            .map(|dmu| (core.lo(dmu, column), core.hi(dmu, column)))
                            .collect(),
                    }
                }
            })
            .collect();
        Ok(ImpreciseVdeaModel {
            data,
            tolerances,
            columns,
        })
    }

    fn n_factors(&self) -> usize {
        self.columns.len()
    }

    fn weight_polytope(&self) -> Result<Polytope> {
        let dim = self.n_factors();
        let core = self.data.core();
        let mut polytope = Polytope::new(dim);
        polytope.add_eq(Array1::ones(dim), 1.0);
        polytope.add_nonnegativity();
        for constraint in core.weight_constraints() {
            let row = constraint.dense_row(dim, |name| core.layout().column(name))?;
            polytope.add(row, constraint.operator(), constraint.rhs());
        }
        Ok(polytope)
    }
}

/// Incremental assembly of one program: weight simplex and custom rows up
/// front, ordinal chains eagerly, scaled-value variables on demand, interval
/// ordering chains at the end.
struct ProgramBuilder<'m> {
    model: &'m ImpreciseVdeaModel<'m>,
    spec: ModelSpec,
    weights: Vec<Var>,
    ordinal_vars: HashMap<usize, Vec<Var>>,
    value_vars: HashMap<(usize, usize), Var>,
    involved: Vec<Vec<usize>>,
}

/// Contribution of one (factor, DMU) pair to a score row: either a fixed
/// multiple of the factor weight, or a dedicated scaled-value variable.
#[derive(Clone, Copy)]
enum Contribution {
    OnWeight(f64),
    OnVar(Var),
}

impl<'m> ProgramBuilder<'m> {
    fn new(model: &'m ImpreciseVdeaModel<'m>, direction: Objective) -> Self {
        let mut spec = ModelSpec::new(direction);
        let core = model.data.core();
        let weights: Vec<Var> = (0..model.n_factors())
            .map(|_| spec.add_var(0.0, (0.0, f64::INFINITY)))
            .collect();
        spec.add_constraint(
            weights.iter().map(|&var| (var, 1.0)),
            ConstraintOperator::Eq,
            1.0,
        );
        for constraint in core.weight_constraints() {
            let terms: Vec<(Var, f64)> = constraint
                .coefficients()
                .map(|(name, coefficient)| {
                    let column = core.layout().column(name).expect("validated at construction");
                    (weights[column], coefficient)
                })
                .collect();
            spec.add_constraint(terms, constraint.operator(), constraint.rhs());
        }
        let mut builder = ProgramBuilder {
            involved: vec![Vec::new(); model.n_factors()],
            model,
            spec,
            weights,
            ordinal_vars: HashMap::new(),
            value_vars: HashMap::new(),
        };
        builder.ordinal_chains();
        builder
    }

    /// Value variables and rank-ratio chains for every ordinal factor. All
    /// DMUs take part: the chain is what bounds the attainable value of any
    /// single one.
    fn ordinal_chains(&mut self) {
        let tolerances = self.model.tolerances;
        for (column, kind) in self.model.columns.iter().enumerate() {
            let Column::Ordinal {
                ranking,
                ascending_value,
            } = kind
            else {
                continue;
            };
            let vars: Vec<Var> = ranking
                .iter()
                .map(|_| self.spec.add_var(0.0, (0.0, f64::INFINITY)))
                .collect();
            let by_dmu = {
                let mut by_dmu = vec![vars[0]; ranking.len()];
                for (position, &dmu) in ranking.iter().enumerate() {
                    by_dmu[dmu] = vars[position];
                }
                by_dmu
            };
            // Walk positions in ascending value order.
            let positions: Vec<usize> = if *ascending_value {
                (0..ranking.len()).collect()
            } else {
                (0..ranking.len()).rev().collect()
            };
            let weight = self.weights[column];
            let first = vars[positions[0]];
            self.spec.add_constraint(
                [(weight, tolerances.ordinal_min), (first, -1.0)],
                ConstraintOperator::Leq,
                0.0,
            );
            for pair in positions.windows(2) {
                let (low, high) = (vars[pair[0]], vars[pair[1]]);
                self.spec.add_constraint(
                    [(low, tolerances.vf_monotonicity_ratio), (high, -1.0)],
                    ConstraintOperator::Leq,
                    0.0,
                );
            }
            let top = vars[positions[positions.len() - 1]];
            self.spec
                .add_constraint([(top, 1.0), (weight, -1.0)], ConstraintOperator::Leq, 0.0);
            self.ordinal_vars.insert(column, by_dmu);
        }
    }

    fn contribution(&mut self, column: usize, dmu: usize) -> Contribution {
        match &self.model.columns[column] {
            Column::Ordinal { .. } => Contribution::OnVar(self.ordinal_vars[&column][dmu]),
            Column::Envelope { range, boxes } => {
                let (lo, hi) = boxes[dmu];
                let floor = range.lower().evaluate(range.lower().worst_endpoint(lo, hi));
                let ceiling = range.upper().evaluate(range.upper().best_endpoint(lo, hi));
                if floor == ceiling {
                    return Contribution::OnWeight(floor);
                }
                if let Some(&var) = self.value_vars.get(&(column, dmu)) {
                    return Contribution::OnVar(var);
                }
                let var = self.spec.add_var(0.0, (0.0, f64::INFINITY));
                let weight = self.weights[column];
                self.spec.add_constraint(
                    [(weight, floor), (var, -1.0)],
                    ConstraintOperator::Leq,
                    0.0,
                );
                self.spec.add_constraint(
                    [(var, 1.0), (weight, -ceiling)],
                    ConstraintOperator::Leq,
                    0.0,
                );
                self.value_vars.insert((column, dmu), var);
                self.involved[column].push(dmu);
                Contribution::OnVar(var)
            }
        }
    }

    /// Row terms for the efficiency of `dmu`.
    fn score_terms(&mut self, dmu: usize) -> Vec<(Var, f64)> {
        (0..self.model.n_factors())
            .map(|column| match self.contribution(column, dmu) {
                Contribution::OnWeight(coefficient) => (self.weights[column], coefficient),
                Contribution::OnVar(var) => (var, 1.0),
            })
            .collect()
    }

    fn add_score_to_objective(&mut self, dmu: usize, sign: f64) {
        for (var, coefficient) in self.score_terms(dmu) {
            self.spec.add_objective(var, sign * coefficient);
        }
    }

    /// A shared monotone value function orders the values of DMUs whose
    /// performance boxes are disjoint.
    fn finish(mut self) -> ModelSpec {
        for (column, involved) in self.involved.iter().enumerate() {
            let Column::Envelope { range, boxes } = &self.model.columns[column] else {
                continue;
            };
            for (position, &a) in involved.iter().enumerate() {
                for &b in &involved[position + 1..] {
                    let (below, above) = if boxes[a].1 <= boxes[b].0 {
                        (a, b)
                    } else if boxes[b].1 <= boxes[a].0 {
                        (b, a)
                    } else {
                        continue;
                    };
                    let lower_value = match range.polarity() {
                        Polarity::Gain => below,
                        Polarity::Cost => above,
                    };
                    let higher_value = if lower_value == below { above } else { below };
                    let low_var = self.value_vars[&(column, lower_value)];
                    let high_var = self.value_vars[&(column, higher_value)];
                    self.spec.add_constraint(
                        [(low_var, 1.0), (high_var, -1.0)],
                        ConstraintOperator::Leq,
                        0.0,
                    );
                }
            }
        }
        self.spec
    }
}

impl EfficiencyModel for ImpreciseVdeaModel<'_> {
    fn dmu_count(&self) -> usize {
        self.data.n_dmus()
    }

    fn label(&self) -> &'static str {
        "imprecise VDEA"
    }

    fn efficiency_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        let direction = match extremum {
            Extremum::Min => Objective::Minimize,
            Extremum::Max => Objective::Maximize,
        };
        let mut builder = ProgramBuilder::new(self, direction);
        builder.add_score_to_objective(subject, 1.0);
        vec![builder.finish()]
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
        let mut builder = ProgramBuilder::new(self, direction);
        builder.add_score_to_objective(subject, 1.0);
        builder.add_score_to_objective(rival, -1.0);
        Ok(PairwiseTest {
            programs: vec![builder.finish()],
            threshold: 0.0,
            holds_when_infeasible: false,
        })
    }
}

impl DistanceModel for ImpreciseVdeaModel<'_> {
    fn distance_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec> {
        match extremum {
            Extremum::Min => {
                let mut builder = ProgramBuilder::new(self, Objective::Minimize);
                builder.add_score_to_objective(subject, -1.0);
                let best = builder
                    .spec
                    .add_var(1.0, (f64::NEG_INFINITY, f64::INFINITY));
                for k in 0..self.dmu_count() {
                    let mut terms = builder.score_terms(k);
                    terms.push((best, -1.0));
                    builder
                        .spec
                        .add_constraint(terms, ConstraintOperator::Leq, 0.0);
                }
                vec![builder.finish()]
            }
            Extremum::Max => (0..self.dmu_count())
                .filter(|&rival| rival != subject)
                .map(|rival| {
                    let mut builder = ProgramBuilder::new(self, Objective::Maximize);
                    builder.add_score_to_objective(rival, 1.0);
                    builder.add_score_to_objective(subject, -1.0);
                    builder.finish()
                })
                .collect(),
        }
    }
}

enum SampledColumn {
    Ordinal { draw_order: Vec<usize> },
    Envelope {
        sampler: ValueFunctionSampler,
        boxes: Vec<(f64, f64)>,
    },
}

struct ImpreciseVdeaScoreSampler {
    chain: HitAndRun,
    rng: ChaCha20Rng,
    columns: Vec<SampledColumn>,
    ordinal_floor: f64,
    n: usize,
}

impl ScoreSampler for ImpreciseVdeaScoreSampler {
    fn next_scores(&mut self) -> Array1<f64> {
        let weights = self.chain.draw();
        let mut scores = Array1::zeros(self.n);
        for (column, kind) in self.columns.iter().enumerate() {
            match kind {
                SampledColumn::Ordinal { draw_order } => {
                    let values = ordinal_draw(&mut self.rng, draw_order, self.ordinal_floor);
                    for (dmu, value) in values.into_iter().enumerate() {
                        scores[dmu] += weights[column] * value;
                    }
                }
                SampledColumn::Envelope { sampler, boxes } => {
                    let shape = sampler.sample(&mut self.rng);
                    for (dmu, &(lo, hi)) in boxes.iter().enumerate() {
                        let z = interval_draw(&mut self.rng, lo, hi);
                        scores[dmu] += weights[column] * shape.evaluate(z);
                    }
                }
            }
        }
        scores
    }
}

impl SmaaModel for ImpreciseVdeaModel<'_> {
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>> {
        let chain = HitAndRun::new(
            self.weight_polytope()?,
            stream_rng(seed, stream),
            &format!("the {} sampling region", self.label()),
        )?;
        let columns = self
            .columns
            .iter()
            .map(|kind| match kind {
                Column::Ordinal {
                    ranking,
                    ascending_value,
                } => {
                    let draw_order = if *ascending_value {
                        ranking.clone()
                    } else {
                        ranking.iter().rev().copied().collect()
                    };
                    SampledColumn::Ordinal { draw_order }
                }
                Column::Envelope { range, boxes } => SampledColumn::Envelope {
                    sampler: ValueFunctionSampler::new(range),
                    boxes: boxes.clone(),
                },
            })
            .collect();
        Ok(Box::new(ImpreciseVdeaScoreSampler {
            chain,
            // Performance and shape draws use a stream disjoint from every
            // worker's weight-chain stream.
            rng: stream_rng(seed, stream ^ (1 << 63)),
            columns,
            ordinal_floor: self.tolerances.ordinal_min,
            n: self.dmu_count(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::solve;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Degenerate imprecise data equal to the aligned precise VDEA problem.
    fn degenerate() -> ImpreciseVdeaProblemData {
        let inputs = array![[0.0], [0.5], [1.0]];
        let outputs = array![[1.0], [0.5], [0.0]];
        ImpreciseVdeaProblemData::new(
            inputs.clone(),
            outputs.clone(),
            inputs,
            outputs,
            ["i1"],
            ["o1"],
        )
        .unwrap()
    }

    #[test]
    fn degenerate_data_reduces_to_the_precise_model() {
        let data = degenerate();
        let model = ImpreciseVdeaModel::new(&data, ImpreciseTolerances::default()).unwrap();
        for (subject, expected) in [(0, 1.0), (1, 0.5), (2, 0.0)] {
            let max = solve(&model.efficiency_programs(subject, Extremum::Max)[0]).objective;
            let min = solve(&model.efficiency_programs(subject, Extremum::Min)[0]).objective;
            assert_abs_diff_eq!(max, expected, epsilon = 1e-6);
            assert_abs_diff_eq!(min, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn interval_width_spreads_the_extreme_scores() {
        // One gain output with an interval for the only DMU pair.
        let data = ImpreciseVdeaProblemData::new(
            array![[1.0], [1.0]],
            array![[0.2], [0.4]],
            array![[1.0], [1.0]],
            array![[0.8], [0.6]],
            ["i1"],
            ["o1"],
        )
        .unwrap();
        let model = ImpreciseVdeaModel::new(&data, ImpreciseTolerances::default()).unwrap();
        // The input column is constant, so only the output drives scores.
        // With the default shape over the hull [0.2, 0.8], DMU0 spans the
        // full value range and DMU1 spans [1/3, 2/3] of it.
        let max0 = solve(&model.efficiency_programs(0, Extremum::Max)[0]).objective;
        let min0 = solve(&model.efficiency_programs(0, Extremum::Min)[0]).objective;
        assert!(max0 > min0 + 0.5);
    }

    #[test]
    fn degenerate_smaa_matches_the_precise_model() {
        let data = degenerate();
        let imprecise = ImpreciseVdeaModel::new(&data, ImpreciseTolerances::default()).unwrap();
        let precise_data = crate::data::VdeaProblemData::new(
            array![[0.0], [0.5], [1.0]],
            array![[1.0], [0.5], [0.0]],
            ["i1"],
            ["o1"],
        )
        .unwrap();
        let precise = crate::models::VdeaModel::new(&precise_data);
        let smaa = crate::analysis::Smaa::new(100, 10, 5);
        let left = smaa.efficiency_distribution(&imprecise).unwrap();
        let right = smaa.efficiency_distribution(&precise).unwrap();
        for dmu in 0..3 {
            assert_abs_diff_eq!(left.expected[dmu], right.expected[dmu], epsilon = 1e-6);
        }
    }

    #[test]
    fn ordinal_chains_bound_the_subject() {
        let mut data = ImpreciseVdeaProblemData::new(
            array![[1.0], [1.0], [1.0]],
            array![[2.0], [3.0], [1.0]],
            array![[1.0], [1.0], [1.0]],
            array![[2.0], [3.0], [1.0]],
            ["i1"],
            ["rank"],
        )
        .unwrap();
        data.set_ordinal_factor("rank").unwrap();
        let model = ImpreciseVdeaModel::new(&data, ImpreciseTolerances::default()).unwrap();
        // The top-ranked DMU1 can reach the full factor weight, the
        // bottom-ranked DMU2 can be forced to zero.
        let max_top = solve(&model.efficiency_programs(1, Extremum::Max)[0]).objective;
        let min_bottom = solve(&model.efficiency_programs(2, Extremum::Min)[0]).objective;
        assert!(max_top > 0.9);
        assert!(min_bottom < 1e-6);
        // And the ordering is honoured: DMU1 is necessarily at least as
        // efficient as DMU2.
        let test = model
            .preference_test(1, 2, Quantifier::Necessary)
            .unwrap();
        assert!(test.decide(false, 1e-9, "test", 1, 2).unwrap());
    }
}
