//! Model builders: one free-standing constructor per (efficiency model ×
//! robustness question), emitting solver-agnostic [`ModelSpec`]s.
//!
//! The analysis drivers are polymorphic over the traits below, never over
//! concrete model types. A question that sweeps a rival set returns one spec
//! per member; the driver folds the optima with the question's extremum.

mod ccr;
mod hierarchical;
mod imprecise_ccr;
mod imprecise_vdea;
mod vdea;

pub use ccr::CcrModel;
pub use hierarchical::HierarchicalVdeaModel;
pub use imprecise_ccr::ImpreciseCcrModel;
pub use imprecise_vdea::{ImpreciseTolerances, ImpreciseVdeaModel};
pub use vdea::VdeaModel;

use ndarray::Array1;

use crate::error::{Result, RobustnessError};
use crate::model::ModelSpec;
use crate::solve::{solve, SolveStatus};

/// Which end of the admissible family a question asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// Quantifier of a pairwise question: `Necessary` holds over the whole
/// admissible family, `Possible` for at least one member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Necessary,
    Possible,
}

/// A pairwise test: the product of the program optima is compared against a
/// threshold. Ratio models use two one-sided programs whose optima multiply;
/// additive models use a single difference program against threshold zero.
pub struct PairwiseTest {
    pub(crate) programs: Vec<ModelSpec>,
    pub(crate) threshold: f64,
    /// Whether the relation holds vacuously when a program is infeasible
    /// (ratio models condition on the rival being efficient, which can be
    /// unattainable).
    pub(crate) holds_when_infeasible: bool,
}

impl PairwiseTest {
    /// Solve the programs and decide the relation. `strict` asks for the
    /// product to clear the threshold by more than `epsilon`; `subject` and
    /// `rival` are the pair the test was built for and locate any solver
    /// failure.
    pub(crate) fn decide(
        &self,
        strict: bool,
        epsilon: f64,
        context: &str,
        subject: usize,
        rival: usize,
    ) -> Result<bool> {
        let pair = || format!("{context} against DMU {rival}");
        let mut product = 1.0;
        for spec in &self.programs {
            let outcome = solve(spec);
            match outcome.status {
                SolveStatus::Optimal => product *= outcome.objective,
                SolveStatus::Infeasible if self.holds_when_infeasible => return Ok(true),
                SolveStatus::Infeasible => {
                    return Err(RobustnessError::infeasible(pair(), Some(subject)))
                }
                SolveStatus::Unbounded => {
                    return Err(RobustnessError::unbounded(pair(), Some(subject)))
                }
                SolveStatus::NumericalError => {
                    return Err(RobustnessError::numerical(pair(), Some(subject)))
                }
            }
        }
        Ok(if strict {
            product > self.threshold + epsilon
        } else {
            product >= self.threshold - epsilon
        })
    }
}

/// An efficiency model family over a fixed problem: builds the programs
/// behind extreme efficiencies, preference relations and rank bounds.
pub trait EfficiencyModel: Sync {
    fn dmu_count(&self) -> usize;

    /// Short label used in error contexts.
    fn label(&self) -> &'static str;

    /// Programs whose optima fold (by `extremum`) into the extreme
    /// efficiency of `subject`. Members that are infeasible on their own are
    /// skipped by the fold; an all-infeasible family means the admissible
    /// region is empty.
    fn efficiency_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec>;

    /// The super-efficiency program, for models that define one.
    fn super_efficiency_program(&self, _subject: usize) -> Option<ModelSpec> {
        None
    }

    /// Test for `subject ≿ rival` under `quantifier`.
    fn preference_test(
        &self,
        subject: usize,
        rival: usize,
        quantifier: Quantifier,
    ) -> Result<PairwiseTest>;

    /// Test for efficiency dominance of `subject` over `rival`, the pairwise
    /// primitive behind the rank bounds. Additive models reuse the
    /// preference test; ratio models override it with the scale-separable
    /// ratio comparison.
    fn dominance_test(
        &self,
        subject: usize,
        rival: usize,
        quantifier: Quantifier,
    ) -> Result<PairwiseTest> {
        self.preference_test(subject, rival, quantifier)
    }
}

/// Models with a distance-to-the-best-unit indicator (the value-based
/// family).
pub trait DistanceModel: EfficiencyModel {
    /// Programs whose optima fold into the extreme distance of `subject`;
    /// the driver clamps the fold at zero.
    fn distance_programs(&self, subject: usize, extremum: Extremum) -> Vec<ModelSpec>;
}

/// Per-sample scorer drawn from the admissible family.
pub trait ScoreSampler: Send {
    /// Efficiency scores of all DMUs under the next admissible sample.
    fn next_scores(&mut self) -> Array1<f64>;
}

/// Models that support SMAA-style sampling of the admissible family.
pub trait SmaaModel: EfficiencyModel {
    /// A fresh sampler over stream `stream` of the given seed. Streams are
    /// independent, so parallel workers stay deterministic.
    fn score_sampler(&self, seed: u64, stream: u64) -> Result<Box<dyn ScoreSampler>>;
}

/// Shared strict-inequality tolerance; also the lower bound keeping ratio
/// weights away from zero.
pub(crate) const DEFAULT_EPSILON: f64 = 1e-9;
