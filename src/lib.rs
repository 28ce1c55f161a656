//! Robustness analysis for Data Envelopment Analysis.
//!
//! Given a set of decision-making units (DMUs) described by input and output
//! performances and a family of admissible efficiency models — weight
//! constraints, optionally additive value functions, a criteria hierarchy,
//! or imprecise (interval/ordinal) performances — this crate computes, for
//! every DMU, the range of efficiency-related indicators compatible with the
//! whole family, and their distributions under uniform sampling from it.
//!
//! Four efficiency models are supported: the ratio model
//! ([`CcrModel`]), the additive value-based model ([`VdeaModel`]), its
//! hierarchical variant ([`HierarchicalVdeaModel`]) and the imprecise
//! variants ([`ImpreciseVdeaModel`], [`ImpreciseCcrModel`]). Six analysis
//! drivers run against any of them: extreme efficiencies (with
//! super-efficiency for ratio models), extreme distances to the best unit,
//! extreme ranks, necessary/possible preference relations, SMAA
//! distributions and pairwise efficiency outranking indices.
//!
//! Every robustness question becomes a linear program over the admissible
//! weights (and, for imprecise data, over performance realizations and
//! value-function shapes); distributions come from hit-and-run sampling of
//! the admissible polytope with counter-based random streams, so results are
//! reproducible for a fixed seed and parallelism.
//!
//! # Example
//! ```
//! use ndarray::array;
//! use robust_dea::{CcrModel, ExtremeEfficiency, ProblemData, Smaa};
//!
//! let data = ProblemData::new(
//!     array![
//!         [1.0, 2.0],
//!         [5.0, 7.0],
//!         [4.0, 2.0],
//!         [7.0, 4.0],
//!         [3.0, 8.0]
//!     ],
//!     array![[1.0], [10.0], [5.0], [7.0], [12.0]],
//!     ["in1", "in2"],
//!     ["out1"],
//! )
//! .unwrap();
//! let model = CcrModel::new(&data).unwrap();
//!
//! let max = ExtremeEfficiency::new().max_for_all(&model).unwrap();
//! assert!((max.values[4] - 1.0).abs() < 1e-6);
//!
//! let distribution = Smaa::new(100, 10, 5).efficiency_distribution(&model).unwrap();
//! assert_eq!(distribution.histogram.nrows(), 5);
//! ```

pub mod analysis;
pub mod constraint;
pub mod data;
mod error;
pub mod model;
pub mod models;
mod sampling;
pub mod solve;

pub use analysis::{
    CancellationToken, Distribution, ExtremeDistances, ExtremeEfficiency, ExtremeRanks,
    ExtremeValues, OutrankingIndices, PreferenceMatrices, PreferenceRelations, RankBounds,
    RunControl, Smaa, SmaaPreferences,
};
pub use constraint::{Constraint, ConstraintOperator};
pub use data::{
    HierarchicalVdeaProblemData, Hierarchy, ImpreciseCcrProblemData, ImpreciseVdeaProblemData,
    Polarity, ProblemData, ValueFunction, ValueFunctionRange, VdeaProblemData,
};
pub use error::{PartialOutcome, RobustnessError};
pub use model::{ModelSpec, Objective, Var};
pub use models::{
    CcrModel, DistanceModel, EfficiencyModel, Extremum, HierarchicalVdeaModel, ImpreciseCcrModel,
    ImpreciseTolerances, ImpreciseVdeaModel, Quantifier, ScoreSampler, SmaaModel, VdeaModel,
};
pub use solve::{solve, LpOutcome, SolveStatus};
