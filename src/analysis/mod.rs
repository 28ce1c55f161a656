//! The analysis drivers: extreme efficiencies, extreme distances, rank
//! bounds, preference relations, SMAA distributions and pairwise outranking
//! indices.
//!
//! Drivers are polymorphic over the model traits of [`crate::models`] and
//! share one execution discipline: per-DMU questions run in parallel with
//! output in DMU-index order, numerical trouble is isolated to the affected
//! DMU as a NaN, and cancellation/deadlines are honoured between solver
//! calls and between samples.

mod extreme_distance;
mod extreme_efficiency;
mod extreme_rank;
mod peoi;
mod preference;
mod smaa;

pub use extreme_distance::ExtremeDistances;
pub use extreme_efficiency::ExtremeEfficiency;
pub use extreme_rank::ExtremeRanks;
pub use peoi::SmaaPreferences;
pub use preference::PreferenceRelations;
pub use smaa::Smaa;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{PartialOutcome, Result, RobustnessError};
use crate::model::ModelSpec;
use crate::models::Extremum;
use crate::solve::{solve, SolveStatus};

/// Cooperative cancellation flag shared with a driver call.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cancellation and deadline settings of one driver call.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl RunControl {
    pub(crate) fn check(&self, completed: usize, total: usize) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(RobustnessError::Cancelled {
                    completed,
                    total,
                    partial: PartialOutcome::None,
                });
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(RobustnessError::DeadlineExceeded {
                    completed,
                    total,
                    partial: PartialOutcome::None,
                });
            }
        }
        Ok(())
    }
}

/// Length-`n` extreme-value vector. DMUs whose programs failed numerically
/// carry NaN and are listed in `failed`; everything else is fatal.
#[derive(Clone, Debug)]
pub struct ExtremeValues {
    pub values: Vec<f64>,
    pub failed: Vec<usize>,
}

impl ExtremeValues {
    fn from_values(values: Vec<f64>) -> Self {
        let failed = values
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_nan())
            .map(|(dmu, _)| dmu)
            .collect();
        ExtremeValues { values, failed }
    }
}

/// Extreme efficiency ranks per DMU, both in `1..=n`.
#[derive(Clone, Debug)]
pub struct RankBounds {
    pub min: Vec<usize>,
    pub max: Vec<usize>,
}

/// The necessary and possible preference relations as boolean matrices with
/// reflexive diagonals.
#[derive(Clone, Debug)]
pub struct PreferenceMatrices {
    pub necessary: Array2<bool>,
    pub possible: Array2<bool>,
}

/// An `n × bins` row-stochastic histogram with per-DMU expected values.
#[derive(Clone, Debug)]
pub struct Distribution {
    pub histogram: Array2<f64>,
    pub expected: Vec<f64>,
    pub skipped_samples: usize,
}

/// Pairwise efficiency outranking indices in `[0, 1]` with a unit diagonal.
#[derive(Clone, Debug)]
pub struct OutrankingIndices {
    pub indices: Array2<f64>,
    pub skipped_samples: usize,
}

/// Run `question` for every DMU in parallel, keeping the output in DMU-index
/// order. Fatal errors win in index order; a cancellation or deadline stop
/// instead delivers the answers that did finish, packaged by `package` into
/// the stop error's [`PartialOutcome`].
pub(crate) fn for_each_dmu<T, F, P>(
    n: usize,
    control: &RunControl,
    question: F,
    package: P,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
    P: FnOnce(Vec<(usize, T)>) -> PartialOutcome,
{
    let completed = AtomicUsize::new(0);
    let outcomes: Vec<Result<T>> = (0..n)
        .into_par_iter()
        .map(|dmu| {
            control.check(completed.load(Ordering::Relaxed), n)?;
            let value = question(dmu)?;
            completed.fetch_add(1, Ordering::Relaxed);
            Ok(value)
        })
        .collect();
    let mut finished: Vec<(usize, T)> = Vec::with_capacity(n);
    let mut stop: Option<RobustnessError> = None;
    for (dmu, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => finished.push((dmu, value)),
            Err(
                error @ (RobustnessError::Cancelled { .. }
                | RobustnessError::DeadlineExceeded { .. }),
            ) => {
                if stop.is_none() {
                    stop = Some(error);
                }
            }
            Err(error) => return Err(error),
        }
    }
    if let Some(stop) = stop {
        let completed = finished.len();
        return Err(stop.with_partial(completed, n, package(finished)));
    }
    Ok(finished.into_iter().map(|(_, value)| value).collect())
}

/// Fold the optima of an extreme-value program family for one subject DMU.
/// Individually infeasible members drop out (a pinned candidate best may be
/// unattainable); an all-infeasible family means the admissible region itself
/// is empty. Numerical trouble yields NaN so the caller can isolate the DMU.
pub(crate) fn fold_programs(
    programs: &[ModelSpec],
    extremum: Extremum,
    context: &str,
    subject: usize,
) -> Result<f64> {
    let mut folded: Option<f64> = None;
    for spec in programs {
        let outcome = solve(spec);
        match outcome.status {
            SolveStatus::Optimal => {
                folded = Some(match (folded, extremum) {
                    (None, _) => outcome.objective,
                    (Some(best), Extremum::Min) => best.min(outcome.objective),
                    (Some(best), Extremum::Max) => best.max(outcome.objective),
                });
            }
            SolveStatus::Infeasible => {}
            SolveStatus::Unbounded => {
                return Err(RobustnessError::unbounded(context, Some(subject)))
            }
            SolveStatus::NumericalError => return Ok(f64::NAN),
        }
    }
    folded.ok_or_else(|| RobustnessError::infeasible(context, Some(subject)))
}
