use ndarray::Array2;
use thiserror::Error;

/// Errors reported by problem construction and by the analysis drivers.
///
/// Misuse of the construction surface (unknown factor names, malformed value
/// functions, inconsistent dimensions) is reported eagerly as [`Config`].
/// Everything else can only arise while a driver is running; solver-level
/// failures locate themselves with the model, the DMU index and, when one is
/// identifiable, the factor name. Cancellation and deadline expiry carry the
/// work finished up to the stop as a [`PartialOutcome`].
///
/// [`Config`]: RobustnessError::Config
#[derive(Error, Debug)]
pub enum RobustnessError {
    #[error("invalid problem configuration: {0}")]
    Config(String),
    #[error("the admissible region is empty while solving {}; the weight constraints are contradictory", locate(.context, .dmu, .factor))]
    InfeasibleRegion {
        context: String,
        dmu: Option<usize>,
        factor: Option<String>,
    },
    #[error("the model for {} is unbounded; the admissible region is underconstrained", locate(.context, .dmu, .factor))]
    UnboundedModel {
        context: String,
        dmu: Option<usize>,
        factor: Option<String>,
    },
    #[error("the solver reported a numerical failure for {}", locate(.context, .dmu, .factor))]
    NumericalFailure {
        context: String,
        dmu: Option<usize>,
        factor: Option<String>,
    },
    #[error("analysis cancelled after completing {completed} of {total} units")]
    Cancelled {
        completed: usize,
        total: usize,
        partial: PartialOutcome,
    },
    #[error("deadline exceeded after completing {completed} of {total} units")]
    DeadlineExceeded {
        completed: usize,
        total: usize,
        partial: PartialOutcome,
    },
    #[error("{failed} of {samples} samples failed, more than the tolerated share")]
    TooManySampleFailures { failed: usize, samples: usize },
}

/// Work a driver finished before a cancellation or deadline stop. Output
/// order still follows DMU index order; entries carry their index because a
/// stopped run may leave holes.
#[derive(Clone, Debug, Default)]
pub enum PartialOutcome {
    /// Nothing usable was finished.
    #[default]
    None,
    /// Per-DMU indicator values finished so far, as `(dmu, value)` pairs.
    Values(Vec<(usize, f64)>),
    /// Per-DMU rank bounds finished so far, as `(dmu, min, max)` triples.
    Ranks(Vec<(usize, usize, usize)>),
    /// Per-subject relation rows finished so far.
    Relations(Vec<(usize, Vec<bool>)>),
    /// Raw histogram (or pairwise) counts aggregated from the full samples
    /// drawn so far; no partially drawn sample is ever included.
    Samples { counts: Array2<f64>, drawn: usize },
}

fn locate(context: &str, dmu: &Option<usize>, factor: &Option<String>) -> String {
    let mut located = context.to_string();
    if let Some(dmu) = dmu {
        located.push_str(&format!(" (DMU {dmu})"));
    }
    if let Some(factor) = factor {
        located.push_str(&format!(" (factor `{factor}`)"));
    }
    located
}

impl RobustnessError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        RobustnessError::Config(message.into())
    }

    pub(crate) fn infeasible(context: impl Into<String>, dmu: Option<usize>) -> Self {
        RobustnessError::InfeasibleRegion {
            context: context.into(),
            dmu,
            factor: None,
        }
    }

    pub(crate) fn unbounded(context: impl Into<String>, dmu: Option<usize>) -> Self {
        RobustnessError::UnboundedModel {
            context: context.into(),
            dmu,
            factor: None,
        }
    }

    pub(crate) fn numerical(context: impl Into<String>, dmu: Option<usize>) -> Self {
        RobustnessError::NumericalFailure {
            context: context.into(),
            dmu,
            factor: None,
        }
    }

    /// Attach the finished work to a stop error; any other error passes
    /// through untouched.
    pub(crate) fn with_partial(self, completed: usize, total: usize, partial: PartialOutcome) -> Self {
        match self {
            RobustnessError::Cancelled { .. } => RobustnessError::Cancelled {
                completed,
                total,
                partial,
            },
            RobustnessError::DeadlineExceeded { .. } => RobustnessError::DeadlineExceeded {
                completed,
                total,
                partial,
            },
            other => other,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, RobustnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_locate_the_failing_unit() {
        let error = RobustnessError::infeasible("CCR", Some(3));
        assert!(error.to_string().contains("CCR (DMU 3)"));
        let error = RobustnessError::NumericalFailure {
            context: "VDEA".to_string(),
            dmu: Some(1),
            factor: Some("o1".to_string()),
        };
        assert!(error.to_string().contains("(DMU 1) (factor `o1`)"));
    }

    #[test]
    fn with_partial_only_touches_stop_errors() {
        let stopped = RobustnessError::Cancelled {
            completed: 0,
            total: 5,
            partial: PartialOutcome::None,
        }
        .with_partial(2, 5, PartialOutcome::Values(vec![(0, 0.5), (1, 0.25)]));
        match stopped {
            RobustnessError::Cancelled {
                completed,
                partial: PartialOutcome::Values(values),
                ..
            } => {
                assert_eq!(completed, 2);
                assert_eq!(values.len(), 2);
            }
            other => panic!("expected a cancelled error, got {other:?}"),
        }
        let fatal = RobustnessError::unbounded("CCR", Some(0)).with_partial(
            1,
            2,
            PartialOutcome::None,
        );
        assert!(matches!(fatal, RobustnessError::UnboundedModel { .. }));
    }
}
