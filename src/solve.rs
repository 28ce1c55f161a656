//! The narrow adapter between [`ModelSpec`] and the LP/MILP oracle.
//!
//! Everything the rest of the crate knows about the solver is the
//! [`solve`] function and the [`SolveStatus`] it reports. The oracle behind it
//! is `microlp`; no other module names it.

use crate::constraint::ConstraintOperator;
use crate::error::{Result, RobustnessError};
use crate::model::{ModelSpec, Objective, Var};

/// Solver verdict for one program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NumericalError,
}

/// Outcome of one solver call. `objective` and `values` are meaningful only
/// when `status` is [`SolveStatus::Optimal`].
#[derive(Clone, Debug)]
pub struct LpOutcome {
    pub status: SolveStatus,
    pub objective: f64,
    values: Vec<f64>,
}

impl LpOutcome {
    pub fn value(&self, var: Var) -> f64 {
        self.values[var.0]
    }

    fn failed(status: SolveStatus) -> Self {
        LpOutcome {
            status,
            objective: f64::NAN,
            values: Vec::new(),
        }
    }
}

/// Solve a single program. Never panics; solver trouble is reported through
/// the status.
pub fn solve(spec: &ModelSpec) -> LpOutcome {
    let direction = match spec.direction() {
        Objective::Minimize => microlp::OptimizationDirection::Minimize,
        Objective::Maximize => microlp::OptimizationDirection::Maximize,
    };
    let mut problem = microlp::Problem::new(direction);
    let variables: Vec<microlp::Variable> = spec
        .variables()
        .iter()
        .map(|def| {
            if def.integer {
                problem.add_integer_var(
                    def.objective,
                    (def.lower.ceil() as i32, def.upper.floor() as i32),
                )
            } else {
                problem.add_var(def.objective, (def.lower, def.upper))
            }
        })
        .collect();
    for row in spec.rows() {
        let mut expr = microlp::LinearExpr::empty();
        for (index, coefficient) in &row.terms {
            expr.add(variables[*index], *coefficient);
        }
        let operator = match row.operator {
            ConstraintOperator::Leq => microlp::ComparisonOp::Le,
            ConstraintOperator::Geq => microlp::ComparisonOp::Ge,
            ConstraintOperator::Eq => microlp::ComparisonOp::Eq,
        };
        problem.add_constraint(expr, operator, row.rhs);
    }
    match problem.solve() {
        Ok(solution) => {
            let objective = solution.objective();
            if !objective.is_finite() {
                return LpOutcome::failed(SolveStatus::NumericalError);
            }
            let values = variables.iter().map(|v| solution[*v]).collect();
            LpOutcome {
                status: SolveStatus::Optimal,
                objective,
                values,
            }
        }
        Err(microlp::Error::Infeasible) => LpOutcome::failed(SolveStatus::Infeasible),
        Err(microlp::Error::Unbounded) => LpOutcome::failed(SolveStatus::Unbounded),
        Err(_) => LpOutcome::failed(SolveStatus::NumericalError),
    }
}

/// Solve a program that is expected to be feasible and bounded, mapping the
/// other statuses to the crate error kinds. `dmu` locates the subject of the
/// question when there is one.
pub(crate) fn solve_expecting_optimal(
    spec: &ModelSpec,
    context: &str,
    dmu: Option<usize>,
) -> Result<LpOutcome> {
    let outcome = solve(spec);
    match outcome.status {
        SolveStatus::Optimal => Ok(outcome),
        SolveStatus::Infeasible => Err(RobustnessError::infeasible(context, dmu)),
        SolveStatus::Unbounded => Err(RobustnessError::unbounded(context, dmu)),
        SolveStatus::NumericalError => Err(RobustnessError::numerical(context, dmu)),
    }
}
