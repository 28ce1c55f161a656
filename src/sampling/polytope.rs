//! Uniform sampling over convex polytopes with the hit-and-run Markov chain.
//!
//! The admissible weight regions of every model variant are polytopes
//! `{w : A_eq·w = b_eq, A_ub·w <= b_ub}`. The chain starts from a
//! Chebyshev-center point (obtained through the solver adapter), walks inside
//! the affine hull spanned by a Gram-Schmidt nullspace basis of the equality
//! rows, and draws a uniform point on the feasible segment of each random
//! direction.

use ndarray::Array1;
use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::constraint::ConstraintOperator;
use crate::error::Result;
use crate::model::{ModelSpec, Objective};
use crate::solve::solve_expecting_optimal;

const RAY_TOLERANCE: f64 = 1e-12;
const BASIS_TOLERANCE: f64 = 1e-10;

/// A convex polytope in dense row form.
#[derive(Clone, Debug, Default)]
pub(crate) struct Polytope {
    dim: usize,
    ub_rows: Vec<(Array1<f64>, f64)>,
    eq_rows: Vec<(Array1<f64>, f64)>,
}

impl Polytope {
    pub(crate) fn new(dim: usize) -> Self {
        Polytope {
            dim,
            ub_rows: Vec::new(),
            eq_rows: Vec::new(),
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.dim
    }

    /// Add `row · w <= rhs`.
    pub(crate) fn add_ub(&mut self, row: Array1<f64>, rhs: f64) {
        debug_assert_eq!(row.len(), self.dim);
        self.ub_rows.push((row, rhs));
    }

    /// Add `row · w = rhs`.
    pub(crate) fn add_eq(&mut self, row: Array1<f64>, rhs: f64) {
        debug_assert_eq!(row.len(), self.dim);
        self.eq_rows.push((row, rhs));
    }

    /// Add a generic operator row.
    pub(crate) fn add(&mut self, row: Array1<f64>, operator: ConstraintOperator, rhs: f64) {
        match operator {
            ConstraintOperator::Leq => self.add_ub(row, rhs),
            ConstraintOperator::Geq => self.add_ub(-row, -rhs),
            ConstraintOperator::Eq => self.add_eq(row, rhs),
        }
    }

    /// Add `w_j >= 0` for every coordinate.
    pub(crate) fn add_nonnegativity(&mut self) {
        for j in 0..self.dim {
            let mut row = Array1::zeros(self.dim);
            row[j] = -1.0;
            self.add_ub(row, 0.0);
        }
    }

    pub(crate) fn contains(&self, point: &Array1<f64>, tolerance: f64) -> bool {
        self.ub_rows
            .iter()
            .all(|(row, rhs)| row.dot(point) <= rhs + tolerance)
            && self
                .eq_rows
                .iter()
                .all(|(row, rhs)| (row.dot(point) - rhs).abs() <= tolerance)
    }

    /// A point in the relative interior, from the Chebyshev-center LP:
    /// maximize `r` subject to `a·w + ||a||·r <= b` and the equality rows.
    pub(crate) fn chebyshev_center(&self, context: &str) -> Result<Array1<f64>> {
        let mut spec = ModelSpec::new(Objective::Maximize);
        let w: Vec<_> = (0..self.dim)
            .map(|_| spec.add_var(0.0, (f64::NEG_INFINITY, f64::INFINITY)))
            .collect();
        let radius = spec.add_var(1.0, (0.0, 1e9));
        for (row, rhs) in &self.ub_rows {
            let norm = row.dot(row).sqrt();
            let mut terms: Vec<_> = row
                .iter()
                .enumerate()
                .map(|(j, &coefficient)| (w[j], coefficient))
                .collect();
            terms.push((radius, norm));
            spec.add_constraint(terms, ConstraintOperator::Leq, *rhs);
        }
        for (row, rhs) in &self.eq_rows {
            let terms: Vec<_> = row
                .iter()
                .enumerate()
                .map(|(j, &coefficient)| (w[j], coefficient))
                .collect();
            spec.add_constraint(terms, ConstraintOperator::Eq, *rhs);
        }
        let outcome = solve_expecting_optimal(&spec, context, None)?;
        Ok(w.iter().map(|&var| outcome.value(var)).collect())
    }

    /// Orthonormal basis of the nullspace of the equality rows: the
    /// directions along which the chain may move.
    fn affine_basis(&self) -> Vec<Array1<f64>> {
        let mut fixed: Vec<Array1<f64>> = Vec::new();
        for (row, _) in &self.eq_rows {
            if let Some(unit) = orthogonal_part(row.clone(), &fixed, &[]) {
                fixed.push(unit);
            }
        }
        let mut basis: Vec<Array1<f64>> = Vec::new();
        for j in 0..self.dim {
            let mut axis = Array1::zeros(self.dim);
            axis[j] = 1.0;
            if let Some(unit) = orthogonal_part(axis, &fixed, &basis) {
                basis.push(unit);
            }
        }
        basis
    }
}

fn orthogonal_part(
    mut vector: Array1<f64>,
    fixed: &[Array1<f64>],
    basis: &[Array1<f64>],
) -> Option<Array1<f64>> {
    for unit in fixed.iter().chain(basis) {
        let projection = unit.dot(&vector);
        vector = vector - unit * projection;
    }
    let norm = vector.dot(&vector).sqrt();
    if norm > BASIS_TOLERANCE {
        Some(vector / norm)
    } else {
        None
    }
}

/// Lifecycle of a sampler chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChainState {
    Uninitialized,
    BurningIn,
    Producing,
}

/// A hit-and-run chain over one polytope.
pub(crate) struct HitAndRun {
    polytope: Polytope,
    basis: Vec<Array1<f64>>,
    point: Array1<f64>,
    rng: ChaCha20Rng,
    state: ChainState,
}

impl HitAndRun {
    /// Build a chain seeded at the Chebyshev center. `context` labels solver
    /// failures for error reporting.
    pub(crate) fn new(polytope: Polytope, rng: ChaCha20Rng, context: &str) -> Result<Self> {
        let point = polytope.chebyshev_center(context)?;
        let basis = polytope.affine_basis();
        Ok(HitAndRun {
            polytope,
            basis,
            point,
            rng,
            state: ChainState::Uninitialized,
        })
    }

    pub(crate) fn dim(&self) -> usize {
        self.basis.len()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ChainState {
        self.state
    }

    /// Draw the next uniform point. The first call burns in `10·dim` steps;
    /// every draw thins by `max(1, dim)` steps.
    pub(crate) fn draw(&mut self) -> Array1<f64> {
        if self.state == ChainState::Uninitialized {
            self.state = ChainState::BurningIn;
            let burn_in = 10 * self.dim();
            self.advance(burn_in);
            self.state = ChainState::Producing;
        }
        self.advance(self.dim().max(1));
        self.point.clone()
    }

    fn advance(&mut self, steps: usize) {
        if self.basis.is_empty() {
            return;
        }
        for _ in 0..steps {
            self.step();
        }
    }

    fn step(&mut self) {
        let direction = self.random_direction();
        let mut t_lo = f64::NEG_INFINITY;
        let mut t_hi = f64::INFINITY;
        for (row, rhs) in &self.polytope.ub_rows {
            let speed = row.dot(&direction);
            let slack = rhs - row.dot(&self.point);
            if speed > RAY_TOLERANCE {
                t_hi = t_hi.min(slack / speed);
            } else if speed < -RAY_TOLERANCE {
                t_lo = t_lo.max(slack / speed);
            }
        }
        if !t_lo.is_finite() || !t_hi.is_finite() || t_hi <= t_lo {
            return;
        }
        let t = self.rng.gen_range(t_lo..t_hi);
        self.point = &self.point + &(direction * t);
    }

    /// Uniform direction in the affine hull: a normalized gaussian
    /// combination of the basis (Box-Muller on the injected generator).
    fn random_direction(&mut self) -> Array1<f64> {
        let mut direction: Array1<f64> = Array1::zeros(self.polytope.dim());
        for unit in &self.basis {
            let u: f64 = self.rng.gen();
            let v: f64 = self.rng.gen();
            let gaussian =
                (-2.0 * (1.0 - u).ln()).sqrt() * (std::f64::consts::TAU * v).cos();
            direction = direction + unit * gaussian;
        }
        let norm = direction.dot(&direction).sqrt();
        if norm > RAY_TOLERANCE {
            direction / norm
        } else {
            self.basis[0].clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn simplex(dim: usize) -> Polytope {
        let mut polytope = Polytope::new(dim);
        polytope.add_eq(Array1::ones(dim), 1.0);
        polytope.add_nonnegativity();
        polytope
    }

    #[test]
    fn chebyshev_center_of_the_simplex_is_interior() {
        let polytope = simplex(3);
        let center = polytope.chebyshev_center("test").unwrap();
        assert_abs_diff_eq!(center.sum(), 1.0, epsilon = 1e-6);
        assert!(center.iter().all(|&w| w > 0.1));
    }

    #[test]
    fn chain_stays_inside_and_transitions_states() {
        let polytope = simplex(4);
        let rng = ChaCha20Rng::seed_from_u64(7);
        let mut chain = HitAndRun::new(polytope.clone(), rng, "test").unwrap();
        assert_eq!(chain.state(), ChainState::Uninitialized);
        assert_eq!(chain.dim(), 3);
        for _ in 0..200 {
            let point = chain.draw();
            assert!(polytope.contains(&point, 1e-8));
        }
        assert_eq!(chain.state(), ChainState::Producing);
    }

    #[test]
    fn samples_cover_the_simplex_roughly_uniformly() {
        let polytope = simplex(2);
        let rng = ChaCha20Rng::seed_from_u64(11);
        let mut chain = HitAndRun::new(polytope, rng, "test").unwrap();
        let mean = (0..2000).map(|_| chain.draw()[0]).sum::<f64>() / 2000.0;
        // Uniform on the segment w0 + w1 = 1 has mean 1/2.
        assert!((mean - 0.5).abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn infeasible_region_is_reported() {
        let mut polytope = simplex(2);
        let mut row = Array1::zeros(2);
        row[0] = 1.0;
        polytope.add(row, ConstraintOperator::Geq, 2.0);
        let rng = ChaCha20Rng::seed_from_u64(1);
        assert!(HitAndRun::new(polytope, rng, "test").is_err());
    }
}
