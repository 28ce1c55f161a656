//! Sampling of value-function realizations from an admissible envelope.
//!
//! A realization is monotone piecewise-linear with `lower <= u <= upper` at
//! every breakpoint. Draws walk the breakpoints from the 0-valued end towards
//! the 1-valued end (ascending abscissae for gain factors, descending for
//! cost factors), so the only bound carried along is the previously drawn
//! value; the envelopes are themselves monotone, which keeps the remaining
//! interval nonempty.

use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::data::{Polarity, ValueFunction, ValueFunctionRange};

pub(crate) struct ValueFunctionSampler {
    xs: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    polarity: Polarity,
    fixed: bool,
}

impl ValueFunctionSampler {
    pub(crate) fn new(range: &ValueFunctionRange) -> Self {
        let xs = range.lower().points().iter().map(|p| p.0).collect();
        let lower: Vec<f64> = range.lower().points().iter().map(|p| p.1).collect();
        let upper: Vec<f64> = range.upper().points().iter().map(|p| p.1).collect();
        let fixed = lower == upper;
        ValueFunctionSampler {
            xs,
            lower,
            upper,
            polarity: range.polarity(),
            fixed,
        }
    }

    pub(crate) fn sample(&self, rng: &mut ChaCha20Rng) -> ValueFunction {
        if self.fixed {
            let points = self.xs.iter().copied().zip(self.lower.iter().copied()).collect();
            return ValueFunction::raw(points, self.polarity);
        }
        let k = self.xs.len();
        let mut drawn = vec![0.0; k];
        let order: Vec<usize> = match self.polarity {
            Polarity::Gain => (0..k).collect(),
            Polarity::Cost => (0..k).rev().collect(),
        };
        let mut previous = 0.0;
        for &index in &order {
            let floor = self.lower[index].max(previous);
            let ceiling = self.upper[index].max(floor);
            drawn[index] = if ceiling > floor {
                rng.gen_range(floor..ceiling)
            } else {
                floor
            };
            previous = drawn[index];
        }
        let points = self.xs.iter().copied().zip(drawn).collect();
        ValueFunction::raw(points, self.polarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ValueFunction;
    use rand::SeedableRng;

    fn range() -> ValueFunctionRange {
        ValueFunctionRange::new(
            ValueFunction::new(vec![(0.0, 0.0), (1.0, 0.2), (2.0, 0.5), (3.0, 1.0)]).unwrap(),
            ValueFunction::new(vec![(0.0, 0.0), (1.0, 0.4), (2.0, 0.9), (3.0, 1.0)]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn realizations_stay_inside_the_envelope_and_monotone() {
        let sampler = ValueFunctionSampler::new(&range());
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for _ in 0..100 {
            let realization = sampler.sample(&mut rng);
            let values: Vec<f64> = realization.points().iter().map(|p| p.1).collect();
            assert!(values.windows(2).all(|w| w[1] >= w[0]));
            assert!((0.2..=0.4).contains(&values[1]));
            assert!((0.5..=0.9).contains(&values[2]));
            assert_eq!(values[0], 0.0);
            assert_eq!(values[3], 1.0);
        }
    }

    #[test]
    fn cost_envelopes_walk_descending() {
        let range = ValueFunctionRange::new(
            ValueFunction::new(vec![(10.0, 1.0), (25.0, 0.4), (70.0, 0.0)]).unwrap(),
            ValueFunction::new(vec![(10.0, 1.0), (25.0, 0.5), (70.0, 0.0)]).unwrap(),
        )
        .unwrap();
        let sampler = ValueFunctionSampler::new(&range);
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        for _ in 0..50 {
            let realization = sampler.sample(&mut rng);
            let values: Vec<f64> = realization.points().iter().map(|p| p.1).collect();
            assert!(values.windows(2).all(|w| w[1] <= w[0]));
            assert!((0.4..=0.5).contains(&values[1]));
        }
    }

    #[test]
    fn fixed_shapes_sample_to_themselves() {
        let shape = ValueFunction::new(vec![(0.0, 0.0), (2.0, 1.0)]).unwrap();
        let sampler = ValueFunctionSampler::new(&ValueFunctionRange::fixed(shape.clone()));
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let realization = sampler.sample(&mut rng);
        assert_eq!(realization.points(), shape.points());
    }
}
