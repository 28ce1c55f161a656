use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::{Distribution, RunControl};
use crate::error::{PartialOutcome, Result, RobustnessError};
use crate::models::{DistanceModel, SmaaModel};

/// Stochastic analysis over the admissible family: histograms and expected
/// values of efficiency, distance-to-best and rank, from `samples` uniform
/// draws scored analytically (no solver call inside the sample loop).
///
/// Samples are split into `parallelism` deterministic shards, each drawing
/// from its own stream of the seed, so results are a pure function of
/// `(seed, parallelism)`.
#[derive(Clone, Debug)]
pub struct Smaa {
    pub samples: usize,
    pub bins: usize,
    pub seed: u64,
    pub parallelism: usize,
    pub control: RunControl,
}

impl Default for Smaa {
    fn default() -> Self {
        Smaa {
            samples: 100,
            bins: 10,
            seed: 0,
            parallelism: 1,
            control: RunControl::default(),
        }
    }
}

/// Bin of a unit-interval indicator: bin 0 is `[0, 1/B]`, later bins are
/// half-open `((b)/B, (b+1)/B]`. A small slack keeps values that sit on a
/// boundary up to floating-point noise in the closed side.
pub(crate) fn unit_bin(value: f64, bins: usize) -> usize {
    let scaled = (value * bins as f64 - 1e-9).ceil() as i64 - 1;
    scaled.clamp(0, bins as i64 - 1) as usize
}

struct Partial {
    histogram: Array2<f64>,
    sums: Array1<f64>,
    skipped: usize,
    /// Full samples aggregated into the histogram.
    counted: usize,
    /// Set when the shard was cut short by cancellation or deadline.
    stopped: Option<RobustnessError>,
}

impl Smaa {
    pub fn new(samples: usize, bins: usize, seed: u64) -> Self {
        Smaa {
            samples,
            bins,
            seed,
            ..Smaa::default()
        }
    }

    pub fn efficiency_distribution<M: SmaaModel>(&self, model: &M) -> Result<Distribution> {
        self.distribution(model, self.bins, |scores, indicator| {
            indicator.assign(scores);
        })
    }

    /// Distance to the best unit per sample; only meaningful for models with
    /// a distance indicator.
    pub fn distance_distribution<M: SmaaModel + DistanceModel>(
        &self,
        model: &M,
    ) -> Result<Distribution> {
        self.distribution(model, self.bins, |scores, indicator| {
            let best = scores.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            for (target, &score) in indicator.iter_mut().zip(scores) {
                *target = best - score;
            }
        })
    }

    /// Rank distribution: the histogram has one bin per rank `1..=n`
    /// regardless of the `bins` setting.
    pub fn rank_distribution<M: SmaaModel>(&self, model: &M) -> Result<Distribution> {
        let n = model.dmu_count();
        let result = self.distribution_impl(
            model,
            n,
            |scores, indicator| {
                for (dmu, target) in indicator.iter_mut().enumerate() {
                    let better = scores.iter().filter(|&&other| other > scores[dmu]).count();
                    *target = (1 + better) as f64;
                }
            },
            |rank, _| (rank - 1.0).round() as usize,
        )?;
        Ok(result)
    }

    fn distribution<M: SmaaModel>(
        &self,
        model: &M,
        bins: usize,
        indicator: impl Fn(&Array1<f64>, &mut Array1<f64>) + Sync,
    ) -> Result<Distribution> {
        self.distribution_impl(model, bins, indicator, unit_bin)
    }

    fn distribution_impl<M: SmaaModel>(
        &self,
        model: &M,
        bins: usize,
        indicator: impl Fn(&Array1<f64>, &mut Array1<f64>) + Sync,
        bin_of: impl Fn(f64, usize) -> usize + Sync,
    ) -> Result<Distribution> {
        self.validate(bins)?;
        let n = model.dmu_count();
        let shard_sizes = shard_sizes(self.samples, self.parallelism);
        let drawn = AtomicUsize::new(0);
        let partials: Vec<Result<Partial>> = shard_sizes
            .into_par_iter()
            .enumerate()
            .map(|(shard, size)| {
                let mut sampler = model.score_sampler(self.seed, shard as u64)?;
                let mut partial = Partial {
                    histogram: Array2::zeros((n, bins)),
                    sums: Array1::zeros(n),
                    skipped: 0,
                    counted: 0,
                    stopped: None,
                };
                let mut indicator_values = Array1::zeros(n);
                for _ in 0..size {
                    // A stop keeps the shard's finished samples; no partial
                    // sample is ever emitted.
                    if let Err(stop) = self
                        .control
                        .check(drawn.load(Ordering::Relaxed), self.samples)
                    {
                        partial.stopped = Some(stop);
                        break;
                    }
                    let scores = sampler.next_scores();
                    drawn.fetch_add(1, Ordering::Relaxed);
                    if scores.iter().any(|score| !score.is_finite()) {
                        partial.skipped += 1;
                        continue;
                    }
                    indicator(&scores, &mut indicator_values);
                    for (dmu, &value) in indicator_values.iter().enumerate() {
                        partial.histogram[[dmu, bin_of(value, bins)]] += 1.0;
                        partial.sums[dmu] += value;
                    }
                    partial.counted += 1;
                }
                Ok(partial)
            })
            .collect();
        let mut histogram = Array2::zeros((n, bins));
        let mut sums = Array1::zeros(n);
        let mut skipped = 0;
        let mut counted = 0;
        let mut stopped: Option<RobustnessError> = None;
        for partial in partials {
            let partial = partial?;
            histogram += &partial.histogram;
            sums += &partial.sums;
            skipped += partial.skipped;
            counted += partial.counted;
            if stopped.is_none() {
                stopped = partial.stopped;
            }
        }
        if let Some(stop) = stopped {
            return Err(stop.with_partial(
                counted,
                self.samples,
                PartialOutcome::Samples {
                    counts: histogram,
                    drawn: counted,
                },
            ));
        }
        if skipped * 10 > self.samples {
            return Err(RobustnessError::TooManySampleFailures {
                failed: skipped,
                samples: self.samples,
            });
        }
        let effective = (self.samples - skipped) as f64;
        histogram /= effective;
        Ok(Distribution {
            histogram,
            expected: (sums / effective).to_vec(),
            skipped_samples: skipped,
        })
    }

    fn validate(&self, bins: usize) -> Result<()> {
        if self.samples == 0 || bins == 0 || self.parallelism == 0 {
            return Err(RobustnessError::config(
                "SMAA needs samples > 0, bins > 0 and parallelism >= 1",
            ));
        }
        Ok(())
    }
}

/// Deterministic split of `samples` into `parallelism` shard sizes.
pub(crate) fn shard_sizes(samples: usize, parallelism: usize) -> Vec<usize> {
    let base = samples / parallelism;
    let extra = samples % parallelism;
    (0..parallelism)
        .map(|shard| base + usize::from(shard < extra))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VdeaProblemData;
    use crate::models::VdeaModel;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn data() -> VdeaProblemData {
        VdeaProblemData::new(
            array![[0.1, 0.9], [0.8, 0.3], [0.5, 0.5]],
            array![[0.7], [0.6], [0.2]],
            ["i1", "i2"],
            ["o1"],
        )
        .unwrap()
    }

    #[test]
    fn unit_bins_are_right_closed() {
        assert_eq!(unit_bin(0.0, 10), 0);
        assert_eq!(unit_bin(0.1, 10), 0);
        assert_eq!(unit_bin(0.1000001, 10), 1);
        assert_eq!(unit_bin(1.0, 10), 9);
        assert_eq!(unit_bin(0.30000000000000004, 10), 2);
    }

    #[test]
    fn rows_sum_to_one_and_expectations_are_bracketed() {
        let data = data();
        let model = VdeaModel::new(&data);
        let smaa = Smaa::new(200, 10, 5);
        let distribution = smaa.efficiency_distribution(&model).unwrap();
        for dmu in 0..3 {
            let row_sum: f64 = distribution.histogram.row(dmu).sum();
            assert_abs_diff_eq!(row_sum, 1.0, epsilon = 1e-9);
            assert!(distribution.expected[dmu] >= 0.0);
            assert!(distribution.expected[dmu] <= 1.0);
        }
        assert_eq!(distribution.skipped_samples, 0);
    }

    #[test]
    fn identical_seeds_reproduce_identical_results() {
        let data = data();
        let model = VdeaModel::new(&data);
        let smaa = Smaa::new(100, 10, 5);
        let first = smaa.efficiency_distribution(&model).unwrap();
        let second = smaa.efficiency_distribution(&model).unwrap();
        assert_eq!(first.histogram, second.histogram);
        assert_eq!(first.expected, second.expected);
    }

    #[test]
    fn rank_distribution_uses_one_bin_per_rank() {
        let data = data();
        let model = VdeaModel::new(&data);
        let smaa = Smaa::new(150, 10, 9);
        let ranks = smaa.rank_distribution(&model).unwrap();
        assert_eq!(ranks.histogram.ncols(), 3);
        for dmu in 0..3 {
            assert!(ranks.expected[dmu] >= 1.0);
            assert!(ranks.expected[dmu] <= 3.0);
        }
    }

    #[test]
    fn ratio_model_distributions_are_row_stochastic() {
        let data = crate::data::ProblemData::new(
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
        .unwrap();
        let model = crate::models::CcrModel::new(&data).unwrap();
        let distribution = Smaa::new(200, 10, 5).efficiency_distribution(&model).unwrap();
        for dmu in 0..5 {
            assert_abs_diff_eq!(distribution.histogram.row(dmu).sum(), 1.0, epsilon = 1e-9);
            assert!(distribution.expected[dmu] > 0.0);
            assert!(distribution.expected[dmu] <= 1.0 + 1e-12);
        }
        // E attains relative efficiency 1 on a fat region of the cone, A
        // never gets close.
        assert!(distribution.expected[4] > distribution.expected[0]);
    }

    #[test]
    fn sharded_runs_depend_only_on_seed_and_parallelism() {
        let data = data();
        let model = VdeaModel::new(&data);
        let sharded = Smaa {
            parallelism: 3,
            ..Smaa::new(90, 10, 11)
        };
        let first = sharded.efficiency_distribution(&model).unwrap();
        let second = sharded.efficiency_distribution(&model).unwrap();
        assert_eq!(first.histogram, second.histogram);
        assert_eq!(first.expected, second.expected);
    }

    #[test]
    fn shards_partition_the_samples() {
        assert_eq!(shard_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(shard_sizes(4, 8), vec![1, 1, 1, 1, 0, 0, 0, 0]);
    }
}
