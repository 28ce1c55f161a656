use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;

use super::smaa::shard_sizes;
use super::{OutrankingIndices, RunControl};
use crate::error::{PartialOutcome, Result, RobustnessError};
use crate::models::SmaaModel;

/// Pairwise efficiency outranking indices: for each ordered pair `(s, t)`,
/// the share of admissible samples under which `E(s) >= E(t)`. Diagonal
/// entries are 1; ties count for both directions.
#[derive(Clone, Debug)]
pub struct SmaaPreferences {
    pub samples: usize,
    pub seed: u64,
    pub parallelism: usize,
    pub control: RunControl,
}

impl Default for SmaaPreferences {
    fn default() -> Self {
        SmaaPreferences {
            samples: 100,
            seed: 0,
            parallelism: 1,
            control: RunControl::default(),
        }
    }
}

struct PeoiPartial {
    counts: Array2<f64>,
    skipped: usize,
    /// Full samples aggregated into the pairwise counts.
    counted: usize,
    /// Set when the shard was cut short by cancellation or deadline.
    stopped: Option<RobustnessError>,
}

impl SmaaPreferences {
    pub fn new(samples: usize, seed: u64) -> Self {
        SmaaPreferences {
            samples,
            seed,
            ..SmaaPreferences::default()
        }
    }

    pub fn peoi<M: SmaaModel>(&self, model: &M) -> Result<OutrankingIndices> {
        if self.samples == 0 || self.parallelism == 0 {
            return Err(RobustnessError::config(
                "PEOI needs samples > 0 and parallelism >= 1",
            ));
        }
        let n = model.dmu_count();
        let drawn = AtomicUsize::new(0);
        let partials: Vec<Result<PeoiPartial>> = shard_sizes(self.samples, self.parallelism)
            .into_par_iter()
            .enumerate()
            .map(|(shard, size)| {
                let mut sampler = model.score_sampler(self.seed, shard as u64)?;
                let mut partial = PeoiPartial {
                    counts: Array2::zeros((n, n)),
                    skipped: 0,
                    counted: 0,
                    stopped: None,
                };
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
                    for s in 0..n {
                        for t in 0..n {
                            if scores[s] >= scores[t] {
                                partial.counts[[s, t]] += 1.0;
                            }
                        }
                    }
                    partial.counted += 1;
                }
                Ok(partial)
            })
            .collect();
        let mut counts = Array2::zeros((n, n));
        let mut skipped = 0;
        let mut counted = 0;
        let mut stopped: Option<RobustnessError> = None;
        for partial in partials {
            let partial = partial?;
            counts += &partial.counts;
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
                    counts,
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
        counts /= (self.samples - skipped) as f64;
        Ok(OutrankingIndices {
            indices: counts,
            skipped_samples: skipped,
        })
    }
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
    fn diagonal_is_one_and_pairs_complement() {
        let data = data();
        let model = VdeaModel::new(&data);
        let samples = 400;
        let result = SmaaPreferences::new(samples, 7).peoi(&model).unwrap();
        for i in 0..3 {
            assert_abs_diff_eq!(result.indices[[i, i]], 1.0);
            for j in 0..3 {
                if i != j {
                    let pair = result.indices[[i, j]] + result.indices[[j, i]];
                    // Ties are almost surely absent, so the two directions
                    // complement each other up to sampling resolution.
                    assert!(
                        (pair - 1.0).abs() <= 2.0 / samples as f64,
                        "pair sum was {pair}"
                    );
                }
            }
        }
    }

    #[test]
    fn identical_seeds_reproduce_identical_indices() {
        let data = data();
        let model = VdeaModel::new(&data);
        let driver = SmaaPreferences::new(100, 3);
        assert_eq!(
            driver.peoi(&model).unwrap().indices,
            driver.peoi(&model).unwrap().indices
        );
    }
}
