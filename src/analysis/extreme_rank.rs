use super::{for_each_dmu, RankBounds, RunControl};
use crate::error::{PartialOutcome, Result};
use crate::models::{EfficiencyModel, Quantifier};

/// Extreme efficiency ranks from the pairwise dominance sweep: the best rank
/// counts the rivals that dominate the subject across the whole family, the
/// worst rank counts the rivals that beat it for at least one member. At
/// most `n − 1` pairwise tests per DMU per bound.
#[derive(Clone, Debug)]
pub struct ExtremeRanks {
    /// Margin a strict pairwise win must clear.
    pub epsilon: f64,
    pub control: RunControl,
}

impl Default for ExtremeRanks {
    fn default() -> Self {
        ExtremeRanks {
            epsilon: 1e-9,
            control: RunControl::default(),
        }
    }
}

impl ExtremeRanks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both bounds for every DMU, in index order.
    pub fn for_all<M: EfficiencyModel>(&self, model: &M) -> Result<RankBounds> {
        let n = model.dmu_count();
        let bounds = for_each_dmu(
            n,
            &self.control,
            |subject| {
                let mut always_better = 0;
                let mut sometimes_better = 0;
                for rival in 0..n {
                    if rival == subject {
                        continue;
                    }
                    if model
                        .dominance_test(rival, subject, Quantifier::Necessary)?
                        .decide(true, self.epsilon, model.label(), rival, subject)?
                    {
                        always_better += 1;
                    }
                    if model
                        .dominance_test(rival, subject, Quantifier::Possible)?
                        .decide(true, self.epsilon, model.label(), rival, subject)?
                    {
                        sometimes_better += 1;
                    }
                }
                Ok((1 + always_better, 1 + sometimes_better))
            },
            |finished| {
                PartialOutcome::Ranks(
                    finished
                        .into_iter()
                        .map(|(dmu, (min, max))| (dmu, min, max))
                        .collect(),
                )
            },
        )?;
        Ok(RankBounds {
            min: bounds.iter().map(|&(min, _)| min).collect(),
            max: bounds.iter().map(|&(_, max)| max).collect(),
        })
    }

    pub fn min_rank_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<Vec<usize>> {
        Ok(self.for_all(model)?.min)
    }

    pub fn max_rank_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<Vec<usize>> {
        Ok(self.for_all(model)?.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProblemData;
    use crate::models::CcrModel;
    use ndarray::array;

    fn toy() -> ProblemData {
        ProblemData::new(
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
        .unwrap()
    }

    #[test]
    fn bounds_are_ordered_and_in_range() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let ranks = ExtremeRanks::new().for_all(&model).unwrap();
        let n = 5;
        for subject in 0..n {
            assert!(ranks.min[subject] >= 1);
            assert!(ranks.min[subject] <= ranks.max[subject]);
            assert!(ranks.max[subject] <= n);
        }
    }

    #[test]
    fn the_strictly_efficient_unit_can_be_first() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let ranks = ExtremeRanks::new().for_all(&model).unwrap();
        // E attains efficiency 1, so nothing dominates it.
        assert_eq!(ranks.min[4], 1);
        // A is dominated by B, C and E, so it can never climb above rank 4.
        assert_eq!(ranks.min[0], 4);
        assert_eq!(ranks.max[0], 5);
    }
}
