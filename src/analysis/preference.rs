use ndarray::Array2;

use super::{for_each_dmu, PreferenceMatrices, RunControl};
use crate::error::{PartialOutcome, Result};
use crate::models::{EfficiencyModel, Quantifier};

/// Necessary and possible efficiency preference relations for all ordered
/// DMU pairs. Diagonals are reflexive by definition.
#[derive(Clone, Debug)]
pub struct PreferenceRelations {
    /// Slack tolerated when comparing a pairwise optimum to its threshold.
    pub epsilon: f64,
    pub control: RunControl,
}

impl Default for PreferenceRelations {
    fn default() -> Self {
        PreferenceRelations {
            epsilon: 1e-9,
            control: RunControl::default(),
        }
    }
}

impl PreferenceRelations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn necessary_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<Array2<bool>> {
        self.relation(model, Quantifier::Necessary)
    }

    pub fn possible_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<Array2<bool>> {
        self.relation(model, Quantifier::Possible)
    }

    /// Both matrices in one call.
    pub fn check_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<PreferenceMatrices> {
        Ok(PreferenceMatrices {
            necessary: self.necessary_for_all(model)?,
            possible: self.possible_for_all(model)?,
        })
    }

    fn relation<M: EfficiencyModel>(
        &self,
        model: &M,
        quantifier: Quantifier,
    ) -> Result<Array2<bool>> {
        let n = model.dmu_count();
        let rows = for_each_dmu(
            n,
            &self.control,
            |subject| {
                let mut row = vec![true; n];
                for rival in 0..n {
                    if rival == subject {
                        continue;
                    }
                    row[rival] = model
                        .preference_test(subject, rival, quantifier)?
                        .decide(false, self.epsilon, model.label(), subject, rival)?;
                }
                Ok(row)
            },
            PartialOutcome::Relations,
        )?;
        let flat: Vec<bool> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((n, n), flat).expect("rows are rectangular"))
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
    fn toy_relations_match_the_published_pairs() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let relations = PreferenceRelations::new().check_for_all(&model).unwrap();
        let (a, d, e) = (0, 3, 4);
        assert!(relations.necessary[[e, a]]);
        assert!(relations.necessary[[e, d]]);
        assert!(!relations.necessary[[a, e]]);
    }

    #[test]
    fn necessary_implies_possible_and_diagonals_hold() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let relations = PreferenceRelations::new().check_for_all(&model).unwrap();
        for i in 0..5 {
            assert!(relations.necessary[[i, i]]);
            assert!(relations.possible[[i, i]]);
            for j in 0..5 {
                if relations.necessary[[i, j]] {
                    assert!(relations.possible[[i, j]]);
                }
            }
        }
    }

    #[test]
    fn necessary_relation_is_transitive() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let necessary = PreferenceRelations::new().necessary_for_all(&model).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    if necessary[[i, j]] && necessary[[j, k]] {
                        assert!(necessary[[i, k]], "transitivity broke at {i},{j},{k}");
                    }
                }
            }
        }
    }
}
