use super::{fold_programs, for_each_dmu, ExtremeValues, RunControl};
use crate::error::{PartialOutcome, Result};
use crate::models::{DistanceModel, Extremum};

/// Extreme distances to the best unit, `max_k E(k;w) − E(s;w)`, over the
/// admissible family. Defined for the value-based models.
#[derive(Clone, Debug, Default)]
pub struct ExtremeDistances {
    pub control: RunControl,
}

impl ExtremeDistances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_for_all<M: DistanceModel>(&self, model: &M) -> Result<ExtremeValues> {
        self.extremes(model, Extremum::Min)
    }

    pub fn max_for_all<M: DistanceModel>(&self, model: &M) -> Result<ExtremeValues> {
        self.extremes(model, Extremum::Max)
    }

    fn extremes<M: DistanceModel>(&self, model: &M, extremum: Extremum) -> Result<ExtremeValues> {
        let values = for_each_dmu(
            model.dmu_count(),
            &self.control,
            |subject| {
                let folded = fold_programs(
                    &model.distance_programs(subject, extremum),
                    extremum,
                    model.label(),
                    subject,
                )?;
                // The per-rival sweep measures E(rival) − E(subject); the
                // distance itself never drops below zero because the subject
                // is its own rival candidate.
                Ok(folded.max(0.0))
            },
            PartialOutcome::Values,
        )?;
        Ok(ExtremeValues::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VdeaProblemData;
    use crate::models::VdeaModel;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn aligned() -> VdeaProblemData {
        VdeaProblemData::new(
            array![[0.0], [0.5], [1.0]],
            array![[1.0], [0.5], [0.0]],
            ["i1"],
            ["o1"],
        )
        .unwrap()
    }

    #[test]
    fn distances_are_ordered_and_clamped() {
        let data = aligned();
        let model = VdeaModel::new(&data);
        let driver = ExtremeDistances::new();
        let min = driver.min_for_all(&model).unwrap();
        let max = driver.max_for_all(&model).unwrap();
        // The top unit touches the best everywhere, the bottom one is a full
        // unit away regardless of weights.
        assert_abs_diff_eq!(min.values[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.values[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(min.values[2], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.values[2], 1.0, epsilon = 1e-9);
        for subject in 0..3 {
            assert!(min.values[subject] <= max.values[subject] + 1e-9);
        }
    }
}
