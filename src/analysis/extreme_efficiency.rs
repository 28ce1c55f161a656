use super::{fold_programs, for_each_dmu, ExtremeValues, RunControl};
use crate::error::{PartialOutcome, Result, RobustnessError};
use crate::models::{EfficiencyModel, Extremum};
use crate::solve::solve_expecting_optimal;

/// Extreme efficiency scores over the admissible family.
#[derive(Clone, Debug, Default)]
pub struct ExtremeEfficiency {
    pub control: RunControl,
}

impl ExtremeEfficiency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal efficiency of every DMU, in index order.
    pub fn min_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<ExtremeValues> {
        self.extremes(model, Extremum::Min)
    }

    /// Maximal efficiency of every DMU, in index order.
    pub fn max_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<ExtremeValues> {
        self.extremes(model, Extremum::Max)
    }

    /// Super-efficiency of every DMU (the subject leaves its own constraint
    /// set); only ratio models define it.
    pub fn super_for_all<M: EfficiencyModel>(&self, model: &M) -> Result<ExtremeValues> {
        let values = for_each_dmu(
            model.dmu_count(),
            &self.control,
            |subject| {
                let spec = model.super_efficiency_program(subject).ok_or_else(|| {
                    RobustnessError::config(format!(
                        "super-efficiency is not defined for the {} model",
                        model.label()
                    ))
                })?;
                match solve_expecting_optimal(&spec, model.label(), Some(subject)) {
                    Ok(outcome) => Ok(outcome.objective),
                    Err(RobustnessError::NumericalFailure { .. }) => Ok(f64::NAN),
                    Err(error) => Err(error),
                }
            },
            PartialOutcome::Values,
        )?;
        Ok(ExtremeValues::from_values(values))
    }

    fn extremes<M: EfficiencyModel>(&self, model: &M, extremum: Extremum) -> Result<ExtremeValues> {
        let values = for_each_dmu(
            model.dmu_count(),
            &self.control,
            |subject| {
                fold_programs(
                    &model.efficiency_programs(subject, extremum),
                    extremum,
                    model.label(),
                    subject,
                )
            },
            PartialOutcome::Values,
        )?;
        Ok(ExtremeValues::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProblemData;
    use crate::models::CcrModel;
    use approx::assert_abs_diff_eq;
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
    fn toy_extremes_bracket_each_unit() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let driver = ExtremeEfficiency::new();
        let max = driver.max_for_all(&model).unwrap();
        let min = driver.min_for_all(&model).unwrap();
        let expected_max = [0.25, 0.9047, 0.625, 0.4375, 1.0];
        for subject in 0..5 {
            assert_abs_diff_eq!(max.values[subject], expected_max[subject], epsilon = 1e-3);
            assert!(min.values[subject] <= max.values[subject] + 1e-9);
            assert!(min.values[subject] >= 0.0);
        }
        assert!(max.failed.is_empty());
    }

    #[test]
    fn super_efficiency_only_exceeds_one_for_efficient_units() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let driver = ExtremeEfficiency::new();
        let super_eff = driver.super_for_all(&model).unwrap();
        assert!(super_eff.values[4] > 1.0);
        for subject in 0..4 {
            assert!(super_eff.values[subject] < 1.0);
        }
    }

    #[test]
    fn cancellation_stops_the_driver_and_delivers_partials() {
        let data = toy();
        let model = CcrModel::new(&data).unwrap();
        let token = super::super::CancellationToken::new();
        token.cancel();
        let driver = ExtremeEfficiency {
            control: RunControl {
                cancel: Some(token),
                deadline: None,
            },
        };
        match driver.max_for_all(&model) {
            Err(RobustnessError::Cancelled {
                completed,
                total,
                partial: PartialOutcome::Values(values),
            }) => {
                assert_eq!(total, 5);
                // The token was flipped up front, so every unit was cut off
                // and the finished set matches the reported count.
                assert_eq!(values.len(), completed);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
