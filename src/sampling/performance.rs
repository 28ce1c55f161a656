//! Sampling of precise performance realizations for imprecise data.

use rand::Rng;
use rand_chacha::ChaCha20Rng;

/// Uniform draw from a performance interval; degenerate intervals return the
/// point itself.
pub(crate) fn interval_draw(rng: &mut ChaCha20Rng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Realized values of an ordinal factor: `n` uniforms on `[floor, 1]` sorted
/// to respect the rank permutation. `ranking` lists DMU indices by ascending
/// rank; the returned vector is indexed by DMU and increases along `ranking`.
pub(crate) fn ordinal_draw(rng: &mut ChaCha20Rng, ranking: &[usize], floor: f64) -> Vec<f64> {
    let floor = floor.clamp(0.0, 1.0 - 1e-9);
    let mut draws: Vec<f64> = ranking
        .iter()
        .map(|_| rng.gen_range(floor..1.0))
        .collect();
    draws.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut values = vec![0.0; ranking.len()];
    for (position, &dmu) in ranking.iter().enumerate() {
        values[dmu] = draws[position];
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn ordinal_draws_respect_the_ranking() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let ranking = vec![2, 0, 1];
        for _ in 0..50 {
            let values = ordinal_draw(&mut rng, &ranking, 0.01);
            assert!(values[2] <= values[0]);
            assert!(values[0] <= values[1]);
            assert!(values.iter().all(|v| (0.01..=1.0).contains(v)));
        }
    }

    #[test]
    fn degenerate_intervals_are_points() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        assert_eq!(interval_draw(&mut rng, 3.5, 3.5), 3.5);
        let drawn = interval_draw(&mut rng, 1.0, 2.0);
        assert!((1.0..2.0).contains(&drawn));
    }
}
