//! Samplers for the admissible model family: weight polytopes, value-function
//! envelopes, and imprecise performance realizations.

pub(crate) mod performance;
pub(crate) mod polytope;
pub(crate) mod value_function;

pub(crate) use polytope::{HitAndRun, Polytope};
pub(crate) use value_function::ValueFunctionSampler;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// The injected random source: a counter-based generator split into
/// independent streams so that parallel workers draw deterministic,
/// non-overlapping sequences for a given `(seed, stream)` pair.
pub(crate) fn stream_rng(seed: u64, stream: u64) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}
