// ============================================================
// Layer 6 — Run Seeding
// ============================================================
// Called once by the driver before any model or data loader is
// built. Seeds the backend's tensor RNG (weight init, dropout)
// and hands back an explicit host RNG for shuffling and splits.

use burn::tensor::backend::Backend;
use rand::{rngs::StdRng, SeedableRng};

pub fn seed_everything<B: Backend>(seed: u64) -> StdRng {
    B::seed(seed);
    tracing::info!("Seed set to {}", seed);
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::Rng;

    #[test]
    fn test_same_seed_same_stream() {
        let a: Vec<u64> = seed_everything::<NdArray>(7).sample_iter(rand::distributions::Standard).take(4).collect();
        let b: Vec<u64> = seed_everything::<NdArray>(7).sample_iter(rand::distributions::Standard).take(4).collect();
        assert_eq!(a, b);
    }
}
