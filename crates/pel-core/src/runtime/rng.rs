//! Splittable deterministic RNG (spec §9): a run seed forks one independent
//! stream per replication via a SplitMix64-style index mix, so Monte Carlo
//! results are bitwise identical whether replications run serially or in
//! parallel (spec §5, §8). No global mutable RNG state is kept anywhere;
//! every stream is threaded explicitly through the call that needs it.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// Mix a run seed and a replication index into an independent 64-bit seed,
/// using the SplitMix64 finalizer (Steele, Lea & Flood 2014).
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = z;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the RNG for replication `index` of a run seeded with `run_seed`.
/// Pure function of `(run_seed, index)`, so forking is order-independent.
pub fn fork(run_seed: u64, index: u64) -> Pcg64Mcg {
    let mixed = splitmix64(run_seed.wrapping_add(splitmix64(index)));
    Pcg64Mcg::seed_from_u64(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn same_seed_and_index_forks_identical_streams() {
        let mut a = fork(42, 7);
        let mut b = fork(42, 7);
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn distinct_indices_fork_distinct_streams() {
        let mut a = fork(42, 1);
        let mut b = fork(42, 2);
        assert_ne!(a.next_u64(), b.next_u64());
    }
}
