use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// A ChaCha20 generator for `seed`, or for a fresh seed when none is given.
///
/// The seed actually used is returned so a run can be reproduced.
pub fn seeded_rng(seed: Option<u64>) -> (ChaCha20Rng, u64) {
    let seed = seed.unwrap_or_else(rand::random);
    (ChaCha20Rng::seed_from_u64(seed), seed)
}
