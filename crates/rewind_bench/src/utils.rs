//! Benchmark utilities.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates `count` random slot indices below `slots`.
pub fn random_slots(count: usize, slots: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen_range(0..slots)).collect()
}

/// Generates `len` random bytes.
pub fn random_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generators_repeat() {
        assert_eq!(random_data(32, 9), random_data(32, 9));
        let slots = random_slots(100, 8, 3);
        assert_eq!(slots, random_slots(100, 8, 3));
        assert!(slots.iter().all(|&slot| slot < 8));
    }
}
