//! World model
//!
//! Entities, auras and the arena itself. This layer knows nothing about the
//! cast pipeline; the spell engine reads and mutates it through queries.

pub mod auras;
pub mod map;
pub mod unit;

use bevy::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;

pub use auras::{ActiveAuras, Aura, AuraKind};
pub use map::ArenaMap;
pub use unit::{
    ComboPoints, Cooldowns, CreatureType, GameObject, GameObjectKind, Inventory, ItemClass,
    ItemId, ItemStack, LockInfo, OutOfWorld, Pet, PowerKind, SkillKind, Stance, Unit,
};

/// Seeded random number generator for deterministic simulation.
///
/// When a seed is provided (e.g., via a headless scenario), the same seed will
/// always produce the same outcome. Without a seed, uses system entropy.
#[derive(Resource)]
pub struct GameRng {
    rng: StdRng,
    /// The seed used to initialize this RNG (if deterministic)
    pub seed: Option<u64>,
}

impl GameRng {
    /// Create a new GameRng with a specific seed for deterministic behavior
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a new GameRng with random entropy (non-deterministic)
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Generate a random f32 in the range [0.0, 1.0)
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Generate a random f32 in the given range
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.random_f32() * (max - min)
    }

    /// Generate a random index in `0..len`. `len` must be non-zero.
    pub fn random_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Pick `count` distinct indices out of `0..len`, uniformly, by partial
    /// Fisher-Yates. Order of the result is the shuffle order, which is
    /// deterministic for a given seed.
    pub fn pick_indices(&mut self, len: usize, count: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..len).collect();
        let take = count.min(len);
        for i in 0..take {
            let j = self.rng.gen_range(i..len);
            pool.swap(i, j);
        }
        pool.truncate(take);
        pool
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let seed = 42;
        let mut rng1 = GameRng::from_seed(seed);
        let mut rng2 = GameRng::from_seed(seed);

        for _ in 0..100 {
            assert_eq!(rng1.random_f32(), rng2.random_f32());
        }
    }

    #[test]
    fn test_pick_indices_is_deterministic_and_distinct() {
        let mut rng1 = GameRng::from_seed(7);
        let mut rng2 = GameRng::from_seed(7);

        let a = rng1.pick_indices(10, 3);
        let b = rng2.pick_indices(10, 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3, "picked indices must be distinct");
    }

    #[test]
    fn test_pick_indices_caps_at_len() {
        let mut rng = GameRng::from_seed(1);
        let picked = rng.pick_indices(2, 5);
        assert_eq!(picked.len(), 2);
    }
}
