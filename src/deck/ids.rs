//! Model and deck identifiers.
//!
//! Anki keys note types and decks by integer id. Two decks imported into
//! the same collection with the same id would merge, so each package gets
//! fresh ids drawn from `[2^30, 2^31)`. These only need to avoid collisions
//! within one user's collection; they are not cryptographically unique.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Range every generated id falls in.
pub const ID_RANGE: Range<i64> = (1 << 30)..(1 << 31);

/// The pair of ids stamped into one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckIds {
    pub model_id: i64,
    pub deck_id: i64,
}

impl DeckIds {
    /// Draw both ids from `rng`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            model_id: rng.random_range(ID_RANGE),
            deck_id: rng.random_range(ID_RANGE),
        }
    }

    /// Ids from the thread-local RNG.
    pub fn random() -> Self {
        Self::generate(&mut rand::rng())
    }

    /// Reproducible ids for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::generate(&mut StdRng::seed_from_u64(seed))
    }

    /// `seeded` when a seed is configured, `random` otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::random, Self::seeded)
    }
}
