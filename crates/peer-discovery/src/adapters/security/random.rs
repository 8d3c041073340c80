//! Random source adapters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::random::RandomSource;

/// Production random source backed by `rand`'s CSPRNG, seeded from OS
/// entropy. Uses `StdRng` rather than `ThreadRng` since the latter isn't
/// `Send` and these sources are handed to [`PeerDiscoveryService::new`]
/// as `Box<dyn RandomSource + Send>` for use from spawned tasks.
#[derive(Debug)]
pub struct OsRandomSource {
    rng: StdRng,
}

impl Default for OsRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl OsRandomSource {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl RandomSource for OsRandomSource {
    fn next_below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }
}
