//! Per-worker render state.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::{RenderError, TilePool};

/// Upper bound on concurrent render workers.
pub const MAX_WORKERS: usize = 32;

/// Everything one render thread owns: its index, its tile pool and its
/// random stream. Handed to [`crate::DeadlineImageTraverser::render_image`]
/// by mutable reference, so no worker state is shared.
#[derive(Debug)]
pub struct WorkerContext {
    proc: usize,
    num_workers: usize,
    pub pool: TilePool,
    pub rng: StdRng,
}

impl WorkerContext {
    /// Context for worker `proc` of `num_workers`, seeded from `seed`.
    pub fn new(proc: usize, num_workers: usize, seed: u64) -> Result<Self, RenderError> {
        if proc >= MAX_WORKERS || proc >= num_workers {
            return Err(RenderError::WorkerIndexOutOfRange {
                index: proc,
                max: num_workers.min(MAX_WORKERS),
            });
        }
        Ok(Self {
            proc,
            num_workers,
            pool: TilePool::new(),
            rng: StdRng::seed_from_u64(seed ^ (proc as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        })
    }

    /// One context per worker.
    pub fn spawn_all(num_workers: usize, seed: u64) -> Result<Vec<Self>, RenderError> {
        (0..num_workers).map(|proc| Self::new(proc, num_workers, seed)).collect()
    }

    pub fn proc(&self) -> usize {
        self.proc
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}
