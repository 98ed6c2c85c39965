//! Distribution of coarse pass assignments over workers.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out assignment indices to workers during the coarse pass.
pub trait LoadBalancer: Send + Sync {
    /// Prepare for an image with `num_assignments` units of work.
    fn setup_display(&mut self, num_assignments: usize, num_workers: usize);

    /// Reset worker `proc` for a new frame.
    fn setup_frame(&self, proc: usize);

    /// Next block of assignments for worker `proc`, or `None` once the
    /// worker has nothing left this frame.
    fn next_assignment(&self, proc: usize) -> Option<Range<usize>>;
}

/// Round-robin balancer: worker `p` takes every `num_workers`-th
/// assignment. The starting offset rotates each frame so no worker always
/// gets the same part of the image.
#[derive(Debug, Default)]
pub struct CyclicLoadBalancer {
    num_assignments: usize,
    workers: Vec<WorkerCursor>,
}

#[derive(Debug, Default)]
struct WorkerCursor {
    cur: AtomicUsize,
    frames: AtomicUsize,
}

impl CyclicLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_assignments(&self) -> usize {
        self.num_assignments
    }
}

impl LoadBalancer for CyclicLoadBalancer {
    fn setup_display(&mut self, num_assignments: usize, num_workers: usize) {
        self.num_assignments = num_assignments;
        self.workers = (0..num_workers)
            .map(|proc| WorkerCursor {
                cur: AtomicUsize::new(proc),
                frames: AtomicUsize::new(0),
            })
            .collect();
    }

    fn setup_frame(&self, proc: usize) {
        let num_workers = self.workers.len();
        if let Some(worker) = self.workers.get(proc) {
            let frames = worker.frames.fetch_add(1, Ordering::Relaxed) + 1;
            worker.cur.store((proc + frames) % num_workers, Ordering::Relaxed);
        }
    }

    fn next_assignment(&self, proc: usize) -> Option<Range<usize>> {
        let worker = self.workers.get(proc)?;
        let cur = worker.cur.load(Ordering::Relaxed);
        if cur >= self.num_assignments {
            return None;
        }
        worker.cur.store(cur + self.workers.len(), Ordering::Relaxed);
        Some(cur..cur + 1)
    }
}
