//! A max-priority queue split into independently locked sub-queues.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;

struct Entry<T> {
    priority: f32,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Higher priority first, then earlier pushes first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Concurrent max-priority queue.
///
/// Pushes are spread over `N` sub-queues, each behind its own mutex, so
/// producers rarely contend. A pop compares the heads of all sub-queues and
/// removes the best one. Pushes that land between the scan and the removal
/// can be missed by that pop, so ordering is exact when the queue is
/// quiescent and approximate under concurrent pushes. No item is ever lost
/// or returned twice.
pub struct ApproximatePriorityQueue<T> {
    queues: Vec<Mutex<BinaryHeap<Entry<T>>>>,
    seq: AtomicU64,
}

impl<T> ApproximatePriorityQueue<T> {
    pub fn new(num_queues: usize) -> Self {
        let queues = (0..num_queues.max(1))
            .map(|_| Mutex::new(BinaryHeap::new()))
            .collect();
        Self {
            queues,
            seq: AtomicU64::new(0),
        }
    }

    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Insert an item. `thread_hint` spreads concurrent producers over the
    /// sub-queues; it never changes the ordering.
    pub fn push(&self, item: T, priority: f32, thread_hint: usize) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let which = (thread_hint.wrapping_add(seq as usize)) % self.queues.len();
        self.queues[which].lock().push(Entry { priority, seq, item });
    }

    /// Remove the highest priority item, or `None` when every sub-queue is
    /// empty. Never blocks beyond the sub-queue locks.
    pub fn pop(&self, thread_hint: usize) -> Option<T> {
        let n = self.queues.len();
        loop {
            let mut best: Option<(usize, f32, u64)> = None;
            for k in 0..n {
                let which = (thread_hint + k) % n;
                let queue = self.queues[which].lock();
                if let Some(top) = queue.peek() {
                    let better = match best {
                        None => true,
                        Some((_, priority, seq)) => {
                            match top.priority.total_cmp(&priority) {
                                Ordering::Greater => true,
                                Ordering::Equal => top.seq < seq,
                                Ordering::Less => false,
                            }
                        }
                    };
                    if better {
                        best = Some((which, top.priority, top.seq));
                    }
                }
            }

            let (which, _, _) = best?;
            // Another consumer may have drained this sub-queue since the
            // scan; look again rather than report a false empty.
            if let Some(entry) = self.queues[which].lock().pop() {
                return Some(entry.item);
            }
        }
    }

    /// Drop every item. Only called between frames.
    pub fn clear(&self) {
        for queue in &self.queues {
            queue.lock().clear();
        }
    }

    /// Total number of queued items. Exact only when no other thread is
    /// pushing or popping.
    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.lock().is_empty())
    }
}
