use std::sync::Arc;

use parking_lot::RwLock;

use super::KdTree;

/// Publication point for the tree used by concurrent readers.
///
/// A rebuild happens off to the side; [`SharedKdTree::publish`] then swaps
/// the finished tree in whole. Readers hold an `Arc` snapshot, so a tree
/// stays alive until the last reader drops it and nobody ever sees a
/// half-built one.
#[derive(Debug, Clone)]
pub struct SharedKdTree {
    current: Arc<RwLock<Arc<KdTree>>>,
}

impl SharedKdTree {
    pub fn new(tree: KdTree) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(tree))),
        }
    }

    /// Replace the published tree. Returns the previous one.
    pub fn publish(&self, tree: KdTree) -> Arc<KdTree> {
        let tree = Arc::new(tree);
        std::mem::replace(&mut *self.current.write(), tree)
    }

    /// The tree published most recently.
    pub fn snapshot(&self) -> Arc<KdTree> {
        Arc::clone(&self.current.read())
    }
}
