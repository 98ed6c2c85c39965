//! SAH KD-tree over a [`PrimitiveSet`](crate::PrimitiveSet).
//!
//! The tree is a flat node array. Internal nodes store the split plane and
//! the index of their first child; the second child always follows it.
//! Leaves reference a contiguous run of the item list, which holds
//! primitive ids (a primitive straddling a split appears in several
//! leaves).

mod build;
mod cost;
mod persist;
mod shared;
mod stats;
mod traverse;

pub use shared::SharedKdTree;
pub use stats::TreeStats;

use brisk_math::Aabb;

/// One node of the flat tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Leaf {
        start: u32,
        count: u32,
    },
    Internal {
        axis: u8,
        pos: f32,
        first_child: u32,
        /// Visiting the lower child first is expected to be cheaper for
        /// occlusion rays.
        left_cheaper: bool,
    },
}

impl Node {
    pub const EMPTY_LEAF: Node = Node::Leaf { start: 0, count: 0 };

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Build and traversal parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdTreeConfig {
    /// SAH cost of visiting an internal node.
    pub traversal_cost: f32,
    /// SAH cost of one primitive intersection.
    pub intersection_cost: f32,
    /// Deepest allowed tree; nodes at `max_height - 1` become leaves.
    pub max_height: usize,
    /// Run the expected-cost pass that orders occlusion traversal.
    pub compute_traversal_order: bool,
    /// Translucent surfaces a shadow ray may cross before giving up.
    pub max_transparent_hits: usize,
}

impl Default for KdTreeConfig {
    fn default() -> Self {
        Self {
            traversal_cost: 1.5,
            intersection_cost: 2.0,
            max_height: 512,
            compute_traversal_order: true,
            max_transparent_hits: 50,
        }
    }
}

impl KdTreeConfig {
    pub fn with_traversal_cost(mut self, cost: f32) -> Self {
        self.traversal_cost = cost;
        self
    }

    pub fn with_intersection_cost(mut self, cost: f32) -> Self {
        self.intersection_cost = cost;
        self
    }

    pub fn with_max_height(mut self, height: usize) -> Self {
        self.max_height = height.max(1);
        self
    }

    pub fn with_traversal_order(mut self, enabled: bool) -> Self {
        self.compute_traversal_order = enabled;
        self
    }

    pub fn with_max_transparent_hits(mut self, hits: usize) -> Self {
        self.max_transparent_hits = hits.max(1);
        self
    }
}

/// A built (or loaded) KD-tree. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<Node>,
    items: Vec<u32>,
    bounds: Aabb,
    primitive_count: usize,
    max_depth: usize,
    sah_cost: f64,
    max_transparent_hits: usize,
    /// Some primitive lets shadow rays through.
    translucent: bool,
}

impl KdTree {
    /// Root bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Primitive ids referenced by the leaves.
    pub fn items(&self) -> &[u32] {
        &self.items
    }

    /// Size of the primitive set the tree was built for.
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// Depth of the deepest node; the root has depth 0.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// SAH estimate accumulated while building.
    pub fn sah_cost(&self) -> f64 {
        self.sah_cost
    }

    pub fn max_transparent_hits(&self) -> usize {
        self.max_transparent_hits
    }

    /// Primitive ids stored in leaf `node`, empty for internal nodes.
    pub fn leaf_items(&self, node: usize) -> &[u32] {
        match self.nodes.get(node) {
            Some(Node::Leaf { start, count }) => {
                let start = *start as usize;
                &self.items[start..start + *count as usize]
            }
            _ => &[],
        }
    }

    /// Depth of the deepest node, found by walking the array from the root.
    fn measure_depth(nodes: &[Node]) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(Node::Internal { first_child, .. }) = nodes.get(node) {
                let child = *first_child as usize;
                stack.push((child, depth + 1));
                stack.push((child + 1, depth + 1));
            }
        }
        max_depth
    }
}
