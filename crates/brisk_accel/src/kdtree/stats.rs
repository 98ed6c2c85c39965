use std::fmt;

use super::{KdTree, Node};

/// Leaves holding this many primitives or more share the last histogram
/// bucket.
pub const LEAF_HISTOGRAM_BUCKETS: usize = 9;

/// Shape summary of a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub empty_leaves: usize,
    /// Total primitive references across leaves.
    pub item_refs: usize,
    pub max_depth: usize,
    pub max_leaf_size: usize,
    /// `leaf_histogram[k]` counts leaves with `k` primitives.
    pub leaf_histogram: [usize; LEAF_HISTOGRAM_BUCKETS],
    pub sah_cost: f64,
}

impl TreeStats {
    /// Average primitives per non-empty leaf.
    pub fn mean_leaf_size(&self) -> f64 {
        let full = self.leaves - self.empty_leaves;
        if full == 0 {
            0.0
        } else {
            self.item_refs as f64 / full as f64
        }
    }
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} leaves ({} empty), {} refs, depth {}, largest leaf {}, mean leaf {:.2}, SAH {:.2}",
            self.nodes,
            self.leaves,
            self.empty_leaves,
            self.item_refs,
            self.max_depth,
            self.max_leaf_size,
            self.mean_leaf_size(),
            self.sah_cost
        )
    }
}

impl KdTree {
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            nodes: self.nodes.len(),
            max_depth: self.max_depth,
            sah_cost: self.sah_cost,
            ..Default::default()
        };
        for node in &self.nodes {
            if let Node::Leaf { count, .. } = *node {
                let count = count as usize;
                stats.leaves += 1;
                stats.item_refs += count;
                stats.max_leaf_size = stats.max_leaf_size.max(count);
                if count == 0 {
                    stats.empty_leaves += 1;
                }
                stats.leaf_histogram[count.min(LEAF_HISTOGRAM_BUCKETS - 1)] += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KdTreeConfig, Material, PrimitiveSet, TriangleMesh};
    use brisk_math::Vec3;

    #[test]
    fn test_stats_are_consistent() {
        let mut mesh = TriangleMesh::new();
        let m = mesh.add_material(Material::default());
        for i in 0..8 {
            let min = Vec3::new(i as f32 * 3.0, 0.0, 0.0);
            mesh.add_box(min, min + Vec3::ONE, m);
        }
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let stats = tree.stats();

        assert_eq!(stats.nodes, tree.nodes().len());
        assert_eq!(stats.item_refs, tree.items().len());
        assert_eq!(stats.leaf_histogram.iter().sum::<usize>(), stats.leaves);
        // A binary tree has one more leaf than internal nodes.
        assert_eq!(stats.leaves, stats.nodes - stats.leaves + 1);
        assert!(stats.item_refs >= mesh.len());
        assert!(stats.sah_cost > 0.0);
        assert!(format!("{stats}").contains("nodes"));
    }
}
