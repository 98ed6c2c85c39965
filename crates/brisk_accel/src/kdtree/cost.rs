//! Expected-cost pass that orders occlusion traversal.
//!
//! A shadow ray that enters both children stops as soon as it meets an
//! opaque primitive, so it pays off to visit first the child that is
//! likelier to end the walk cheaply. Each subtree reports a pair
//! `(cost, pass)`: the expected work of walking it and the probability that
//! a ray leaves it unoccluded.

use std::time::Instant;

use brisk_math::{Aabb, Vec2};

use super::{KdTree, KdTreeConfig, Node};
use crate::PrimitiveSet;

impl KdTree {
    /// Annotate every internal node with whether its lower child is the
    /// cheaper one to visit first. Only the any-hit traversal reads the
    /// annotation.
    pub fn compute_traversal_order(&mut self, set: &dyn PrimitiveSet, config: &KdTreeConfig) {
        if self.nodes.is_empty() || self.bounds.is_empty() {
            return;
        }
        let start = Instant::now();
        let bounds = self.bounds;
        let cost = self.subtree_cost(0, &bounds, bounds.surface_area(), set, config);
        log::debug!(
            "KD-tree traversal cost {:.3} computed in {:.2}ms",
            cost.x,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    fn subtree_cost(
        &mut self,
        node: usize,
        bounds: &Aabb,
        area: f32,
        set: &dyn PrimitiveSet,
        config: &KdTreeConfig,
    ) -> Vec2 {
        match self.nodes[node] {
            Node::Leaf { start, count } => {
                let immediate = count as f32 * config.intersection_cost + config.traversal_cost;
                let items = &self.items[start as usize..(start + count) as usize];
                let lets_light_through = items
                    .iter()
                    .any(|&id| set.transmittance(id as usize).max_element() > 0.0);
                let pass = if count == 0 || lets_light_through { 1.0 } else { 0.0 };
                Vec2::new(immediate, pass)
            }
            Node::Internal {
                axis,
                pos,
                first_child,
                ..
            } => {
                let axis = axis as usize;
                let l_bounds = bounds.lower_half(axis, pos);
                let r_bounds = bounds.upper_half(axis, pos);
                let l_area = l_bounds.surface_area();
                let r_area = r_bounds.surface_area();
                let inv_area = if area > 0.0 { 1.0 / area } else { 0.0 };

                let p_l = l_area * inv_area;
                let p_r = r_area * inv_area;
                // Probabilities of entering only the left, only the right, or both.
                let only_l = 1.0 - p_r;
                let only_r = 1.0 - p_l;
                let both = 1.0 - (only_l + only_r);

                let first_child = first_child as usize;
                let c_l = self.subtree_cost(first_child, &l_bounds, l_area, set, config);
                let c_r = self.subtree_cost(first_child + 1, &r_bounds, r_area, set, config);

                let mut cost = only_l * c_l + only_r * c_r;
                cost.x += config.traversal_cost;

                // Entering one child first, the other is only walked when the
                // ray passes through the first unoccluded.
                let left_first = Vec2::new(c_l.x, 0.0) + c_l.y * c_r;
                let right_first = Vec2::new(c_r.x, 0.0) + c_r.y * c_l;
                let take_left = left_first.x < right_first.x;
                cost += both * if take_left { left_first } else { right_first };

                if let Node::Internal { left_cheaper, .. } = &mut self.nodes[node] {
                    *left_cheaper = take_left;
                }
                cost
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Material, TriangleMesh};
    use brisk_math::Vec3;

    /// A heavy translucent cluster below x = 4 and a single opaque wall
    /// above it.
    fn lopsided_scene() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let glass = mesh.add_material(Material::translucent(Vec3::ONE, Vec3::splat(0.9)));
        let wall = mesh.add_material(Material::default());
        for i in 0..6 {
            let z = i as f32 * 0.1;
            mesh.add_box(Vec3::new(0.0, 0.0, z), Vec3::new(4.0, 4.0, z + 0.05), glass);
        }
        mesh.add_quad(Vec3::new(9.0, 0.0, 0.0), Vec3::Y * 4.0, Vec3::Z * 1.0, wall);
        mesh
    }

    #[test]
    fn test_opaque_side_is_cheaper() {
        let mesh = lopsided_scene();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());

        // The root separates the glass cluster from the wall along x.
        let Node::Internal { axis, left_cheaper, .. } = tree.nodes()[0] else {
            panic!("root should split");
        };
        assert_eq!(axis, 0);
        assert!(!left_cheaper, "the opaque wall on the right should be visited first");
    }

    #[test]
    fn test_disabled_pass_keeps_default_order() {
        let mesh = lopsided_scene();
        let config = KdTreeConfig::default().with_traversal_order(false);
        let tree = KdTree::build(&mesh, &config);
        for node in tree.nodes() {
            if let Node::Internal { left_cheaper, .. } = node {
                assert!(*left_cheaper);
            }
        }
    }
}
