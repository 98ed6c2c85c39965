//! Packet and single-ray traversal.
//!
//! Closest-hit queries walk front to back and skip every pending node that
//! starts beyond the best hit found so far. Any-hit queries stop at the
//! first opaque occluder, attenuating shadow rays by every translucent
//! surface crossed on the way.

use brisk_math::{Ray, Vec3, T_EPSILON};

use super::{KdTree, Node};
use crate::packet::{Hit, PacketFlags, RayPacket, LANE_WIDTH, MAX_SIZE};
use crate::PrimitiveSet;

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    node: usize,
    t_near: f32,
    t_far: f32,
}

/// Reusable buffers for single-ray traversal.
struct Scratch {
    stack: Vec<StackEntry>,
    crossed: Vec<f32>,
}

/// Per-ray parametric interval inside the current node.
#[derive(Clone, Copy)]
struct Span {
    t_in: [f32; MAX_SIZE],
    t_out: [f32; MAX_SIZE],
    active: [bool; MAX_SIZE],
}

impl KdTree {
    /// Intersect every ray in the packet's active range with the primitives
    /// of `set`, which must be the set the tree was built for.
    ///
    /// Closest-hit packets end with each ray's nearest hit recorded.
    /// Any-hit packets end with `was_hit` set on occluded rays and the
    /// transmittance of unoccluded ones reduced by the translucent surfaces
    /// they cross.
    pub fn intersect(&self, set: &dyn PrimitiveSet, rays: &mut RayPacket) {
        debug_assert_eq!(set.len(), self.primitive_count);
        let range = rays.range();
        if range.is_empty() || self.nodes.is_empty() {
            return;
        }

        let mut scratch = Scratch {
            stack: Vec::with_capacity(self.max_depth + 1),
            crossed: Vec::new(),
        };

        // Translucent occluders need the per-ray walk that tracks them.
        let single_only = rays.is_any_hit() && self.translucent;
        if single_only {
            for i in range {
                self.traverse_single(set, rays, i, &mut scratch);
            }
            return;
        }

        if rays.compute_signs() {
            self.intersect_run(set, rays, range.start, range.end, &mut scratch);
            return;
        }

        // Split into maximal runs of rays sharing one sign pattern.
        let mut first = range.start;
        while first < range.end {
            let signs = rays.signs(first);
            let mut last = first + 1;
            while last < range.end && rays.signs(last) == signs {
                last += 1;
            }
            rays.with_range(first..last, |rays| {
                rays.flags_mut().constant_signs = true;
                self.intersect_run(set, rays, first, last, &mut scratch);
            });
            first = last;
        }
    }

    /// Closest hit of a single ray.
    pub fn closest_hit(&self, set: &dyn PrimitiveSet, ray: Ray, max_t: f32) -> Option<Hit> {
        let mut packet = RayPacket::from_rays(&[ray], max_t, PacketFlags::default());
        self.intersect(set, &mut packet);
        packet.hit(0)
    }

    /// Light passing along `ray` over `max_t`: zero when an opaque surface
    /// blocks it, otherwise the product of the translucent surfaces crossed.
    pub fn transmittance(&self, set: &dyn PrimitiveSet, ray: Ray, max_t: f32) -> Vec3 {
        let mut packet = RayPacket::from_rays(&[ray], max_t, PacketFlags::shadow());
        self.intersect(set, &mut packet);
        if packet.was_hit(0) {
            Vec3::ZERO
        } else {
            packet.transmittance(0)
        }
    }

    /// Trace one same-sign run `[first, last)`. Runs too narrow to fill a
    /// lane go ray by ray.
    fn intersect_run(
        &self,
        set: &dyn PrimitiveSet,
        rays: &mut RayPacket,
        first: usize,
        last: usize,
        scratch: &mut Scratch,
    ) {
        let lane_begin = first.div_ceil(LANE_WIDTH) * LANE_WIDTH;
        let lane_end = last / LANE_WIDTH * LANE_WIDTH;
        if last - first < 2 || lane_begin >= lane_end {
            for i in first..last {
                self.traverse_single(set, rays, i, scratch);
            }
        } else {
            self.traverse_packet(set, rays, first, last);
        }
    }

    /// Clip each ray of `[first, last)` to the root bounds and walk the
    /// tree with the whole run.
    fn traverse_packet(&self, set: &dyn PrimitiveSet, rays: &mut RayPacket, first: usize, last: usize) {
        let mut span = Span {
            t_in: [0.0; MAX_SIZE],
            t_out: [0.0; MAX_SIZE],
            active: [false; MAX_SIZE],
        };
        let mut any_active = false;
        for i in first..last {
            let (t_in, t_out) = self.root_span(rays, i);
            span.t_in[i] = t_in;
            span.t_out[i] = t_out;
            span.active[i] = t_in <= t_out;
            any_active |= span.active[i];
        }
        if any_active {
            self.packet_node(0, set, rays, first, last, &span);
        }
    }

    fn packet_node(
        &self,
        node: usize,
        set: &dyn PrimitiveSet,
        rays: &mut RayPacket,
        first: usize,
        last: usize,
        span: &Span,
    ) {
        match self.nodes[node] {
            Node::Leaf { start, count } => {
                for &id in &self.items[start as usize..(start + count) as usize] {
                    set.intersect(id as usize, rays);
                }
            }
            Node::Internal {
                axis,
                pos,
                first_child,
                ..
            } => {
                let axis = axis as usize;
                let sign = rays.sign(first, axis);
                let front = first_child as usize + sign;
                let back = first_child as usize + 1 - sign;

                let mut t_plane = [0.0f32; MAX_SIZE];
                let mut in_plane = [false; MAX_SIZE];
                let mut wants_front = false;
                let mut wants_back = false;
                for i in first..last {
                    if !span.active[i] {
                        continue;
                    }
                    in_plane[i] = runs_in_plane(rays, i, axis, pos);
                    t_plane[i] = (pos - rays.origin(i)[axis]) * rays.inv_direction(i)[axis];
                    wants_front |= in_plane[i] || span.t_in[i] <= t_plane[i];
                    wants_back |= in_plane[i] || span.t_out[i] >= t_plane[i];
                }

                if !wants_front {
                    self.packet_node(back, set, rays, first, last, span);
                    return;
                }
                if !wants_back {
                    self.packet_node(front, set, rays, first, last, span);
                    return;
                }

                let mut next = *span;
                let mut any = false;
                for i in first..last {
                    if in_plane[i] {
                        next.active[i] = span.active[i];
                        next.t_out[i] = span.t_out[i];
                    } else {
                        next.active[i] = span.active[i] && span.t_in[i] <= t_plane[i];
                        next.t_out[i] = span.t_out[i].min(t_plane[i]);
                    }
                    any |= next.active[i];
                }
                if any {
                    self.packet_node(front, set, rays, first, last, &next);
                }

                let mut any = false;
                for i in first..last {
                    if !span.active[i] || (!in_plane[i] && span.t_out[i] < t_plane[i]) {
                        next.active[i] = false;
                        continue;
                    }
                    next.t_in[i] = if in_plane[i] { span.t_in[i] } else { span.t_in[i].max(t_plane[i]) };
                    next.t_out[i] = span.t_out[i].min(rays.min_t(i));
                    next.active[i] = next.t_in[i] <= next.t_out[i];
                    any |= next.active[i];
                }
                if any {
                    self.packet_node(back, set, rays, first, last, &next);
                }
            }
        }
    }

    /// Parametric interval of ray `i` inside the root bounds.
    fn root_span(&self, rays: &RayPacket, i: usize) -> (f32, f32) {
        let origin = rays.origin(i);
        let inv = rays.inv_direction(i);
        let mut t_in = T_EPSILON;
        let mut t_out = rays.min_t(i);
        for axis in 0..3 {
            let (near, far) = if rays.sign(i, axis) == 0 {
                (self.bounds.min[axis], self.bounds.max[axis])
            } else {
                (self.bounds.max[axis], self.bounds.min[axis])
            };
            t_in = t_in.max((near - origin[axis]) * inv[axis]);
            t_out = t_out.min((far - origin[axis]) * inv[axis]);
        }
        (t_in, t_out)
    }

    /// Stack walk for ray `i`.
    fn traverse_single(&self, set: &dyn PrimitiveSet, rays: &mut RayPacket, i: usize, scratch: &mut Scratch) {
        let any_hit = rays.is_any_hit();
        let (mut t_near, mut t_far) = self.root_span(rays, i);
        if t_near > t_far {
            return;
        }

        let origin = rays.origin(i);
        let inv = rays.inv_direction(i);
        let signs = rays.signs(i);
        scratch.stack.clear();
        scratch.crossed.clear();

        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Internal {
                    axis,
                    pos,
                    first_child,
                    left_cheaper,
                } => {
                    let axis = axis as usize;
                    let t_plane = (pos - origin[axis]) * inv[axis];
                    let front = first_child as usize + signs[axis];
                    let back = first_child as usize + 1 - signs[axis];

                    if runs_in_plane(rays, i, axis, pos) {
                        scratch.stack.push(StackEntry { node: back, t_near, t_far });
                        node = front;
                    } else if t_plane < t_near {
                        node = back;
                    } else if t_plane > t_far {
                        node = front;
                    } else if !any_hit || left_cheaper == (signs[axis] == 0) {
                        scratch.stack.push(StackEntry { node: back, t_near: t_plane, t_far });
                        node = front;
                        t_far = t_plane;
                    } else {
                        scratch.stack.push(StackEntry { node: front, t_near, t_far: t_plane });
                        node = back;
                        t_near = t_plane;
                    }
                }
                Node::Leaf { start, count } => {
                    let items = &self.items[start as usize..(start + count) as usize];
                    let done = rays.with_range(i..i + 1, |rays| {
                        for &id in items {
                            set.intersect(id as usize, rays);
                            if any_hit && rays.was_hit(i) && self.cross_surface(set, rays, i, &mut scratch.crossed) {
                                return true;
                            }
                        }
                        false
                    });
                    if done {
                        return;
                    }

                    if any_hit && rays.was_hit(i) {
                        return;
                    }
                    // Entries pushed for in-plane rays overlap the walked
                    // interval, so each one is culled against the best hit.
                    loop {
                        let Some(entry) = scratch.stack.pop() else {
                            return;
                        };
                        t_near = entry.t_near;
                        t_far = entry.t_far.min(rays.min_t(i));
                        if t_near <= t_far {
                            node = entry.node;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Account for the surface an any-hit ray just struck. Returns true when
    /// the walk is over: the ray is blocked, or it crossed as many
    /// translucent surfaces as allowed.
    fn cross_surface(&self, set: &dyn PrimitiveSet, rays: &mut RayPacket, i: usize, crossed: &mut Vec<f32>) -> bool {
        let Some(hit) = rays.hit(i) else {
            return false;
        };
        // A surface split across leaves is met once per leaf.
        if !crossed.iter().any(|&t| (t - hit.t).abs() < T_EPSILON) {
            crossed.push(hit.t);
            rays.attenuate(i, set.transmittance(hit.primitive as usize));
        }
        if rays.is_opaque(i) {
            return true;
        }
        rays.reset_hit(i);
        crossed.len() >= self.max_transparent_hits
    }
}

/// Ray `i` does not move along `axis` and starts on the split plane, so it
/// runs inside the plane and both children see the same interval.
#[inline]
fn runs_in_plane(rays: &RayPacket, i: usize, axis: usize, pos: f32) -> bool {
    rays.direction(i)[axis] == 0.0 && rays.origin(i)[axis] == pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KdTreeConfig, Material, TriangleMesh};

    fn cubes() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let m = mesh.add_material(Material::default());
        for i in 0..4 {
            let min = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
            mesh.add_box(min, min + Vec3::ONE, m);
        }
        mesh
    }

    #[test]
    fn test_closest_hit_picks_nearest_cube() {
        let mesh = cubes();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let ray = Ray::new(Vec3::new(-5.0, 0.5, 0.5), Vec3::X);
        let hit = tree.closest_hit(&mesh, ray, f32::MAX).unwrap();
        assert!((hit.t - 5.0).abs() < 1e-4);

        let ray = Ray::new(Vec3::new(20.0, 0.5, 0.5), -Vec3::X);
        let hit = tree.closest_hit(&mesh, ray, f32::MAX).unwrap();
        assert!((hit.t - 13.0).abs() < 1e-4);
    }

    #[test]
    fn test_miss_and_max_distance() {
        let mesh = cubes();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let ray = Ray::new(Vec3::new(-5.0, 5.0, 0.5), Vec3::X);
        assert!(tree.closest_hit(&mesh, ray, f32::MAX).is_none());

        let ray = Ray::new(Vec3::new(-5.0, 0.5, 0.5), Vec3::X);
        assert!(tree.closest_hit(&mesh, ray, 4.0).is_none());
    }

    #[test]
    fn test_ray_starting_inside_tree() {
        let mesh = cubes();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let ray = Ray::new(Vec3::new(1.5, 0.5, 0.5), Vec3::X);
        let hit = tree.closest_hit(&mesh, ray, f32::MAX).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_ray_inside_split_plane() {
        let mut mesh = TriangleMesh::new();
        let m = mesh.add_material(Material::default());
        mesh.add_box(Vec3::ZERO, Vec3::ONE, m);
        mesh.add_box(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0), m);
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());

        // Runs down the x = 1 face and meets the top of the first box.
        let ray = Ray::new(Vec3::new(1.0, 0.5, 5.0), -Vec3::Z);
        let hit = tree.closest_hit(&mesh, ray, f32::MAX).unwrap();
        assert_eq!(hit.t, 4.0);
        assert_eq!(tree.transmittance(&mesh, ray, 10.0), Vec3::ZERO);
    }

    #[test]
    fn test_shadow_ray_blocked_and_clear() {
        let mesh = cubes();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let blocked = Ray::new(Vec3::new(-1.0, 0.5, 0.5), Vec3::X);
        assert_eq!(tree.transmittance(&mesh, blocked, 10.0), Vec3::ZERO);

        let clear = Ray::new(Vec3::new(-1.0, 3.0, 0.5), Vec3::X);
        assert_eq!(tree.transmittance(&mesh, clear, 10.0), Vec3::ONE);

        // The light sits before the first cube.
        assert_eq!(tree.transmittance(&mesh, blocked, 0.5), Vec3::ONE);
    }

    #[test]
    fn test_mixed_sign_packet() {
        let mesh = cubes();
        let tree = KdTree::build(&mesh, &KdTreeConfig::default());
        let rays: Vec<Ray> = (0..12)
            .map(|k| {
                if k % 3 == 0 {
                    Ray::new(Vec3::new(20.0, 0.5, 0.5), -Vec3::X)
                } else {
                    Ray::new(Vec3::new(-5.0, 0.5, 0.5), Vec3::X)
                }
            })
            .collect();
        let mut packet = RayPacket::from_rays(&rays, f32::MAX, PacketFlags::primary());
        tree.intersect(&mesh, &mut packet);
        for k in 0..12 {
            let expected = if k % 3 == 0 { 13.0 } else { 5.0 };
            let t = packet.hit(k).unwrap().t;
            assert!((t - expected).abs() < 1e-4, "ray {k}: {t}");
        }
        assert_eq!(packet.range(), 0..12);
    }
}
