//! The contract between the KD-tree and the geometry it indexes.

use brisk_math::{Aabb, Interval, Ray, Vec3};

use crate::{Material, RayPacket};

/// A single shape that can be hit by rays.
pub trait Hittable: Send + Sync {
    /// Distance along `ray` of the closest hit inside `ray_t`.
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<f32>;

    /// Get the axis-aligned bounding box of this object.
    fn bounding_box(&self) -> Aabb;

    /// Outward unit normal at a point on the surface.
    fn normal_at(&self, point: Vec3) -> Vec3;
}

/// An indexed collection of primitives addressed by dense ids
/// `0..len()`.
///
/// The tree never owns primitives. It stores ids and calls back into the
/// set for bounds and intersection.
pub trait PrimitiveSet: Send + Sync {
    /// Number of primitives.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds of primitive `id`.
    fn primitive_bounds(&self, id: usize) -> Aabb;

    /// Bounds of the whole set.
    fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for id in 0..self.len() {
            bounds.extend_by_box(&self.primitive_bounds(id));
        }
        bounds
    }

    /// Intersect primitive `id` with every ray in the packet's active range,
    /// recording closer hits with [`RayPacket::record_hit`].
    fn intersect(&self, id: usize, rays: &mut RayPacket);

    /// Unit surface normal of primitive `id` at `point`.
    fn normal(&self, id: usize, point: Vec3) -> Vec3;

    fn material(&self, id: usize) -> Material;

    /// Factor applied to shadow rays crossing primitive `id`.
    fn transmittance(&self, id: usize) -> Vec3 {
        self.material(id).transmittance
    }

    /// Whether any primitive lets light through.
    fn has_transparency(&self) -> bool {
        (0..self.len()).any(|id| self.transmittance(id).max_element() > 0.0)
    }

    /// Triangle view of the set when every primitive is a triangle the
    /// builder may clip exactly against node bounds. Sets without one are
    /// narrowed by box intersection.
    fn as_clippable(&self) -> Option<&dyn ClippableView> {
        None
    }
}

/// Access to the vertices of a set made only of triangles.
pub trait ClippableView: Send + Sync {
    fn triangle(&self, id: usize) -> [Vec3; 3];
}

/// Single-shape intersection over a packet, shared by shape-backed sets.
pub(crate) fn intersect_shape(shape: &dyn Hittable, id: u32, rays: &mut RayPacket) {
    for i in rays.range() {
        let ray_t = Interval::new(brisk_math::T_EPSILON, rays.min_t(i));
        if let Some(t) = shape.hit(&rays.ray(i), ray_t) {
            rays.record_hit(i, t, id);
        }
    }
}
