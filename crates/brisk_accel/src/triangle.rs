//! Triangle primitive.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use brisk_math::{Aabb, Interval, Ray, Vec3};

use crate::Hittable;

/// Möller-Trumbore test against the triangle `(v0, v1, v2)`. Returns the
/// hit distance when it falls inside `ray_t`.
#[inline]
pub fn intersect_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3, ray_t: Interval) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction().cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin() - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction().dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    ray_t.surrounds(t).then_some(t)
}

/// A standalone triangle.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    /// Pre-computed face normal (unit length)
    normal: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        Self { v0, v1, v2, normal }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }
}

impl Hittable for Triangle {
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<f32> {
        intersect_triangle(ray, self.v0, self.v1, self.v2, ray_t)
    }

    fn bounding_box(&self) -> Aabb {
        Aabb::from_iter_points([self.v0, self.v1, self.v2])
    }

    fn normal_at(&self, _point: Vec3) -> Vec3 {
        self.normal
    }
}
