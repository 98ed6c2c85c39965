use crate::Vec3;

/// Stand-in for `1 / 0` along axes the ray does not move on. Large enough to
/// push slab distances out of any scene, small enough that `0 * x` stays 0.
const ZERO_DIRECTION_INVERSE: f32 = 1e20;

/// A ray in 3D space with origin and direction.
///
/// The inverse direction and per-axis sign are cached because every slab
/// and split-plane test needs them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    inv_direction: Vec3,
    signs: [usize; 3],
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let inv = |d: f32| if d == 0.0 { ZERO_DIRECTION_INVERSE } else { 1.0 / d };
        let inv_direction = Vec3::new(inv(direction.x), inv(direction.y), inv(direction.z));
        let sign = |d: f32| usize::from(d < 0.0);
        Self {
            origin,
            direction,
            inv_direction,
            signs: [sign(direction.x), sign(direction.y), sign(direction.z)],
        }
    }

    /// Get the origin point of the ray.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Get the direction vector of the ray.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Component-wise `1 / direction`, with zero components mapped to a
    /// large finite value.
    #[inline]
    pub fn inv_direction(&self) -> Vec3 {
        self.inv_direction
    }

    /// 1 if the direction is negative along `axis`, else 0.
    #[inline]
    pub fn sign(&self, axis: usize) -> usize {
        self.signs[axis]
    }

    /// All three axis signs.
    #[inline]
    pub fn signs(&self) -> [usize; 3] {
        self.signs
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
