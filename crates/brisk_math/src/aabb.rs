use crate::Vec3;

/// Axis-aligned bounding box stored as a min/max corner pair.
///
/// A box with any `min > max` component is empty; [`Aabb::EMPTY`] is the
/// reset sentinel that every `extend_*` call starts from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The reset box. Extending it by a point yields that point.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    /// Create a box from its corners. The caller guarantees `min <= max`.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create the smallest box containing two arbitrary points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create the smallest box containing every point of an iterator.
    pub fn from_iter_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bbox = Aabb::EMPTY;
        for p in points {
            bbox.extend_by_point(p);
        }
        bbox
    }

    /// True when the box contains no point.
    pub fn is_empty(&self) -> bool {
        !(self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z)
    }

    pub fn extend_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn extend_by_box(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Overlap of two boxes. Empty when they are disjoint.
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Closed-set overlap test; touching faces count as overlapping.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Surface area, zero for empty boxes.
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// The part of the box below `pos` on `axis`.
    pub fn lower_half(&self, axis: usize, pos: f32) -> Aabb {
        let mut out = *self;
        out.max[axis] = pos;
        out
    }

    /// The part of the box above `pos` on `axis`.
    pub fn upper_half(&self, axis: usize, pos: f32) -> Aabb {
        let mut out = *self;
        out.min[axis] = pos;
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::EMPTY
    }
}
