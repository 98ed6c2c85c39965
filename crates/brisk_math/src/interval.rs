/// Parametric range `[min, max]` along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// No value lies in the range. NaN bounds count as empty.
    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }

    /// Closed membership test.
    pub fn contains(&self, t: f32) -> bool {
        self.min <= t && t <= self.max
    }

    /// Open membership test; hits exactly on either end are rejected.
    pub fn surrounds(&self, t: f32) -> bool {
        self.min < t && t < self.max
    }

    /// Overlap of two ranges. May be empty.
    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval::new(self.min.max(other.min), self.max.min(other.max))
    }
}
