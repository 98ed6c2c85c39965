// Re-export glam for convenience
pub use glam::*;

// Brisk math types
mod aabb;
mod clip;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use clip::clip_triangle;
pub use interval::Interval;
pub use ray::Ray;

/// Smallest parametric distance a hit may have. Rays start this far along
/// their direction to avoid self-intersection.
pub const T_EPSILON: f32 = 1e-4;
