//! Triangle-against-box clipping.
//!
//! Sutherland-Hodgman clipping of a triangle against the six planes of an
//! AABB, used by the KD-tree builder to find the tight bound of the part of
//! a triangle that lies inside a node.

use crate::{Aabb, Vec3};

/// A triangle clipped by six planes has at most nine vertices.
const MAX_POLYGON: usize = 10;

/// Extents thinner than `max(|min|, |max|) / 2^19` are treated as flat and
/// keep their unclipped bound, so float error cannot shrink the clipped box
/// below the triangle it must contain.
const THIN_EXTENT_RATIO: f32 = (1u32 << 19) as f32;

#[derive(Clone, Copy)]
struct Polygon {
    verts: [Vec3; MAX_POLYGON],
    len: usize,
}

impl Polygon {
    fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let mut verts = [Vec3::ZERO; MAX_POLYGON];
        verts[0] = a;
        verts[1] = b;
        verts[2] = c;
        Self { verts, len: 3 }
    }

    fn empty() -> Self {
        Self {
            verts: [Vec3::ZERO; MAX_POLYGON],
            len: 0,
        }
    }

    fn push(&mut self, v: Vec3) {
        debug_assert!(self.len < MAX_POLYGON, "clipped polygon overflow");
        if self.len < MAX_POLYGON {
            self.verts[self.len] = v;
            self.len += 1;
        }
    }

    fn vertices(&self) -> &[Vec3] {
        &self.verts[..self.len]
    }

    /// Clip against one plane. `keep_above` keeps points with
    /// `p[axis] >= plane`, otherwise points with `p[axis] <= plane`.
    /// Returns `None` once fewer than three vertices survive.
    fn clip(&self, axis: usize, plane: f32, keep_above: bool) -> Option<Polygon> {
        let inside = |p: Vec3| {
            if keep_above {
                p[axis] >= plane
            } else {
                p[axis] <= plane
            }
        };

        let mut out = Polygon::empty();
        for edge in 0..self.len {
            let v0 = self.verts[edge];
            let v1 = self.verts[(edge + 1) % self.len];
            match (inside(v0), inside(v1)) {
                (true, true) => out.push(v1),
                (false, false) => {}
                (v0_in, _) => {
                    let f = (plane - v0[axis]) / (v1[axis] - v0[axis]);
                    let mut crossing = v0 + f * (v1 - v0);
                    // Land exactly on the plane.
                    crossing[axis] = plane;
                    if v0_in {
                        if crossing != v0 {
                            out.push(crossing);
                        }
                    } else {
                        if crossing != v0 && crossing != v1 {
                            out.push(crossing);
                        }
                        out.push(v1);
                    }
                }
            }
        }

        (out.len >= 3).then_some(out)
    }
}

/// Clip triangle `abc` to `bounds` and return the bound of what remains.
///
/// Returns `None` when the triangle misses the box or the remaining part
/// collapses to a single point.
pub fn clip_triangle(a: Vec3, b: Vec3, c: Vec3, bounds: &Aabb) -> Option<Aabb> {
    let unclipped = Aabb::from_iter_points([a, b, c]);

    let mut poly = Polygon::triangle(a, b, c);
    for axis in 0..3 {
        let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
        if lo == hi {
            // A flat slab: the triangle is either inside it or fully out.
            if a[axis] == lo && b[axis] == lo && c[axis] == lo {
                continue;
            }
            return None;
        }
        poly = poly.clip(axis, lo, true)?;
        poly = poly.clip(axis, hi, false)?;
    }

    let mut clipped = Aabb::from_iter_points(poly.vertices().iter().copied());
    for axis in 0..3 {
        let extent = unclipped.max[axis] - unclipped.min[axis];
        let magnitude = unclipped.max[axis].abs().max(unclipped.min[axis].abs());
        if extent * THIN_EXTENT_RATIO < magnitude {
            clipped.min[axis] = unclipped.min[axis];
            clipped.max[axis] = unclipped.max[axis];
        }
    }

    (clipped.min != clipped.max).then_some(clipped)
}
