//! Structure-of-arrays ray batches.
//!
//! A [`RayPacket`] holds up to [`MAX_SIZE`] rays together with their
//! per-ray hit state. Only the rays inside the active range
//! `[begin, end)` take part in intersection; the KD-tree narrows that
//! range while it splits a packet into same-sign runs.

use std::ops::Range;

use brisk_math::{Ray, Vec3, T_EPSILON};

/// Maximum number of rays in one packet.
pub const MAX_SIZE: usize = 64;

/// Number of rays processed together by the packet traversal. Sub-packets
/// narrower than one lane fall back to single-ray traversal.
pub const LANE_WIDTH: usize = 4;

/// Per-packet properties shared by all rays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// Visibility query: stop at the first opaque occluder.
    pub any_hit: bool,
    /// Every ray starts at the same point.
    pub constant_origin: bool,
    /// Every active ray has the same direction sign on all three axes.
    /// Maintained by [`RayPacket::compute_signs`].
    pub constant_signs: bool,
}

impl PacketFlags {
    pub fn primary() -> Self {
        Self {
            constant_origin: true,
            ..Default::default()
        }
    }

    pub fn shadow() -> Self {
        Self {
            any_hit: true,
            ..Default::default()
        }
    }
}

/// Closest hit recorded for one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub primitive: u32,
}

/// A batch of rays stored as parallel arrays.
#[derive(Debug, Clone)]
pub struct RayPacket {
    origins: Vec<Vec3>,
    directions: Vec<Vec3>,
    inv_directions: Vec<Vec3>,
    signs: Vec<[usize; 3]>,
    /// Distance the ray may travel; `min_t` resets to this.
    max_t: Vec<f32>,
    /// Closest hit distance so far (starts at `max_t`).
    min_t: Vec<f32>,
    hit_primitive: Vec<Option<u32>>,
    /// Fraction of light still passing along a shadow ray.
    transmittance: Vec<Vec3>,
    begin: usize,
    end: usize,
    flags: PacketFlags,
}

impl RayPacket {
    /// Create an empty packet.
    pub fn new(flags: PacketFlags) -> Self {
        Self {
            origins: Vec::with_capacity(MAX_SIZE),
            directions: Vec::with_capacity(MAX_SIZE),
            inv_directions: Vec::with_capacity(MAX_SIZE),
            signs: Vec::with_capacity(MAX_SIZE),
            max_t: Vec::with_capacity(MAX_SIZE),
            min_t: Vec::with_capacity(MAX_SIZE),
            hit_primitive: Vec::with_capacity(MAX_SIZE),
            transmittance: Vec::with_capacity(MAX_SIZE),
            begin: 0,
            end: 0,
            flags,
        }
    }

    /// Build a packet from a slice of rays, all limited to `max_t`.
    ///
    /// Rays beyond [`MAX_SIZE`] are ignored.
    pub fn from_rays(rays: &[Ray], max_t: f32, flags: PacketFlags) -> Self {
        let mut packet = Self::new(flags);
        for ray in rays.iter().take(MAX_SIZE) {
            packet.push(*ray, max_t);
        }
        packet
    }

    /// Append a ray with an unhit state. Returns its index, or `None` when
    /// the packet is full.
    pub fn push(&mut self, ray: Ray, max_t: f32) -> Option<usize> {
        if self.origins.len() >= MAX_SIZE {
            return None;
        }
        let index = self.origins.len();
        self.origins.push(ray.origin());
        self.directions.push(ray.direction());
        self.inv_directions.push(ray.inv_direction());
        self.signs.push(ray.signs());
        self.max_t.push(max_t);
        self.min_t.push(max_t);
        self.hit_primitive.push(None);
        self.transmittance.push(Vec3::ONE);
        self.end = self.origins.len();
        self.flags.constant_signs = false;
        Some(index)
    }

    /// Drop every ray, keeping the allocation.
    pub fn clear(&mut self) {
        self.origins.clear();
        self.directions.clear();
        self.inv_directions.clear();
        self.signs.clear();
        self.max_t.clear();
        self.min_t.clear();
        self.hit_primitive.clear();
        self.transmittance.clear();
        self.begin = 0;
        self.end = 0;
        self.flags.constant_signs = false;
    }

    /// Total number of stored rays, active or not.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.origins.len() >= MAX_SIZE
    }

    /// The active sub-range.
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Narrow (or widen) the active sub-range.
    pub fn set_range(&mut self, range: Range<usize>) {
        debug_assert!(range.start <= range.end && range.end <= self.len());
        self.begin = range.start.min(self.len());
        self.end = range.end.clamp(self.begin, self.len());
    }

    /// Run `f` with the active range narrowed to `range`, restoring the
    /// previous range and sign flag afterwards.
    pub fn with_range<R>(&mut self, range: Range<usize>, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved_range = self.range();
        let saved_signs = self.flags.constant_signs;
        self.set_range(range);
        let result = f(self);
        self.set_range(saved_range);
        self.flags.constant_signs = saved_signs;
        result
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut PacketFlags {
        &mut self.flags
    }

    pub fn is_any_hit(&self) -> bool {
        self.flags.any_hit
    }

    /// Recompute whether the active rays share one sign pattern and record
    /// it in the `constant_signs` flag.
    pub fn compute_signs(&mut self) -> bool {
        let range = self.range();
        let constant = match self.signs.get(range.start) {
            Some(first) => self.signs[range].iter().all(|s| s == first),
            None => true,
        };
        self.flags.constant_signs = constant;
        constant
    }

    #[inline]
    pub fn ray(&self, i: usize) -> Ray {
        Ray::new(self.origins[i], self.directions[i])
    }

    #[inline]
    pub fn origin(&self, i: usize) -> Vec3 {
        self.origins[i]
    }

    #[inline]
    pub fn direction(&self, i: usize) -> Vec3 {
        self.directions[i]
    }

    #[inline]
    pub fn inv_direction(&self, i: usize) -> Vec3 {
        self.inv_directions[i]
    }

    #[inline]
    pub fn sign(&self, i: usize, axis: usize) -> usize {
        self.signs[i][axis]
    }

    #[inline]
    pub fn signs(&self, i: usize) -> [usize; 3] {
        self.signs[i]
    }

    /// Closest hit distance so far, or the ray's maximum distance.
    #[inline]
    pub fn min_t(&self, i: usize) -> f32 {
        self.min_t[i]
    }

    #[inline]
    pub fn max_t(&self, i: usize) -> f32 {
        self.max_t[i]
    }

    /// Record a hit if it is closer than anything found so far.
    /// Returns whether the hit was kept.
    #[inline]
    pub fn record_hit(&mut self, i: usize, t: f32, primitive: u32) -> bool {
        if t > T_EPSILON && t < self.min_t[i] {
            self.min_t[i] = t;
            self.hit_primitive[i] = Some(primitive);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn was_hit(&self, i: usize) -> bool {
        self.hit_primitive[i].is_some()
    }

    pub fn hit(&self, i: usize) -> Option<Hit> {
        self.hit_primitive[i].map(|primitive| Hit {
            t: self.min_t[i],
            primitive,
        })
    }

    /// Forget the hit on ray `i` and restore its full distance.
    pub fn reset_hit(&mut self, i: usize) {
        self.hit_primitive[i] = None;
        self.min_t[i] = self.max_t[i];
    }

    /// Forget every hit and attenuation in the active range.
    pub fn reset_hits(&mut self) {
        for i in self.range() {
            self.reset_hit(i);
            self.transmittance[i] = Vec3::ONE;
        }
    }

    pub fn transmittance(&self, i: usize) -> Vec3 {
        self.transmittance[i]
    }

    /// Multiply the light carried by shadow ray `i` by `filter`.
    pub fn attenuate(&mut self, i: usize, filter: Vec3) {
        self.transmittance[i] *= filter.max(Vec3::ZERO);
    }

    /// True once no light passes along ray `i`.
    pub fn is_opaque(&self, i: usize) -> bool {
        self.transmittance[i].max_element() <= 0.0
    }
}
