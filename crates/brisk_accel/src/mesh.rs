//! Indexed triangle meshes.

use brisk_math::{Aabb, Interval, Vec3, T_EPSILON};

use crate::{triangle::intersect_triangle, ClippableView, Material, PrimitiveSet, RayPacket};

/// A triangle soup with shared vertices and per-triangle materials.
///
/// Every triangle is a primitive, so the KD-tree can clip it exactly
/// against node bounds.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    positions: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    material_ids: Vec<u32>,
    materials: Vec<Material>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material and return its slot.
    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    pub fn add_vertex(&mut self, p: Vec3) -> u32 {
        self.positions.push(p);
        (self.positions.len() - 1) as u32
    }

    /// Add a triangle over existing vertices. Returns its primitive id.
    pub fn add_indexed(&mut self, indices: [u32; 3], material: u32) -> usize {
        debug_assert!(indices.iter().all(|&i| (i as usize) < self.positions.len()));
        self.indices.push(indices);
        self.material_ids.push(material);
        self.indices.len() - 1
    }

    pub fn add_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, material: u32) -> usize {
        let ia = self.add_vertex(a);
        let ib = self.add_vertex(b);
        let ic = self.add_vertex(c);
        self.add_indexed([ia, ib, ic], material)
    }

    /// Two triangles spanning `corner`, `corner + u`, `corner + u + v` and
    /// `corner + v`.
    pub fn add_quad(&mut self, corner: Vec3, u: Vec3, v: Vec3, material: u32) {
        let a = self.add_vertex(corner);
        let b = self.add_vertex(corner + u);
        let c = self.add_vertex(corner + u + v);
        let d = self.add_vertex(corner + v);
        self.add_indexed([a, b, c], material);
        self.add_indexed([a, c, d], material);
    }

    /// Twelve outward-facing triangles covering an axis-aligned box.
    pub fn add_box(&mut self, min: Vec3, max: Vec3, material: u32) {
        let d = max - min;
        let (dx, dy, dz) = (Vec3::X * d.x, Vec3::Y * d.y, Vec3::Z * d.z);
        self.add_quad(min, dy, dx, material); // -z
        self.add_quad(min + dz, dx, dy, material); // +z
        self.add_quad(min, dz, dy, material); // -x
        self.add_quad(min + dx, dy, dz, material); // +x
        self.add_quad(min, dx, dz, material); // -y
        self.add_quad(min + dy, dz, dx, material); // +y
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    fn vertices(&self, id: usize) -> [Vec3; 3] {
        let [a, b, c] = self.indices[id];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }
}

impl PrimitiveSet for TriangleMesh {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn primitive_bounds(&self, id: usize) -> Aabb {
        Aabb::from_iter_points(self.vertices(id))
    }

    fn intersect(&self, id: usize, rays: &mut RayPacket) {
        let [v0, v1, v2] = self.vertices(id);
        for i in rays.range() {
            let ray_t = Interval::new(T_EPSILON, rays.min_t(i));
            if let Some(t) = intersect_triangle(&rays.ray(i), v0, v1, v2, ray_t) {
                rays.record_hit(i, t, id as u32);
            }
        }
    }

    fn normal(&self, id: usize, _point: Vec3) -> Vec3 {
        let [a, b, c] = self.vertices(id);
        (b - a).cross(c - a).normalize_or_zero()
    }

    fn material(&self, id: usize) -> Material {
        self.materials
            .get(self.material_ids[id] as usize)
            .copied()
            .unwrap_or_default()
    }

    fn as_clippable(&self) -> Option<&dyn ClippableView> {
        Some(self)
    }
}

impl ClippableView for TriangleMesh {
    fn triangle(&self, id: usize) -> [Vec3; 3] {
        self.vertices(id)
    }
}
