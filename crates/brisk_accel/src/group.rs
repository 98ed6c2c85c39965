//! Heterogeneous shape lists.

use brisk_math::{Aabb, Vec3};

use crate::{primitive::intersect_shape, Hittable, Material, PrimitiveSet, RayPacket};

/// A list of boxed shapes, each with its own material.
///
/// Shapes are not clippable; the builder narrows them by box overlap.
#[derive(Default)]
pub struct PrimitiveGroup {
    shapes: Vec<Box<dyn Hittable>>,
    materials: Vec<Material>,
    bounds: Aabb,
}

impl PrimitiveGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape. Returns its primitive id.
    pub fn add(&mut self, shape: impl Hittable + 'static, material: Material) -> usize {
        self.bounds.extend_by_box(&shape.bounding_box());
        self.shapes.push(Box::new(shape));
        self.materials.push(material);
        self.shapes.len() - 1
    }
}

impl PrimitiveSet for PrimitiveGroup {
    fn len(&self) -> usize {
        self.shapes.len()
    }

    fn primitive_bounds(&self, id: usize) -> Aabb {
        self.shapes[id].bounding_box()
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn intersect(&self, id: usize, rays: &mut RayPacket) {
        intersect_shape(self.shapes[id].as_ref(), id as u32, rays);
    }

    fn normal(&self, id: usize, point: Vec3) -> Vec3 {
        self.shapes[id].normal_at(point)
    }

    fn material(&self, id: usize) -> Material {
        self.materials[id]
    }
}
