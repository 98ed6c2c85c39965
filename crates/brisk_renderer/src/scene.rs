//! Shading of primary rays through the KD-tree.

use std::sync::Arc;

use brisk_accel::packet::MAX_SIZE;
use brisk_accel::{PacketFlags, PrimitiveSet, RayPacket, SharedKdTree};
use brisk_math::{Ray, Vec3};

use crate::{Camera, Color};

/// Offset along the normal for shadow ray origins.
const SHADOW_BIAS: f32 = 1e-3;

/// Turns primary rays into colors. Samplers generate the rays through
/// [`FragmentRenderer::primary_ray`] and hand them back in packets.
pub trait FragmentRenderer: Send + Sync {
    /// Ray through the continuous image position `(x, y)`.
    fn primary_ray(&self, x: f32, y: f32) -> Ray;

    /// Write the color seen along each ray of the packet's active range to
    /// `colors[i]`.
    fn shade(&self, rays: &mut RayPacket, colors: &mut [Color]);
}

/// A point light.
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Color,
}

/// Direct lighting with shadows over a primitive set indexed by a shared
/// KD-tree.
pub struct SceneRenderer {
    camera: Camera,
    primitives: Arc<dyn PrimitiveSet>,
    tree: SharedKdTree,
    light: PointLight,
    ambient: Color,
    background: Color,
}

impl SceneRenderer {
    pub fn new(camera: Camera, primitives: Arc<dyn PrimitiveSet>, tree: SharedKdTree, light: PointLight) -> Self {
        Self {
            camera,
            primitives,
            tree,
            light,
            ambient: Color::splat(0.1),
            background: Color::new(0.5, 0.7, 1.0),
        }
    }

    pub fn with_ambient(mut self, ambient: Color) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }
}

impl FragmentRenderer for SceneRenderer {
    fn primary_ray(&self, x: f32, y: f32) -> Ray {
        self.camera.ray_at(x, y)
    }

    fn shade(&self, rays: &mut RayPacket, colors: &mut [Color]) {
        let tree = self.tree.snapshot();
        let set = self.primitives.as_ref();
        tree.intersect(set, rays);

        let mut shadow = RayPacket::new(PacketFlags::shadow());
        let mut owner = [0usize; MAX_SIZE];
        let mut lit = [Color::ZERO; MAX_SIZE];

        for i in rays.range() {
            let Some(hit) = rays.hit(i) else {
                colors[i] = self.background;
                continue;
            };
            let id = hit.primitive as usize;
            let direction = rays.direction(i);
            let point = rays.origin(i) + direction * hit.t;
            let mut normal = set.normal(id, point);
            if normal.dot(direction) > 0.0 {
                normal = -normal;
            }
            let albedo = set.material(id).albedo;
            colors[i] = albedo * self.ambient;

            let to_light = self.light.position - point;
            let distance = to_light.length();
            let cosine = if distance > 0.0 { normal.dot(to_light) / distance } else { 0.0 };
            if cosine <= 0.0 {
                continue;
            }
            let origin = point + normal * SHADOW_BIAS;
            if let Some(k) = shadow.push(Ray::new(origin, to_light / distance), distance) {
                owner[k] = i;
                lit[k] = albedo * self.light.color * cosine;
            }
        }

        if shadow.is_empty() {
            return;
        }
        tree.intersect(set, &mut shadow);
        for k in shadow.range() {
            if shadow.was_hit(k) {
                continue;
            }
            colors[owner[k]] += lit[k] * shadow.transmittance(k);
        }
    }
}
