//! Sphere primitive.

use brisk_math::{Aabb, Interval, Ray, Vec3};

use crate::Hittable;

/// A sphere primitive.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    center: Vec3,
    radius: f32,
    bbox: Aabb,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        let radius = radius.max(0.0);
        let rvec = Vec3::splat(radius);
        Self {
            center,
            radius,
            bbox: Aabb::from_points(center - rvec, center + rvec),
        }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Hittable for Sphere {
    fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<f32> {
        let oc = self.center - ray.origin();
        let a = ray.direction().length_squared();
        let h = ray.direction().dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrtd = discriminant.sqrt();

        // Find the nearest root in the acceptable range
        let root = (h - sqrtd) / a;
        if ray_t.surrounds(root) {
            return Some(root);
        }
        let root = (h + sqrtd) / a;
        ray_t.surrounds(root).then_some(root)
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }

    fn normal_at(&self, point: Vec3) -> Vec3 {
        if self.radius > 0.0 {
            (point - self.center) / self.radius
        } else {
            Vec3::Z
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_hit() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -1.0), 0.5);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let t = sphere.hit(&ray, Interval::new(0.001, f32::INFINITY)).unwrap();
        assert!((t - 0.5).abs() < 0.001); // Should hit at t=0.5
    }

    #[test]
    fn test_sphere_hit_from_inside() {
        let sphere = Sphere::new(Vec3::ZERO, 2.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let t = sphere.hit(&ray, Interval::new(0.001, f32::INFINITY)).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_miss() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -1.0), 0.5);
        // Ray pointing away from sphere
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        assert!(sphere.hit(&ray, Interval::new(0.001, f32::INFINITY)).is_none());
    }

    #[test]
    fn test_sphere_normal() {
        let sphere = Sphere::new(Vec3::new(1.0, 0.0, 0.0), 2.0);
        assert_eq!(sphere.normal_at(Vec3::new(3.0, 0.0, 0.0)), Vec3::X);
    }
}
