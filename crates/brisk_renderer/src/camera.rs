//! Pinhole camera mapping image positions to primary rays.

use brisk_math::{Ray, Vec3};

/// Pinhole camera looking from `eye` towards `target`.
///
/// Image positions are continuous pixel coordinates with `(0, 0)` at the
/// top-left corner, so `(x + 0.5, y + 0.5)` is the center of pixel `(x, y)`.
#[derive(Debug, Clone)]
pub struct Camera {
    width: u32,
    height: u32,
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    /// Vertical field of view in degrees.
    fov_y: f32,
    top_left: Vec3,
    step_x: Vec3,
    step_y: Vec3,
}

impl Camera {
    /// A 512x512 camera at the origin looking down -Z with a 60 degree
    /// vertical field of view.
    pub fn new() -> Self {
        let mut camera = Self {
            width: 512,
            height: 512,
            eye: Vec3::ZERO,
            target: -Vec3::Z,
            up: Vec3::Y,
            fov_y: 60.0,
            top_left: Vec3::ZERO,
            step_x: Vec3::ZERO,
            step_y: Vec3::ZERO,
        };
        camera.update_image_plane();
        camera
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self.update_image_plane();
        self
    }

    pub fn with_position(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.eye = eye;
        self.target = target;
        self.up = up;
        self.update_image_plane();
        self
    }

    pub fn with_fov(mut self, fov_y: f32) -> Self {
        self.fov_y = fov_y;
        self.update_image_plane();
        self
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn position(&self) -> Vec3 {
        self.eye
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// Place the image plane one unit in front of the eye.
    fn update_image_plane(&mut self) {
        let forward = self.forward();
        let right = forward.cross(self.up).normalize_or_zero();
        let down = forward.cross(right);

        let plane_height = 2.0 * (self.fov_y.to_radians() * 0.5).tan();
        let plane_width = plane_height * self.width as f32 / self.height as f32;

        self.step_x = right * (plane_width / self.width as f32);
        self.step_y = down * (plane_height / self.height as f32);
        self.top_left = self.eye + forward - right * (plane_width * 0.5) - down * (plane_height * 0.5);
    }

    /// Ray through image position `(x, y)`.
    pub fn ray_at(&self, x: f32, y: f32) -> Ray {
        let on_plane = self.top_left + self.step_x * x + self.step_y * y;
        Ray::new(self.eye, on_plane - self.eye)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
