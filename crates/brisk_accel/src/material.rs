//! Surface description carried by every primitive.

use brisk_math::Vec3;

/// Color type alias (RGB values typically 0-1)
pub type Color = Vec3;

/// Diffuse reflectance plus how much light passes through the surface.
///
/// Shadow rays are attenuated by `transmittance` each time they cross the
/// surface; a black transmittance blocks light completely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub albedo: Color,
    pub transmittance: Color,
}

impl Material {
    /// An opaque diffuse surface.
    pub const fn opaque(albedo: Color) -> Self {
        Self {
            albedo,
            transmittance: Color::ZERO,
        }
    }

    /// A surface that lets `transmittance` of the light through.
    pub const fn translucent(albedo: Color, transmittance: Color) -> Self {
        Self {
            albedo,
            transmittance,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.transmittance.max_element() <= 0.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque(Color::splat(0.7))
    }
}
