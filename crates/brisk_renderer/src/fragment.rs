//! Groups of pixels shaded together.

use brisk_accel::packet::MAX_SIZE as PACKET_SIZE;

use crate::Color;

/// Luminance of a linear RGB color.
#[inline]
pub fn luminance(c: Color) -> f32 {
    c.x * 0.3 + c.y * 0.59 + c.z * 0.11
}

/// Up to [`Fragment::MAX_SIZE`] pixels with one color each.
///
/// Every pixel covers a `pixel_width x pixel_height` block of the image
/// starting at its coordinates, so coarse passes can shade one sample and
/// fill the whole block.
#[derive(Debug, Clone)]
pub struct Fragment {
    pixels: [(u32, u32); PACKET_SIZE],
    colors: [Color; PACKET_SIZE],
    len: usize,
    pixel_width: u32,
    pixel_height: u32,
}

impl Fragment {
    /// Largest number of pixels in one fragment; matches the ray packet
    /// capacity.
    pub const MAX_SIZE: usize = PACKET_SIZE;

    pub fn new(pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            pixels: [(0, 0); Self::MAX_SIZE],
            colors: [Color::ZERO; Self::MAX_SIZE],
            len: 0,
            pixel_width: pixel_width.max(1),
            pixel_height: pixel_height.max(1),
        }
    }

    /// Fragment covering `[x0, x1) x [y0, y1)` with pixels of the given
    /// size, in row-major order. Pixels past `MAX_SIZE` are dropped.
    pub fn covering(x0: u32, y0: u32, x1: u32, y1: u32, pixel_width: u32, pixel_height: u32) -> Self {
        let mut frag = Self::new(pixel_width, pixel_height);
        for y in (y0..y1).step_by(frag.pixel_height as usize) {
            for x in (x0..x1).step_by(frag.pixel_width as usize) {
                if !frag.push(x, y) {
                    return frag;
                }
            }
        }
        frag
    }

    /// Append a pixel. Returns false when the fragment is full.
    pub fn push(&mut self, x: u32, y: u32) -> bool {
        if self.len >= Self::MAX_SIZE {
            return false;
        }
        self.pixels[self.len] = (x, y);
        self.colors[self.len] = Color::ZERO;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }

    pub fn pixel(&self, i: usize) -> (u32, u32) {
        self.pixels[i]
    }

    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels[..self.len]
    }

    pub fn color(&self, i: usize) -> Color {
        self.colors[i]
    }

    pub fn set_color(&mut self, i: usize, color: Color) {
        self.colors[i] = color;
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors[..self.len]
    }

    /// Paint every pixel with one color.
    pub fn fill(&mut self, color: Color) {
        self.colors[..self.len].fill(color);
    }

    /// Population variance of the pixel luminances.
    pub fn luminance_variance(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        let (sum, sum2) = self.colors().iter().fold((0.0f64, 0.0f64), |(s, s2), &c| {
            let l = luminance(c) as f64;
            (s + l, s2 + l * l)
        });
        let n = self.len as f64;
        ((sum2 - sum * sum / n) / n).max(0.0) as f32
    }

    /// Smallest and largest pixel luminance.
    pub fn luminance_range(&self) -> (f32, f32) {
        self.colors()
            .iter()
            .map(|&c| luminance(c))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), l| (lo.min(l), hi.max(l)))
    }
}
