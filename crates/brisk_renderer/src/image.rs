//! Frame buffer shared by the render workers.

use parking_lot::Mutex;

use crate::{Color, Fragment};

/// Convert linear to gamma space (gamma 2).
#[inline]
fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let r = (255.0 * linear_to_gamma(color.x).clamp(0.0, 1.0)) as u8;
    let g = (255.0 * linear_to_gamma(color.y).clamp(0.0, 1.0)) as u8;
    let b = (255.0 * linear_to_gamma(color.z).clamp(0.0, 1.0)) as u8;
    [r, g, b, 255]
}

/// Linear RGB image written concurrently by workers.
#[derive(Debug)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<Color>>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Mutex::new(vec![Color::ZERO; width as usize * height as usize]),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the pixel at (x, y). Black outside the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        if x >= self.width || y >= self.height {
            return Color::ZERO;
        }
        self.pixels.lock()[(y * self.width + x) as usize]
    }

    /// Write a fragment. Each fragment pixel paints its whole block,
    /// clipped to the image.
    pub fn set_fragment(&self, frag: &Fragment) {
        let (pw, ph) = frag.pixel_size();
        let mut pixels = self.pixels.lock();
        for (&(x, y), &color) in frag.pixels().iter().zip(frag.colors()) {
            if x >= self.width || y >= self.height {
                continue;
            }
            let x_end = x.saturating_add(pw).min(self.width);
            let y_end = y.saturating_add(ph).min(self.height);
            for py in y..y_end {
                let row = (py * self.width) as usize;
                pixels[row + x as usize..row + x_end as usize].fill(color);
            }
        }
    }

    /// Fill the whole image with one color.
    pub fn clear(&self, color: Color) {
        self.pixels.lock().fill(color);
    }

    /// Copy of the current pixels in row-major order.
    pub fn snapshot(&self) -> Vec<Color> {
        self.pixels.lock().clone()
    }

    /// Convert to RGBA bytes (for display or saving).
    pub fn to_rgba(&self) -> Vec<u8> {
        let pixels = self.pixels.lock();
        let mut bytes = Vec::with_capacity(pixels.len() * 4);
        for color in pixels.iter() {
            bytes.extend_from_slice(&color_to_rgba(*color));
        }
        bytes
    }
}
