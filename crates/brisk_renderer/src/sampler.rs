//! Pixel samplers: how many rays each fragment pixel gets and where.

use brisk_accel::{PacketFlags, RayPacket};
use rand::rngs::StdRng;
use rand::Rng;

use crate::{Color, Fragment, FragmentRenderer, RenderError};

/// Supersampling rates available to refinement, in samples per pixel.
pub const SUPERSAMPLE_LADDER: [u32; 7] = [4, 16, 64, 256, 1024, 4096, 16384];

/// Something that fills a fragment's colors by tracing rays.
pub trait PixelSampler: Send + Sync {
    fn samples_per_pixel(&self) -> u32;

    fn render_fragment(&self, renderer: &dyn FragmentRenderer, frag: &mut Fragment, rng: &mut StdRng);
}

/// One ray through the center of each fragment pixel's block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSampler;

impl PixelSampler for SingleSampler {
    fn samples_per_pixel(&self) -> u32 {
        1
    }

    fn render_fragment(&self, renderer: &dyn FragmentRenderer, frag: &mut Fragment, _rng: &mut StdRng) {
        let (pw, ph) = frag.pixel_size();
        let (cx, cy) = (pw as f32 * 0.5, ph as f32 * 0.5);
        let mut packet = RayPacket::new(PacketFlags::primary());
        for &(x, y) in frag.pixels() {
            packet.push(renderer.primary_ray(x as f32 + cx, y as f32 + cy), f32::MAX);
        }
        let mut colors = [Color::ZERO; Fragment::MAX_SIZE];
        renderer.shade(&mut packet, &mut colors);
        for (i, &color) in colors.iter().enumerate().take(frag.len()) {
            frag.set_color(i, color);
        }
    }
}

/// Stratified jitter: `n x n` strata per pixel with one random sample in
/// each, averaged into the pixel color.
#[derive(Debug, Clone, Copy)]
pub struct JitterSampler {
    strata: u32,
}

impl JitterSampler {
    /// Sampler taking `samples_per_pixel` samples, which must be a perfect
    /// square.
    pub fn new(samples_per_pixel: u32) -> Result<Self, RenderError> {
        let strata = (samples_per_pixel as f64).sqrt().round() as u32;
        if strata == 0 || strata * strata != samples_per_pixel {
            return Err(RenderError::UnsupportedSampleCount(samples_per_pixel));
        }
        Ok(Self { strata })
    }
}

impl PixelSampler for JitterSampler {
    fn samples_per_pixel(&self) -> u32 {
        self.strata * self.strata
    }

    fn render_fragment(&self, renderer: &dyn FragmentRenderer, frag: &mut Fragment, rng: &mut StdRng) {
        let mut packet = RayPacket::new(PacketFlags::primary());
        let mut owner = [0usize; Fragment::MAX_SIZE];
        let mut colors = [Color::ZERO; Fragment::MAX_SIZE];
        let mut sums = [Color::ZERO; Fragment::MAX_SIZE];

        let mut flush = |packet: &mut RayPacket, owner: &[usize], sums: &mut [Color]| {
            renderer.shade(packet, &mut colors);
            for k in packet.range() {
                sums[owner[k]] += colors[k];
            }
            packet.clear();
        };

        let n = self.strata as f32;
        for (p, &(x, y)) in frag.pixels().iter().enumerate() {
            for sy in 0..self.strata {
                for sx in 0..self.strata {
                    let px = x as f32 + (sx as f32 + rng.gen::<f32>()) / n;
                    let py = y as f32 + (sy as f32 + rng.gen::<f32>()) / n;
                    if let Some(k) = packet.push(renderer.primary_ray(px, py), f32::MAX) {
                        owner[k] = p;
                    }
                    if packet.is_full() {
                        flush(&mut packet, &owner, &mut sums);
                    }
                }
            }
        }
        if !packet.is_empty() {
            flush(&mut packet, &owner, &mut sums);
        }

        let scale = 1.0 / self.samples_per_pixel() as f32;
        for (i, sum) in sums.iter().enumerate().take(frag.len()) {
            frag.set_color(i, *sum * scale);
        }
    }
}

/// The plain sampler plus one jitter sampler per ladder rung.
#[derive(Debug, Clone)]
pub struct SamplerSet {
    single: SingleSampler,
    jitter: Vec<JitterSampler>,
}

impl SamplerSet {
    pub fn new() -> Self {
        let jitter = SUPERSAMPLE_LADDER
            .iter()
            .filter_map(|&spp| JitterSampler::new(spp).ok())
            .collect();
        Self {
            single: SingleSampler,
            jitter,
        }
    }

    pub fn single(&self) -> &SingleSampler {
        &self.single
    }

    /// The jitter sampler for exactly `spp` samples per pixel.
    pub fn jitter(&self, spp: u32) -> Result<&JitterSampler, RenderError> {
        self.jitter
            .iter()
            .find(|s| s.samples_per_pixel() == spp)
            .ok_or(RenderError::UnsupportedSampleCount(spp))
    }
}

impl Default for SamplerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brisk_math::{Ray, Vec3};
    use rand::SeedableRng;

    /// White to the right of x = 0.5, black elsewhere.
    struct Edge;

    impl FragmentRenderer for Edge {
        fn primary_ray(&self, x: f32, y: f32) -> Ray {
            Ray::new(Vec3::new(x, y, 0.0), Vec3::Z)
        }

        fn shade(&self, rays: &mut RayPacket, colors: &mut [Color]) {
            for i in rays.range() {
                colors[i] = if rays.origin(i).x > 0.5 { Color::ONE } else { Color::ZERO };
            }
        }
    }

    #[test]
    fn test_single_sampler_uses_block_center() {
        let mut frag = Fragment::covering(0, 0, 2, 1, 1, 1);
        let mut rng = StdRng::seed_from_u64(0);
        SingleSampler.render_fragment(&Edge, &mut frag, &mut rng);
        // Pixel 0 center is x = 0.5 (not > 0.5), pixel 1 center is x = 1.5.
        assert_eq!(frag.color(0), Color::ZERO);
        assert_eq!(frag.color(1), Color::ONE);
    }

    #[test]
    fn test_jitter_averages_strata() {
        let mut frag = Fragment::covering(0, 0, 1, 1, 1, 1);
        let mut rng = StdRng::seed_from_u64(1);
        JitterSampler::new(16).unwrap().render_fragment(&Edge, &mut frag, &mut rng);
        // Two of four stratum columns lie right of the edge.
        assert!((frag.color(0).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_large_rates_span_packets() {
        let mut frag = Fragment::covering(3, 0, 4, 1, 1, 1);
        let mut rng = StdRng::seed_from_u64(2);
        JitterSampler::new(256).unwrap().render_fragment(&Edge, &mut frag, &mut rng);
        assert!((frag.color(0) - Color::ONE).length() < 1e-5);
    }

    #[test]
    fn test_ladder() {
        let samplers = SamplerSet::new();
        for spp in SUPERSAMPLE_LADDER {
            assert_eq!(samplers.jitter(spp).unwrap().samples_per_pixel(), spp);
        }
        assert!(matches!(samplers.jitter(9), Err(RenderError::UnsupportedSampleCount(9))));
        assert!(JitterSampler::new(8).is_err());
    }
}
