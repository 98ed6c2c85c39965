//! Deadline traverser configuration and its command-line style parsing.

use std::str::FromStr;

use crate::{ConfigError, Fragment};

/// How refinement priority is computed for a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityScheme {
    /// Tile area only, so coarse tiles go first.
    Fifo,
    /// Luminance variance of the tile's samples times tile area.
    #[default]
    LuminanceVariance,
    /// Michelson contrast of the tile's samples times tile area.
    Contrast,
    /// `Fifo` until the tile magnification drops under the cutoff, then
    /// `LuminanceVariance`.
    FifoToLuminance,
    /// Inverse distance to the render region center times tile area.
    Center,
}

impl FromStr for PriorityScheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIFO" => Ok(Self::Fifo),
            "luminancevariance" => Ok(Self::LuminanceVariance),
            "contrast" => Ok(Self::Contrast),
            "FIFOluminance" => Ok(Self::FifoToLuminance),
            "center" => Ok(Self::Center),
            _ => Err(()),
        }
    }
}

/// Configuration for [`crate::DeadlineImageTraverser`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineConfig {
    /// Pixels per fragment, as `(columns, rows)`.
    pub packet_size: (u32, u32),
    /// Target frames per second. Each frame gets `1 / frame_rate` seconds.
    pub frame_rate: f32,
    /// Block size of one coarse pass pixel.
    pub coarse_pixel_size: (u32, u32),
    /// Magnification divisor applied to a tile on every refinement.
    pub refinement_ratio: (u32, u32),
    pub priority: PriorityScheme,
    /// Magnification below which `FifoToLuminance` switches to variance.
    pub fifo_cutoff: f32,
    /// Paint supersampled fragments with the wall clock instead of the scene.
    pub show_time: bool,
    /// Report convergence as a benchmark measurement.
    pub benchmark: bool,
    /// Refinements needing more samples per pixel than this are dropped.
    pub max_spp: u32,
    /// Sub-queue count of the tile queue.
    pub num_sub_queues: usize,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            packet_size: default_packet_size(),
            frame_rate: 15.0,
            coarse_pixel_size: (8, 8),
            refinement_ratio: (2, 2),
            priority: PriorityScheme::default(),
            fifo_cutoff: 1.0,
            show_time: false,
            benchmark: false,
            max_spp: 1024,
            num_sub_queues: 16,
        }
    }
}

/// Roughly square packet filling a fragment, wider than tall.
fn default_packet_size() -> (u32, u32) {
    let max = Fragment::MAX_SIZE as u32;
    let mut rows = 1;
    while rows * rows * 2 < max {
        rows *= 2;
    }
    (max / rows, rows)
}

impl DeadlineConfig {
    /// Parse traverser arguments such as
    /// `["-packetsize", "4x4", "-priority", "contrast"]`.
    ///
    /// Flags may appear in any order; every flag except `-showtime` and
    /// `-dart_benchmark` takes the following token as its value.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut tokens = args.iter().map(AsRef::as_ref);

        while let Some(flag) = tokens.next() {
            match flag {
                "-packetsize" => {
                    let (width, height) = resolution(flag, tokens.next())?;
                    if (width * height) as usize > Fragment::MAX_SIZE {
                        return Err(ConfigError::PacketTooLarge {
                            width,
                            height,
                            max: Fragment::MAX_SIZE,
                        });
                    }
                    config.packet_size = (width, height);
                }
                "-framerate" => {
                    config.frame_rate = value(flag, tokens.next())?;
                    if !(config.frame_rate > 0.0 && config.frame_rate.is_finite()) {
                        return Err(invalid(flag, &config.frame_rate.to_string()));
                    }
                }
                "-magnification" => config.coarse_pixel_size = resolution(flag, tokens.next())?,
                "-priority" => {
                    let name = tokens.next().ok_or_else(|| missing(flag))?;
                    config.priority = name.parse().map_err(|_| invalid(flag, name))?;
                }
                "-FIFOCutoff" => config.fifo_cutoff = value(flag, tokens.next())?,
                "-refinmentRatio" => config.refinement_ratio = resolution(flag, tokens.next())?,
                "-showtime" => config.show_time = true,
                "-dart_benchmark" => config.benchmark = true,
                "-max_spp" => config.max_spp = value(flag, tokens.next())?,
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
        }
        Ok(config)
    }

    /// Seconds available to one frame.
    pub fn frame_time(&self) -> f64 {
        1.0 / self.frame_rate as f64
    }

    /// Image pixels covered by one coarse tile.
    pub fn coarse_tile_size(&self) -> (u32, u32) {
        (
            self.packet_size.0 * self.coarse_pixel_size.0,
            self.packet_size.1 * self.coarse_pixel_size.1,
        )
    }

    /// Number of coarse tiles, as `(columns, rows)`, for an image.
    pub fn coarse_tiles(&self, width: u32, height: u32) -> (u32, u32) {
        let coarse_x = width.div_ceil(self.coarse_pixel_size.0);
        let coarse_y = height.div_ceil(self.coarse_pixel_size.1);
        (
            coarse_x.div_ceil(self.packet_size.0),
            coarse_y.div_ceil(self.packet_size.1),
        )
    }
}

fn missing(flag: &str) -> ConfigError {
    ConfigError::MissingValue { flag: flag.to_string() }
}

fn invalid(flag: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

fn value<T: FromStr>(flag: &str, token: Option<&str>) -> Result<T, ConfigError> {
    let token = token.ok_or_else(|| missing(flag))?;
    token.parse().map_err(|_| invalid(flag, token))
}

/// Parse a `WxH` pair of positive integers.
fn resolution(flag: &str, token: Option<&str>) -> Result<(u32, u32), ConfigError> {
    let token = token.ok_or_else(|| missing(flag))?;
    let parsed = token
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(invalid(flag, token)),
    }
}
