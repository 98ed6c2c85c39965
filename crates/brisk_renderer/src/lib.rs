//! Brisk renderer - deadline-driven adaptive image refinement.
//!
//! Shades the image coarsely first, then spends whatever time remains in
//! each frame refining the tiles whose samples disagree the most. Primary
//! and shadow rays go through the KD-tree in `brisk_accel`.

mod camera;
mod config;
mod error;
mod fragment;
mod image;
mod load_balancer;
mod queue;
mod sampler;
mod scene;
mod tile;
mod traverser;
mod worker;

pub use camera::Camera;
pub use config::{DeadlineConfig, PriorityScheme};
pub use error::{ConfigError, RenderError};
pub use fragment::{luminance, Fragment};
pub use image::{color_to_rgba, ImageBuffer};
pub use load_balancer::{CyclicLoadBalancer, LoadBalancer};
pub use queue::ApproximatePriorityQueue;
pub use sampler::{JitterSampler, PixelSampler, SamplerSet, SingleSampler, SUPERSAMPLE_LADDER};
pub use scene::{FragmentRenderer, PointLight, SceneRenderer};
pub use tile::{Tile, TilePool};
pub use traverser::{DeadlineImageTraverser, FrameStats, Phase, RenderRegion};
pub use worker::{WorkerContext, MAX_WORKERS};

pub use brisk_accel::Color;
pub use brisk_math::Vec3;
