//! Errors raised while configuring or running the deadline traverser.

use thiserror::Error;

/// Bad traverser arguments, caught at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{flag} expects a value")]
    MissingValue { flag: String },

    #[error("Invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown argument '{0}'")]
    UnknownFlag(String),

    #[error("Packet size {width}x{height} exceeds the fragment capacity of {max}")]
    PacketTooLarge { width: u32, height: u32, max: usize },

    #[error("Render region ({xstart},{ystart})-({xend},{yend}) is not inside a {width}x{height} image")]
    InvalidRenderRegion {
        xstart: u32,
        ystart: u32,
        xend: u32,
        yend: u32,
        width: u32,
        height: u32,
    },

    #[error("{requested} workers requested, at most {max} are supported")]
    TooManyWorkers { requested: usize, max: usize },
}

/// Failures while rendering a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("No sampler for {0} samples per pixel (expected 4, 16, 64, 256, 1024, 4096 or 16384)")]
    UnsupportedSampleCount(u32),

    #[error("Non-square refinement: {columns}x{rows} pixels per packet")]
    NonSquareSupersample { columns: u32, rows: u32 },

    #[error("Worker index {index} out of range (limit {max})")]
    WorkerIndexOutOfRange { index: usize, max: usize },
}
