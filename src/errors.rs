// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the voxel pipeline
//!
//! None of these are fatal to the host process. Configuration errors disable
//! the renderer, overflow and dispatch errors cost at most one frame.

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main pipeline error type
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid or unsatisfiable configuration
    Config(ConfigError),
    /// Point buffer exhausted during a resolve pass
    Overflow(OverflowError),
    /// Batch dispatch could not complete
    Dispatch(DispatchError),
    /// Filesystem errors
    Io(String),
    /// Point cloud or image export errors
    Export(String),
}

/// Configuration errors, fatal to the renderer instance
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Resolution at or below the renderable minimum
    ResolutionTooLow { resolution: u32, minimum: u32 },
    /// Headroom outside the managed range
    HeadroomOutOfRange { headroom: u32, min: u32, max: u32 },
    /// Byte budget smaller than a single poltex
    InvalidGroupBudget(usize),
    /// No depth camera has been supplied
    MissingCamera,
    /// Buffer allocation failed
    AllocationFailed { requested: usize },
    /// Depth frame does not match the configured resolution
    FrameSizeMismatch { expected: usize, actual: usize },
    /// Config file could not be parsed
    Parse(String),
}

/// Buffer exhaustion during a resolve pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowError {
    /// Capacity of the exhausted buffer
    pub capacity: usize,
    /// Samples that could not be written this pass
    pub dropped: usize,
    /// Headroom in use when the overflow happened
    pub headroom: u32,
}

/// Dispatch errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Group slice fell outside the point buffer
    Mismatch {
        requested_end: usize,
        available: usize,
        group: usize,
    },
    /// Frame was resolved against buffers that have since been reallocated
    StaleGeneration { frame: u64, current: u64 },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "Configuration error: {}", e),
            PipelineError::Overflow(e) => write!(f, "Overflow: {}", e),
            PipelineError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
            PipelineError::Export(msg) => write!(f, "Export error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ResolutionTooLow {
                resolution,
                minimum,
            } => write!(
                f,
                "resolution {} must be greater than {}",
                resolution, minimum
            ),
            ConfigError::HeadroomOutOfRange { headroom, min, max } => {
                write!(f, "headroom {} outside {}..={}", headroom, min, max)
            }
            ConfigError::InvalidGroupBudget(bytes) => {
                write!(f, "group budget of {} bytes holds no poltex", bytes)
            }
            ConfigError::MissingCamera => write!(f, "no depth camera assigned"),
            ConfigError::AllocationFailed { requested } => {
                write!(f, "failed to allocate {} bytes of point buffers", requested)
            }
            ConfigError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "depth frame has {} pixels, expected {}",
                actual, expected
            ),
            ConfigError::Parse(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl fmt::Display for OverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "poltex buffer of {} full at headroom {}, {} samples dropped",
            self.capacity, self.headroom, self.dropped
        )
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Mismatch {
                requested_end,
                available,
                group,
            } => write!(
                f,
                "poltex data and render buffer mismatch: group {} needs {} of {}",
                group, requested_end, available
            ),
            DispatchError::StaleGeneration { frame, current } => write!(
                f,
                "frame resolved against buffer generation {}, current is {}",
                frame, current
            ),
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for OverflowError {}
impl std::error::Error for DispatchError {}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err)
    }
}

impl From<OverflowError> for PipelineError {
    fn from(err: OverflowError) -> Self {
        PipelineError::Overflow(err)
    }
}

impl From<DispatchError> for PipelineError {
    fn from(err: DispatchError) -> Self {
        PipelineError::Dispatch(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(ConfigError::Parse(err.to_string()))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Export(err.to_string())
    }
}
