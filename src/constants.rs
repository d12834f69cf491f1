// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use serde::{Deserialize, Serialize};

/// Size of one poltex record in bytes (3 × f32 position, 2 × f32 uv, u32 colour)
pub const POLTEX_STRIDE: usize = 24;

/// Size of one depth-buffer entry in bytes (f32 value, i32 data index, i32 frame tag)
pub const DEPTH_SAMPLE_STRIDE: usize = 12;

/// Number of entries in the resolve counter buffer
/// (0 = refined write index, 1 = frame tag, 2 = raw write index)
pub const INDEX_COUNT: usize = 3;

/// Upper bound for the automatically managed poltex headroom
pub const POLTEX_MAX_HEADROOM: u32 = 15;

/// Lower bound for the poltex headroom
pub const POLTEX_MIN_HEADROOM: u32 = 1;

/// Headroom a fresh renderer starts with
pub const DEFAULT_HEADROOM: u32 = 4;

/// Resolutions at or below this value cannot be rendered
pub const MIN_RESOLUTION: u32 = 8;

/// Default X/Y resolution of the depth capture
pub const DEFAULT_RESOLUTION: u32 = 400;

/// Display targets the draw sink can be feeding
///
/// The two hardware families accept very different amounts of data per draw
/// call, so the target selects the per-call byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayTarget {
    /// Swept-LED volumetric display
    #[default]
    Led,
    /// Voxel-box (projector) volumetric display
    VoxieBox,
}

impl DisplayTarget {
    /// All targets, for CLI listings
    pub const ALL: [DisplayTarget; 2] = [DisplayTarget::Led, DisplayTarget::VoxieBox];

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            DisplayTarget::Led => "Swept LED",
            DisplayTarget::VoxieBox => "VoxieBox",
        }
    }

    /// Default number of bytes sent per draw call
    ///
    /// - LED: 100 000 poltex per call
    /// - VoxieBox: 1 MiB per call
    pub fn default_group_budget(&self) -> usize {
        match self {
            DisplayTarget::Led => batching::LED_GROUP_POLTEX * POLTEX_STRIDE,
            DisplayTarget::VoxieBox => batching::VOXIEBOX_GROUP_BYTES,
        }
    }

    /// Whether render aspect ratios need the voxel-box doubling
    pub fn doubles_aspect(&self) -> bool {
        matches!(self, DisplayTarget::VoxieBox)
    }
}

/// Draw call batching
pub mod batching {
    /// Bytes per draw call for voxel-box hardware
    pub const VOXIEBOX_GROUP_BYTES: usize = 1024 * 1024;

    /// Poltex per draw call for LED hardware
    pub const LED_GROUP_POLTEX: usize = 100_000;
}

/// Unity-space to display-space conversion
pub mod space {
    /// One capture-volume unit in display units
    pub const UNITY_TO_DISPLAY_SCALE: f32 = 0.1;

    /// Camera position threshold while the camera is stationary
    pub const CAM_POS_THRESHOLD: f32 = 0.5;

    /// Camera position threshold for the first refresh after the camera moved
    pub const CAM_POS_THRESHOLD_MOVED: f32 = 10.0;

    /// Extra margin applied when fitting an orthographic camera to a capture cylinder
    pub const CYLINDER_FIT_MARGIN: f32 = 0.55;
}

/// Application information utilities
pub mod app_info {
    /// Application version from the build environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

/// Default file names for exports
pub mod exports {
    /// Frame dump file name stem
    pub const FRAME_PREFIX: &str = "vxlit_frame";
    /// Timestamp format used in default file names
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Largest Cantor pairing index for a `resolution × resolution` line grid
///
/// For keys in `0..resolution` the maximum is reached at
/// `(resolution - 1, resolution - 1)` and equals `2r² − 2r`.
pub fn max_depth_index(resolution: u32) -> usize {
    let r = resolution as usize;
    2 * r * r - 2 * r
}

/// Number of poltex records a buffer holds at a given resolution and headroom
pub fn max_points(resolution: u32, headroom: u32) -> usize {
    let r = resolution as usize;
    r * r * headroom as usize
}
