// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    DEFAULT_HEADROOM, DEFAULT_RESOLUTION, DisplayTarget, MIN_RESOLUTION, POLTEX_MAX_HEADROOM,
    POLTEX_MIN_HEADROOM, POLTEX_STRIDE,
};
use crate::errors::{ConfigError, PipelineResult};
use crate::voxel::{AspectRatioMode, OverflowPolicy, RenderMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renderer configuration
///
/// Plain named fields; [`Config::validate`] runs before any buffer is allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version of the persisted file
    pub version: u32,
    /// X/Y resolution of the depth capture (must be greater than 8)
    pub resolution: u32,
    /// Initial poltex headroom, 1..=15 (grown automatically on overflow)
    pub headroom: u32,
    /// How the render aspect ratio is sourced
    pub aspect_mode: AspectRatioMode,
    /// User aspect ratio (Independent mode) or multiplier (capture volume modes)
    pub aspect_ratio: [f32; 3],
    /// Offset applied to every point after scaling
    pub position_offset: [f32; 3],
    /// Depth-test samples so only the nearest point per line survives.
    /// Off gives an "X-ray" view of every captured surface.
    pub camera_occluding: bool,
    /// 0 = off, -1 = cube, positive = cylinder of this radius
    pub clip_radius: f32,
    /// Global brightness multiplier
    pub brightness: f32,
    /// Margin a new sample must beat the incumbent depth by
    pub depth_threshold: f32,
    /// Hardware family fed by the draw sink
    pub display_target: DisplayTarget,
    /// Bytes per draw call; `None` uses the display target's default
    pub group_byte_budget: Option<usize>,
    /// What happens when the point buffer fills up mid-pass
    pub overflow_policy: OverflowPolicy,
    /// Which buffer is drawn and how
    pub render_mode: RenderMode,
}

impl Config {
    /// Current schema version
    pub const VERSION: u32 = 1;

    /// Effective bytes per draw call
    pub fn group_byte_budget(&self) -> usize {
        self.group_byte_budget
            .unwrap_or_else(|| self.display_target.default_group_budget())
    }

    /// Check every field against the pipeline limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution <= MIN_RESOLUTION {
            return Err(ConfigError::ResolutionTooLow {
                resolution: self.resolution,
                minimum: MIN_RESOLUTION,
            });
        }
        if !(POLTEX_MIN_HEADROOM..=POLTEX_MAX_HEADROOM).contains(&self.headroom) {
            return Err(ConfigError::HeadroomOutOfRange {
                headroom: self.headroom,
                min: POLTEX_MIN_HEADROOM,
                max: POLTEX_MAX_HEADROOM,
            });
        }
        let budget = self.group_byte_budget();
        if budget < POLTEX_STRIDE {
            return Err(ConfigError::InvalidGroupBudget(budget));
        }
        Ok(())
    }

    /// Default location: `<config dir>/vxlit/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("vxlit")
            .join("config.json")
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), version = config.version, "Loaded config");
        Ok(config)
    }

    /// Load the config at `path`, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> PipelineResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            resolution: DEFAULT_RESOLUTION,
            headroom: DEFAULT_HEADROOM,
            aspect_mode: AspectRatioMode::default(), // Fit to capture volume
            aspect_ratio: [1.0, 1.0, 1.0],
            position_offset: [0.0, 0.0, 0.0],
            camera_occluding: true,
            clip_radius: 0.0,
            brightness: 1.0,
            depth_threshold: 0.0,
            display_target: DisplayTarget::default(),
            group_byte_budget: None,
            overflow_policy: OverflowPolicy::default(),
            render_mode: RenderMode::default(),
        }
    }
}
