// SPDX-License-Identifier: GPL-3.0-only

//! Render parameters derived from the camera, capture volume and settings
//!
//! The depth camera captures in scene units, the display draws in its own
//! units. [`CameraAspectAdapter`] works out how one maps onto the other and
//! only redoes the work when one of its inputs changed.

use super::frame::DepthCamera;
use crate::config::Config;
use crate::constants::DisplayTarget;
use crate::constants::space::{CAM_POS_THRESHOLD, CAM_POS_THRESHOLD_MOVED, UNITY_TO_DISPLAY_SCALE};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where the render aspect ratio comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatioMode {
    /// Use the configured aspect ratio directly
    Independent,
    /// Derive from the capture volume, rescaled so it fits the hardware
    #[default]
    FitToVolume,
    /// Derive from the capture volume without correction; smaller volumes
    /// leave dead space, larger ones clip
    ExtendToVolume,
}

impl AspectRatioMode {
    pub fn uses_volume(&self) -> bool {
        !matches!(self, AspectRatioMode::Independent)
    }
}

/// The region of the scene that is shown on the display
///
/// Scale is in scene axes (y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureVolume {
    pub position: Vec3,
    /// Per-axis extent, used when `uniform` is false
    pub scale: Vec3,
    /// Single extent, used when `uniform` is true
    pub base_scale: f32,
    pub uniform: bool,
}

impl CaptureVolume {
    /// Volume with the same extent on every axis
    pub fn uniform(position: Vec3, base_scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::splat(base_scale),
            base_scale,
            uniform: true,
        }
    }

    /// Volume with independent per-axis extents
    pub fn with_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            base_scale: scale.x,
            uniform: false,
        }
    }

    /// Effective extent in scene axes
    pub fn extent(&self) -> Vec3 {
        if self.uniform {
            Vec3::splat(self.base_scale)
        } else {
            self.scale
        }
    }

    /// Extent in display axes (x, depth, height)
    pub fn display_extent(&self) -> Vec3 {
        let e = self.extent();
        Vec3::new(e.x, e.z, e.y)
    }
}

impl Default for CaptureVolume {
    fn default() -> Self {
        Self::uniform(Vec3::ZERO, 10.0)
    }
}

/// What the display reports about itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareInfo {
    pub target: DisplayTarget,
    /// Physical extent in display units (x, y, height)
    pub aspect: Vec3,
}

impl HardwareInfo {
    pub fn new(target: DisplayTarget, aspect: Vec3) -> Self {
        Self { target, aspect }
    }
}

impl Default for HardwareInfo {
    fn default() -> Self {
        Self::new(DisplayTarget::Led, Vec3::ONE)
    }
}

/// User-facing settings the adapter reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub aspect_mode: AspectRatioMode,
    pub aspect_ratio: Vec3,
    pub position_offset: Vec3,
    pub camera_occluding: bool,
    pub clip_radius: f32,
    pub brightness: f32,
    pub depth_threshold: f32,
}

impl From<&Config> for RenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            aspect_mode: config.aspect_mode,
            aspect_ratio: Vec3::from(config.aspect_ratio),
            position_offset: Vec3::from(config.position_offset),
            camera_occluding: config.camera_occluding,
            clip_radius: config.clip_radius,
            brightness: config.brightness,
            depth_threshold: config.depth_threshold,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Parameters the projection step consumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParameters {
    pub aspect: Vec3,
    pub offset: Vec3,
    /// 0 = off, -1 = cube, positive = cylinder radius
    pub clip_radius: f32,
    pub occluding: bool,
    pub brightness: f32,
    pub depth_threshold: f32,
    pub near: f32,
    pub far: f32,
    pub cam_pos: Vec3,
    pub cam_pos_threshold: f32,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            aspect: Vec3::ONE,
            offset: Vec3::ZERO,
            clip_radius: 0.0,
            occluding: true,
            brightness: 1.0,
            depth_threshold: 0.0,
            near: 0.1,
            far: 100.0,
            cam_pos: Vec3::ZERO,
            cam_pos_threshold: CAM_POS_THRESHOLD,
        }
    }
}

/// Inputs of the last recompute
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    cam_pos: Vec3,
    near: f32,
    far: f32,
    extent: Option<Vec3>,
    hardware: HardwareInfo,
    settings: RenderSettings,
}

/// Keeps [`RenderParameters`] in step with the camera and capture volume
#[derive(Debug, Default)]
pub struct CameraAspectAdapter {
    snapshot: Option<Snapshot>,
    params: RenderParameters,
    last_cam_pos: Option<Vec3>,
    recomputes: u64,
}

impl CameraAspectAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &RenderParameters {
        &self.params
    }

    /// How many times the parameters were actually rebuilt
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Force the next [`update`](Self::update) to recompute
    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Refresh the parameters for this frame
    ///
    /// Returns true when any input changed and the parameters were rebuilt.
    /// The camera position threshold is refreshed every call.
    pub fn update(
        &mut self,
        camera: &DepthCamera,
        volume: Option<&CaptureVolume>,
        hardware: &HardwareInfo,
        settings: &RenderSettings,
    ) -> bool {
        let moved = self.last_cam_pos.is_some_and(|p| p != camera.position);
        self.last_cam_pos = Some(camera.position);
        self.params.cam_pos_threshold = if moved {
            CAM_POS_THRESHOLD_MOVED
        } else {
            CAM_POS_THRESHOLD
        };

        let snapshot = Snapshot {
            cam_pos: camera.position,
            near: camera.near,
            far: camera.far,
            extent: volume.map(CaptureVolume::display_extent),
            hardware: *hardware,
            settings: *settings,
        };
        if self.snapshot == Some(snapshot) {
            return false;
        }

        self.params.aspect = self.aspect_for(volume, hardware, settings);
        self.params.offset = settings.position_offset;
        self.params.clip_radius = settings.clip_radius;
        self.params.occluding = settings.camera_occluding;
        self.params.brightness = settings.brightness;
        self.params.depth_threshold = settings.depth_threshold;
        self.params.near = camera.near;
        self.params.far = camera.far;
        self.params.cam_pos = camera.position;

        self.snapshot = Some(snapshot);
        self.recomputes += 1;
        debug!(
            mode = ?settings.aspect_mode,
            aspect = ?self.params.aspect,
            "Render parameters recomputed"
        );
        true
    }

    fn aspect_for(
        &self,
        volume: Option<&CaptureVolume>,
        hardware: &HardwareInfo,
        settings: &RenderSettings,
    ) -> Vec3 {
        let user = settings.aspect_ratio;

        if !settings.aspect_mode.uses_volume() {
            let k = if hardware.target == DisplayTarget::Led {
                2.0
            } else {
                1.0
            };
            return user * k;
        }

        let Some(volume) = volume else {
            debug!("No capture volume, keeping previous aspect");
            return self.params.aspect;
        };

        let cam = volume.display_extent() * UNITY_TO_DISPLAY_SCALE;

        let mut aspect = match hardware.target {
            DisplayTarget::Led => {
                let lateral = (cam.x + cam.y) * 0.5;
                user * Vec3::new(lateral, lateral, cam.z)
            }
            DisplayTarget::VoxieBox => user * cam,
        };

        if settings.aspect_mode == AspectRatioMode::FitToVolume {
            let (xy, z) = fit_correction(cam, hardware.aspect);
            aspect *= Vec3::new(xy, xy, z);
        }

        if hardware.target.doubles_aspect() {
            aspect *= 2.0;
        }
        aspect
    }
}

/// Lateral and height rescale factors that fit `camera` into `hardware`
///
/// Each axis pair is scaled by the hardware-to-camera ratio. An axis that
/// already matches keeps its size. Once one axis has to shrink the other
/// never grows: it follows the shrinking factor, and when both shrink the
/// tighter factor is used for both.
pub fn fit_correction(camera: Vec3, hardware: Vec3) -> (f32, f32) {
    let ratio = |hw: f32, cam: f32| if cam > 0.0 { hw / cam } else { 1.0 };
    let xy = ratio(hardware.x, camera.x);
    let z = ratio(hardware.z, camera.z);
    match (xy < 1.0, z < 1.0) {
        (true, true) => {
            let m = xy.min(z);
            (m, m)
        }
        (true, false) if z > 1.0 => (xy, xy),
        (false, true) if xy > 1.0 => (z, z),
        _ => (xy, z),
    }
}
