// SPDX-License-Identifier: GPL-3.0-only

//! Frame loop tying the buffers, resolver, dispatcher and aspect adapter
//! together
//!
//! Each frame: refresh render parameters, project the depth frame, resolve
//! it into the point buffers (growing them once if they overflow) and hand
//! the result to the draw sink.

use super::aspect::{CameraAspectAdapter, CaptureVolume, HardwareInfo, RenderSettings};
use super::buffers::{FrameBufferSet, PointSource, ResolvedFrame};
use super::dispatch::{BatchDispatcher, DrawSink, GroupCounts};
use super::frame::{DepthCamera, DepthFrame, project};
use super::resolver::{DepthToVoxelResolver, OverflowPolicy, ResolveStats};
use super::types::VoxelSample;
use crate::config::Config;
use crate::constants::POLTEX_MAX_HEADROOM;
use crate::errors::{ConfigError, OverflowError, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// How resolved points reach the draw sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Refined buffer in bounded groups. A non-occluding camera draws the
    /// raw buffer instead.
    #[default]
    Batched,
    /// Walk the depth slots and send only the winning points
    DepthWalk,
    /// Whole refined buffer in one call
    SingleCall,
    /// Raw buffer in bounded groups
    RawBatched,
}

impl RenderMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            RenderMode::Batched => "Batched",
            RenderMode::DepthWalk => "Depth walk",
            RenderMode::SingleCall => "Single call",
            RenderMode::RawBatched => "Raw batched",
        }
    }

    /// Mode actually used for a given occlusion setting
    pub fn effective(&self, occluding: bool) -> RenderMode {
        match self {
            RenderMode::Batched | RenderMode::DepthWalk if !occluding => RenderMode::RawBatched,
            mode => *mode,
        }
    }

    /// Buffer the mode draws from
    pub fn source(&self, occluding: bool) -> PointSource {
        match (self.effective(occluding), occluding) {
            (RenderMode::RawBatched, _) | (_, false) => PointSource::Raw,
            _ => PointSource::Refined,
        }
    }
}

/// Outcome of resolving one frame's samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvePass {
    pub frame: ResolvedFrame,
    pub stats: ResolveStats,
    /// Overflow left after any growth
    pub overflow: Option<OverflowError>,
    /// Buffers were grown and the frame resolved again
    pub grew: bool,
}

/// Diagnostics for one rendered frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub active: bool,
    pub mode: RenderMode,
    pub resolution: u32,
    pub headroom: u32,
    pub group_size: usize,
    pub groups_allocated: usize,
    pub groups: GroupCounts,
    pub frame_tag: i32,
    pub refined_count: usize,
    pub raw_count: usize,
    pub max_points: usize,
    pub depth_slots: usize,
    pub empty_pixels: usize,
    pub clipped: usize,
    pub stats: ResolveStats,
    pub overflow: Option<OverflowError>,
    pub grew: bool,
    pub params_recomputed: bool,
    pub error: Option<PipelineError>,
}

impl FrameReport {
    /// Points that reached the sink
    pub fn sent(&self) -> usize {
        self.groups.total()
    }
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "                    vxlit renderer report")?;
        writeln!(
            f,
            "Active: {:<6}  Mode: {}",
            self.active,
            self.mode.display_name()
        )?;
        writeln!(
            f,
            "Resolution: {:<6}  Points per group: {:<8}  Groups: {} / {}",
            self.resolution,
            self.group_size,
            self.groups.calls(),
            self.groups_allocated
        )?;
        for (i, pair) in self.groups.counts.chunks(2).enumerate() {
            let mut line = String::new();
            for (j, count) in pair.iter().enumerate() {
                line.push_str(&format!("Group {:<4} {:<10}", i * 2 + j, count));
            }
            writeln!(f, "{}", line.trim_end())?;
        }
        writeln!(
            f,
            "Sent: {}  Refined: {}  Raw: {}  Frame: {}",
            self.sent(),
            self.refined_count,
            self.raw_count,
            self.frame_tag
        )?;
        writeln!(
            f,
            "Buffers: {} points, {} depth slots, headroom {}{}",
            self.max_points,
            self.depth_slots,
            self.headroom,
            if self.grew { " (grown)" } else { "" }
        )?;
        writeln!(
            f,
            "Samples: {} claimed, {} evicted, {} rejected, {} empty, {} clipped",
            self.stats.claimed, self.stats.evicted, self.stats.rejected, self.empty_pixels, self.clipped
        )?;
        if let Some(overflow) = &self.overflow {
            writeln!(f, "Overflow: {}", overflow)?;
        }
        if self.groups.skipped > 0 {
            writeln!(f, "Display unavailable: {} groups skipped", self.groups.skipped)?;
        }
        if let Some(err) = &self.groups.abandoned {
            writeln!(f, "Dispatch: {}", err)?;
        }
        if let Some(err) = &self.error {
            writeln!(f, "Error: {}", err)?;
        }
        Ok(())
    }
}

/// One depth-camera-to-voxel renderer
#[derive(Debug)]
pub struct VoxelRenderer {
    config: Config,
    buffers: FrameBufferSet,
    resolver: DepthToVoxelResolver,
    dispatcher: BatchDispatcher,
    adapter: CameraAspectAdapter,
    disabled: Option<ConfigError>,
    ready: bool,
    last: Option<ResolvedFrame>,
}

impl VoxelRenderer {
    /// Validate `config` and allocate the buffers
    ///
    /// An invalid config leaves the renderer disabled with the reason in
    /// [`disabled_reason`](Self::disabled_reason). Call
    /// [`first_resolve`](Self::first_resolve) once the camera is ready.
    pub fn new(config: Config) -> Self {
        let mut resolver = DepthToVoxelResolver::new();
        resolver.set_depth_threshold(config.depth_threshold);

        let mut renderer = Self {
            dispatcher: BatchDispatcher::for_target(config.display_target),
            buffers: FrameBufferSet::unallocated(),
            config,
            resolver,
            adapter: CameraAspectAdapter::new(),
            disabled: None,
            ready: false,
            last: None,
        };
        match renderer.setup() {
            Ok(()) => info!(
                resolution = renderer.config.resolution,
                headroom = renderer.config.headroom,
                target = renderer.config.display_target.display_name(),
                group_size = renderer.dispatcher.group_size(),
                "Voxel renderer created"
            ),
            Err(err) => {
                renderer.disable(err);
            }
        }
        renderer
    }

    fn setup(&mut self) -> Result<(), ConfigError> {
        self.config.validate()?;
        self.dispatcher.set_budget(self.config.group_byte_budget())?;
        let (resolution, headroom) = (self.config.resolution, self.config.headroom);
        if !self.buffers.is_allocated() || self.buffers.layout().needs_update(resolution, headroom) {
            self.buffers.reallocate(resolution, headroom)?;
        }
        Ok(())
    }

    /// Second initialisation phase: confirm the camera and run an empty pass
    ///
    /// Clears a missing-camera state. Any other reason the renderer is
    /// disabled is returned as the error.
    pub fn first_resolve(&mut self, camera: Option<&DepthCamera>) -> PipelineResult<ResolvedFrame> {
        match &self.disabled {
            None | Some(ConfigError::MissingCamera) => {}
            Some(err) => return Err(err.clone().into()),
        }
        if camera.is_none() {
            return Err(self.disable(ConfigError::MissingCamera).into());
        }
        self.disabled = None;
        self.adapter.invalidate();
        let outcome = self.resolver.resolve(&mut self.buffers, std::iter::empty());
        self.ready = true;
        self.last = Some(outcome.frame);
        debug!(frame_tag = outcome.frame.counters.frame_tag, "First resolve done");
        Ok(outcome.frame)
    }

    fn disable(&mut self, err: ConfigError) -> ConfigError {
        error!(%err, "Voxel renderer disabled");
        self.disabled = Some(err.clone());
        err
    }

    /// Re-enable after a setter fixed whatever disabled the renderer
    fn recover(&mut self) {
        match &self.disabled {
            None | Some(ConfigError::MissingCamera) => return,
            Some(_) => {}
        }
        match self.setup() {
            Ok(()) => {
                info!("Voxel renderer re-enabled");
                self.disabled = None;
            }
            Err(err) => {
                debug!(%err, "Voxel renderer still disabled");
                self.disabled = Some(err);
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffers(&self) -> &FrameBufferSet {
        &self.buffers
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub fn adapter(&self) -> &CameraAspectAdapter {
        &self.adapter
    }

    pub fn headroom(&self) -> u32 {
        self.buffers.headroom()
    }

    /// Ready to render and not disabled
    pub fn is_active(&self) -> bool {
        self.ready && self.disabled.is_none()
    }

    /// Why the renderer is disabled, if it is
    pub fn disabled_reason(&self) -> Option<&ConfigError> {
        self.disabled.as_ref()
    }

    /// Last completed resolve pass
    pub fn last_frame(&self) -> Option<ResolvedFrame> {
        self.last
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.config.render_mode = mode;
    }

    pub fn set_overflow_policy(&mut self, policy: OverflowPolicy) {
        self.config.overflow_policy = policy;
    }

    pub fn set_camera_occluding(&mut self, occluding: bool) {
        self.config.camera_occluding = occluding;
    }

    /// Change the capture resolution; reallocates the buffers
    ///
    /// An invalid resolution disables the renderer until a valid one is set.
    pub fn set_resolution(&mut self, resolution: u32) -> PipelineResult<()> {
        self.reallocate(resolution, self.config.headroom)
    }

    /// Change the headroom; reallocates the buffers
    ///
    /// An invalid headroom disables the renderer until a valid one is set.
    pub fn set_headroom(&mut self, headroom: u32) -> PipelineResult<()> {
        self.reallocate(self.config.resolution, headroom)
    }

    /// Change the per-call byte budget
    pub fn set_group_budget(&mut self, bytes: usize) -> PipelineResult<()> {
        if let Err(err) = self.dispatcher.set_budget(bytes) {
            return Err(self.disable(err).into());
        }
        self.config.group_byte_budget = Some(bytes);
        self.recover();
        Ok(())
    }

    /// Move to a new layout and keep `config` in step with it
    fn reallocate(&mut self, resolution: u32, headroom: u32) -> PipelineResult<()> {
        if !self.buffers.layout().needs_update(resolution, headroom) {
            return Ok(());
        }
        if let Err(err) = self.buffers.reallocate(resolution, headroom) {
            return Err(self.disable(err).into());
        }
        self.config.resolution = resolution;
        self.config.headroom = headroom;
        self.last = None;
        self.recover();
        Ok(())
    }

    /// Resolve a set of projected samples, growing the buffers once if the
    /// drawn buffer overflows
    pub fn resolve_samples(&mut self, samples: &[VoxelSample]) -> PipelineResult<ResolvePass> {
        let occluding = self.config.camera_occluding;
        self.resolver
            .set_primary(self.config.render_mode.source(occluding));
        self.resolver.set_depth_threshold(self.config.depth_threshold);

        let mut outcome = self.resolver.resolve(&mut self.buffers, samples.iter().copied());
        let mut grew = false;

        if let Some(overflow) = outcome.overflow {
            let headroom = self.buffers.headroom();
            if self.config.overflow_policy == OverflowPolicy::Grow && headroom < POLTEX_MAX_HEADROOM {
                warn!(
                    headroom,
                    dropped = overflow.dropped,
                    "Poltex buffer full, growing headroom and resolving again"
                );
                self.reallocate(self.config.resolution, headroom + 1)?;
                outcome = self.resolver.resolve(&mut self.buffers, samples.iter().copied());
                grew = true;
            } else {
                trace!(
                    headroom,
                    dropped = overflow.dropped,
                    "Poltex buffer full, dropping samples"
                );
            }
        }

        self.last = Some(outcome.frame);
        Ok(ResolvePass {
            frame: outcome.frame,
            stats: outcome.stats,
            overflow: outcome.overflow,
            grew,
        })
    }

    /// Send a resolved frame to the sink using the configured mode
    pub fn dispatch(&mut self, frame: &ResolvedFrame, sink: &mut dyn DrawSink) -> GroupCounts {
        let occluding = self.config.camera_occluding;
        let mode = self.config.render_mode.effective(occluding);
        let source = self.config.render_mode.source(occluding);

        let result = match mode {
            RenderMode::DepthWalk => self
                .buffers
                .depth_view(frame)
                .map(|view| self.dispatcher.flush_depth_walk(&view, sink)),
            RenderMode::SingleCall => self
                .buffers
                .view(frame, source)
                .map(|view| self.dispatcher.flush_single(view.points, view.count, sink)),
            RenderMode::Batched | RenderMode::RawBatched => self
                .buffers
                .view(frame, source)
                .map(|view| self.dispatcher.flush(view.points, view.count, sink)),
        };

        result.unwrap_or_else(|err| {
            warn!(%err, "Skipping dispatch for this frame");
            GroupCounts {
                abandoned: Some(err),
                ..GroupCounts::default()
            }
        })
    }

    /// Render one frame end to end
    pub fn render_frame(
        &mut self,
        frame: &DepthFrame,
        camera: &DepthCamera,
        volume: &CaptureVolume,
        hardware: &HardwareInfo,
        sink: &mut dyn DrawSink,
    ) -> FrameReport {
        let mut report = self.base_report();
        if !self.is_active() {
            debug!("Renderer inactive, frame skipped");
            report.error = self.disabled.clone().map(PipelineError::from);
            return report;
        }

        if frame.resolution() != self.config.resolution {
            let r = self.config.resolution as usize;
            let err = ConfigError::FrameSizeMismatch {
                expected: r * r,
                actual: frame.depth().len(),
            };
            warn!(%err, "Frame skipped");
            report.error = Some(err.into());
            return report;
        }

        let settings = RenderSettings::from(&self.config);
        report.params_recomputed = self.adapter.update(camera, Some(volume), hardware, &settings);
        let params = *self.adapter.params();

        let batch = project(frame, camera, volume, &params);
        report.empty_pixels = batch.empty;
        report.clipped = batch.clipped + batch.off_grid;

        let pass = match self.resolve_samples(&batch.samples) {
            Ok(pass) => pass,
            Err(err) => {
                report.error = Some(err);
                report.active = self.is_active();
                return report;
            }
        };

        report.groups = self.dispatch(&pass.frame, sink);
        report.stats = pass.stats;
        report.overflow = pass.overflow;
        report.grew = pass.grew;
        report.frame_tag = pass.frame.counters.frame_tag;
        report.refined_count = pass.frame.counters.refined_index.max(0) as usize;
        report.raw_count = pass.frame.counters.raw_index.max(0) as usize;
        self.fill_layout(&mut report);
        report
    }

    fn base_report(&self) -> FrameReport {
        let mut report = FrameReport {
            active: self.is_active(),
            mode: self.config.render_mode.effective(self.config.camera_occluding),
            ..FrameReport::default()
        };
        self.fill_layout(&mut report);
        report
    }

    fn fill_layout(&self, report: &mut FrameReport) {
        report.resolution = self.buffers.resolution();
        report.headroom = self.buffers.headroom();
        report.group_size = self.dispatcher.group_size();
        report.max_points = self.buffers.max_points();
        report.depth_slots = self.buffers.depth().len();
        report.groups_allocated = self.dispatcher.groups_for(report.max_points);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::dispatch::CollectingSink;
    use crate::voxel::pairing::cantor_inverse;
    use crate::voxel::types::LineKey;
    use glam::Vec3;

    fn small_config() -> Config {
        Config {
            resolution: 16,
            headroom: 1,
            ..Config::default()
        }
    }

    fn unique_samples(n: usize) -> Vec<VoxelSample> {
        (0..n)
            .map(|i| {
                let (k1, k2) = ((i % 16) as u32, (i / 16) as u32);
                VoxelSample {
                    position: Vec3::new(k1 as f32, k2 as f32, 0.0),
                    line: LineKey::new(k1, k2),
                    depth: 0.5,
                    color: 0xffffff,
                }
            })
            .collect()
    }

    #[test]
    fn test_effective_mode() {
        assert_eq!(RenderMode::Batched.effective(false), RenderMode::RawBatched);
        assert_eq!(RenderMode::Batched.source(true), PointSource::Refined);
        assert_eq!(RenderMode::SingleCall.source(false), PointSource::Raw);
        assert_eq!(RenderMode::RawBatched.source(true), PointSource::Raw);
    }

    #[test]
    fn test_missing_camera_disables() {
        let mut renderer = VoxelRenderer::new(small_config());
        assert!(renderer.first_resolve(None).is_err());
        assert!(!renderer.is_active());
        assert_eq!(renderer.disabled_reason(), Some(&ConfigError::MissingCamera));

        let report = renderer.render_frame(
            &DepthFrame::empty(16),
            &DepthCamera::default(),
            &CaptureVolume::default(),
            &HardwareInfo::default(),
            &mut CollectingSink::new(),
        );
        assert!(!report.active);

        renderer.first_resolve(Some(&DepthCamera::default())).unwrap();
        assert!(renderer.is_active());
    }

    #[test]
    fn test_low_resolution_disables() {
        let renderer = VoxelRenderer::new(Config {
            resolution: 8,
            ..small_config()
        });
        assert!(!renderer.is_active());
        assert_eq!(
            renderer.disabled_reason(),
            Some(&ConfigError::ResolutionTooLow {
                resolution: 8,
                minimum: 8
            })
        );
        assert!(!renderer.buffers().is_allocated());
    }

    #[test]
    fn test_bad_group_budget_disables() {
        let mut renderer = VoxelRenderer::new(Config {
            group_byte_budget: Some(1),
            ..small_config()
        });
        assert_eq!(
            renderer.disabled_reason(),
            Some(&ConfigError::InvalidGroupBudget(1))
        );
        renderer.set_group_budget(240).unwrap();
        assert!(renderer.disabled_reason().is_none());
        assert_eq!(renderer.dispatcher().group_size(), 10);
    }

    #[test]
    fn test_growth_then_resolve() {
        let mut renderer = VoxelRenderer::new(small_config());
        renderer.first_resolve(Some(&DepthCamera::default())).unwrap();

        let pass = renderer.resolve_samples(&unique_samples(256)).unwrap();
        assert!(!pass.grew);
        assert_eq!(pass.frame.counters.refined_index, 256);

        // First 260 depth slots, all distinct lines
        let samples: Vec<_> = (0..260)
            .map(|slot| VoxelSample {
                line: cantor_inverse(slot),
                ..unique_samples(1)[0]
            })
            .collect();
        let pass = renderer.resolve_samples(&samples).unwrap();
        assert!(pass.grew);
        assert!(pass.overflow.is_none());
        assert_eq!(renderer.headroom(), 2);
        assert_eq!(renderer.config().headroom, 2);
        assert_eq!(renderer.buffers().max_points(), 512);
        assert_eq!(pass.frame.counters.refined_index, 260);
    }

    #[test]
    fn test_drop_policy_keeps_headroom() {
        let mut config = small_config();
        config.overflow_policy = OverflowPolicy::Drop;
        let mut renderer = VoxelRenderer::new(config);
        renderer.first_resolve(Some(&DepthCamera::default())).unwrap();

        let mut samples = unique_samples(256);
        samples.push(VoxelSample {
            line: LineKey::new(20, 0),
            ..samples[0]
        });
        let pass = renderer.resolve_samples(&samples).unwrap();
        assert!(!pass.grew);
        assert_eq!(pass.overflow.map(|o| o.dropped), Some(1));
        assert_eq!(renderer.headroom(), 1);
    }

    #[test]
    fn test_report_panel() {
        let mut renderer = VoxelRenderer::new(small_config());
        renderer.first_resolve(Some(&DepthCamera::default())).unwrap();
        let report = renderer.render_frame(
            &DepthFrame::empty(16),
            &DepthCamera::default(),
            &CaptureVolume::default(),
            &HardwareInfo::default(),
            &mut CollectingSink::new(),
        );
        assert!(report.active);
        let text = report.to_string();
        assert!(text.contains("Mode: Batched"));
        assert!(text.contains("headroom 1"));
    }

    #[test]
    fn test_frame_size_mismatch_skips() {
        let mut renderer = VoxelRenderer::new(small_config());
        renderer.first_resolve(Some(&DepthCamera::default())).unwrap();
        let report = renderer.render_frame(
            &DepthFrame::empty(32),
            &DepthCamera::default(),
            &CaptureVolume::default(),
            &HardwareInfo::default(),
            &mut CollectingSink::new(),
        );
        assert!(matches!(
            report.error,
            Some(PipelineError::Config(ConfigError::FrameSizeMismatch { .. }))
        ));
        assert!(renderer.is_active());
    }
}
