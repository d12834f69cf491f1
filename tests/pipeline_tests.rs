// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the depth-to-voxel pipeline

use glam::Vec3;
use vxlit::constants::{POLTEX_MAX_HEADROOM, POLTEX_STRIDE};
use vxlit::errors::{ConfigError, DispatchError, PipelineError};
use vxlit::scene::Scene;
use vxlit::voxel::{
    AspectRatioMode, BatchDispatcher, CameraAspectAdapter, CaptureVolume, CollectingSink,
    DepthCamera, DepthFrame, DepthToVoxelResolver, FrameBufferSet, HardwareInfo, LineKey,
    OverflowPolicy, PointSource, Poltex, RenderMode, RenderSettings, UnavailableSink,
    VoxelRenderer, VoxelSample, cantor_inverse, cantor_pair, fit_correction,
};
use vxlit::{Config, DisplayTarget};

fn sample(line: LineKey, depth: f32, color: u32) -> VoxelSample {
    VoxelSample {
        position: Vec3::new(line.k1 as f32, line.k2 as f32, depth),
        line,
        depth,
        color,
    }
}

/// The first `n` depth slots as distinct lines
fn distinct_lines(n: usize) -> Vec<VoxelSample> {
    (0..n)
        .map(|slot| sample(cantor_inverse(slot), 0.5, 0xffffff))
        .collect()
}

fn renderer(resolution: u32, headroom: u32) -> VoxelRenderer {
    let config = Config {
        resolution,
        headroom,
        ..Config::default()
    };
    let mut renderer = VoxelRenderer::new(config);
    renderer
        .first_resolve(Some(&DepthCamera::default()))
        .unwrap();
    renderer
}

#[test]
fn test_conservation() {
    let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
    let mut resolver = DepthToVoxelResolver::new();

    let samples = distinct_lines(200);
    let outcome = resolver.resolve(&mut buffers, samples.iter().copied());

    let view = buffers.view(&outcome.frame, PointSource::Refined).unwrap();
    let valid = view.points[..view.count]
        .iter()
        .filter(|p| p.is_valid())
        .count();
    assert_eq!(valid, samples.len());
    assert!(outcome.overflow.is_none());
}

#[test]
fn test_nearest_wins_either_order() {
    let line = LineKey::new(3, 7);
    let near = sample(line, 0.2, 0x00ff00);
    let far = sample(line, 0.6, 0xff0000);

    for order in [[near, far], [far, near]] {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        let outcome = resolver.resolve(&mut buffers, order);

        let count = outcome.frame.counters.refined_index as usize;
        let refined = &buffers.refined()[..count];
        let valid: Vec<&Poltex> = refined.iter().filter(|p| p.is_valid()).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].color, 0x00ff00);
        assert_eq!(valid[0].depth(), 0.2);

        // Evicted record, if one was written, is marked invalid
        for p in refined.iter().filter(|p| !p.is_valid()) {
            assert_eq!(p.uv[1], -1.0);
            assert_eq!(p.color, 0);
        }
    }
}

#[test]
fn test_stale_entries_need_no_clear() {
    let line = LineKey::new(5, 5);
    let slot = cantor_pair(line);
    let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
    let mut resolver = DepthToVoxelResolver::new();

    let first = resolver.resolve(&mut buffers, [sample(line, 0.1, 0xffffff)]);
    let old_tag = first.frame.counters.frame_tag;

    let tag = resolver.begin_pass(&mut buffers);
    assert_eq!(tag, old_tag + 1);
    // Memory is untouched by the reset
    assert_eq!(buffers.depth()[slot].frame_tag, old_tag);
    assert_eq!(buffers.depth()[slot].value, 0.1);

    // A farther sample still claims the line: the old entry is absent
    let claim = resolver.submit(&mut buffers, &sample(line, 0.9, 0x123456));
    assert_eq!(claim, vxlit::voxel::Claim::Claimed);
    let outcome = resolver.finish_pass(&buffers);
    assert_eq!(outcome.stats.rejected, 0);
    assert_eq!(buffers.depth()[slot].frame_tag, tag);
    assert_eq!(buffers.refined()[0].color, 0x123456);
}

#[test]
fn test_batch_conservation() {
    let points: Vec<Poltex> = (0..1000)
        .map(|i| Poltex::new(Vec3::new(i as f32, 0.0, 0.0), 0.5, i, 0xffffff))
        .collect();

    for group_size in [7usize, 64, 100, 999] {
        let mut dispatcher = BatchDispatcher::new(group_size * POLTEX_STRIDE).unwrap();
        let mut sink = CollectingSink::new();
        let counts = dispatcher.flush(&points, points.len(), &mut sink);

        assert_eq!(counts.total(), 1000);
        assert_eq!(counts.calls(), 1000usize.div_ceil(group_size));
        let expected_last = match 1000 % group_size {
            0 => group_size,
            rest => rest,
        };
        assert_eq!(counts.counts.last().copied(), Some(expected_last));
        assert_eq!(sink.points, points);
    }
}

#[test]
fn test_headroom_growth_is_monotonic() {
    let mut renderer = renderer(16, 1);
    let line = LineKey::new(0, 0);

    for headroom in 1..POLTEX_MAX_HEADROOM {
        // Every sample is nearer than the last, so each one takes a new slot
        let n = renderer.buffers().max_points() + 1;
        let samples: Vec<_> = (0..n)
            .map(|i| sample(line, 1.0 - (i as f32 + 1.0) / (n as f32 + 1.0), 0xffffff))
            .collect();

        let stale = renderer.last_frame().unwrap();
        let generation = renderer.buffers().generation();
        let pass = renderer.resolve_samples(&samples).unwrap();

        assert!(pass.grew);
        assert!(pass.overflow.is_none());
        assert_eq!(renderer.headroom(), headroom + 1);
        assert_eq!(renderer.config().headroom, headroom + 1);
        assert_eq!(renderer.buffers().max_points(), 256 * (headroom as usize + 1));
        // Exactly one reallocation
        assert_eq!(renderer.buffers().generation().0, generation.0 + 1);
        assert!(matches!(
            renderer.buffers().view(&stale, PointSource::Refined),
            Err(DispatchError::StaleGeneration { .. })
        ));
        // Nothing of the old buffers survives past the new pass
        let written = pass.frame.counters.refined_index as usize;
        assert!(
            renderer.buffers().refined()[written..]
                .iter()
                .all(|p| *p == Poltex::default())
        );
    }

    // At the cap the excess is dropped
    let n = renderer.buffers().max_points() + 5;
    let samples: Vec<_> = (0..n)
        .map(|i| sample(line, 1.0 - (i as f32 + 1.0) / (n as f32 + 1.0), 0xffffff))
        .collect();
    let pass = renderer.resolve_samples(&samples).unwrap();
    assert!(!pass.grew);
    assert_eq!(pass.overflow.map(|o| o.dropped), Some(5));
    assert_eq!(renderer.headroom(), POLTEX_MAX_HEADROOM);
}

#[test]
fn test_fit_aspect_correction() {
    assert_eq!(fit_correction(Vec3::splat(2.0), Vec3::new(1.0, 1.0, 2.0)), (0.5, 1.0));

    // Capture volume of 20 scene units is 2 display units on every axis
    let mut adapter = CameraAspectAdapter::new();
    let volume = CaptureVolume::uniform(Vec3::ZERO, 20.0);
    let hardware = HardwareInfo::new(DisplayTarget::Led, Vec3::new(1.0, 1.0, 2.0));
    let settings = RenderSettings {
        aspect_mode: AspectRatioMode::FitToVolume,
        ..RenderSettings::default()
    };
    adapter.update(&DepthCamera::default(), Some(&volume), &hardware, &settings);
    assert_eq!(adapter.params().aspect, Vec3::new(1.0, 1.0, 2.0));

    // Extend leaves the volume as is
    let settings = RenderSettings {
        aspect_mode: AspectRatioMode::ExtendToVolume,
        ..settings
    };
    adapter.update(&DepthCamera::default(), Some(&volume), &hardware, &settings);
    assert_eq!(adapter.params().aspect, Vec3::new(2.0, 2.0, 2.0));
}

#[test]
fn test_colliding_lines_stay_within_capacity() {
    let mut renderer = renderer(16, 1);

    // 256 distinct lines, nearest samples first
    let mut samples: Vec<_> = (0..256u32)
        .map(|i| sample(LineKey::new(i % 16, i / 16), 0.3, 0xffffff))
        .collect();
    // 44 farther samples on lines already taken
    samples.extend((0..44u32).map(|i| sample(LineKey::new(i % 16, i / 16), 0.8, 0xff0000)));
    assert_eq!(samples.len(), 300);

    let pass = renderer.resolve_samples(&samples).unwrap();
    assert!(pass.frame.counters.refined_index <= 256);
    assert!(pass.overflow.is_none());
    assert!(!pass.grew);
    assert_eq!(pass.stats.rejected, 44);
    assert_eq!(renderer.headroom(), 1);
}

#[test]
fn test_unique_lines_trigger_one_growth() {
    let mut renderer = renderer(16, 1);
    assert_eq!(renderer.buffers().max_points(), 256);
    assert_eq!(renderer.buffers().max_depth_samples(), 480);

    let pass = renderer.resolve_samples(&distinct_lines(260)).unwrap();
    assert!(pass.grew);
    assert_eq!(renderer.headroom(), 2);
    assert_eq!(renderer.buffers().max_points(), 512);
    assert_eq!(pass.frame.counters.refined_index, 260);
}

#[test]
fn test_drop_policy() {
    let config = Config {
        resolution: 16,
        headroom: 1,
        overflow_policy: OverflowPolicy::Drop,
        ..Config::default()
    };
    let mut renderer = VoxelRenderer::new(config);
    renderer
        .first_resolve(Some(&DepthCamera::default()))
        .unwrap();

    let pass = renderer.resolve_samples(&distinct_lines(260)).unwrap();
    assert!(!pass.grew);
    assert_eq!(pass.overflow.map(|o| o.dropped), Some(4));
    assert_eq!(pass.frame.counters.refined_index, 256);
}

#[test]
fn test_stale_frame_dispatch_fails_fast() {
    let mut renderer = renderer(16, 1);
    let pass = renderer.resolve_samples(&distinct_lines(10)).unwrap();
    renderer.set_headroom(3).unwrap();

    let mut sink = CollectingSink::new();
    let counts = renderer.dispatch(&pass.frame, &mut sink);
    assert!(matches!(
        counts.abandoned,
        Some(DispatchError::StaleGeneration { .. })
    ));
    assert!(sink.points.is_empty());
}

#[test]
fn test_render_scene_frame() {
    let mut renderer = renderer(32, 4);
    let camera = DepthCamera::default();
    let volume = CaptureVolume::default();
    let hardware = HardwareInfo::default();
    let frame = Scene::demo().render(&camera, 32);

    let mut sink = CollectingSink::new();
    let report = renderer.render_frame(&frame, &camera, &volume, &hardware, &mut sink);

    assert!(report.active);
    assert!(report.error.is_none());
    assert_eq!(report.sent(), report.refined_count);
    assert_eq!(sink.points.len(), report.refined_count);
    assert!(report.refined_count > 0);
    // At most one valid point per line
    let valid = sink.points.iter().filter(|p| p.is_valid()).count();
    assert!(valid <= 32 * 32);
    assert!(report.params_recomputed);
}

#[test]
fn test_depth_walk_sends_only_winners() {
    let mut renderer = renderer(16, 4);
    renderer.set_render_mode(RenderMode::DepthWalk);

    let line = LineKey::new(1, 1);
    let mut samples = distinct_lines(20);
    samples.push(sample(line, 0.1, 0x00ff00));
    let pass = renderer.resolve_samples(&samples).unwrap();
    assert_eq!(pass.stats.evicted, 1);

    let mut sink = CollectingSink::new();
    let counts = renderer.dispatch(&pass.frame, &mut sink);
    assert_eq!(counts.total(), 20);
    assert!(sink.points.iter().all(|p| p.is_valid()));
}

#[test]
fn test_xray_draws_raw_buffer() {
    let mut renderer = renderer(16, 4);
    renderer.set_camera_occluding(false);

    let line = LineKey::new(2, 2);
    let samples = vec![sample(line, 0.2, 0x0000ff), sample(line, 0.6, 0xff0000)];
    let pass = renderer.resolve_samples(&samples).unwrap();

    let mut sink = CollectingSink::new();
    let counts = renderer.dispatch(&pass.frame, &mut sink);
    assert_eq!(counts.total(), 2);
    assert_eq!(sink.points.len(), 2);
}

#[test]
fn test_unavailable_display_is_a_no_op() {
    let mut renderer = renderer(16, 1);
    renderer.set_group_budget(10 * POLTEX_STRIDE).unwrap();
    let pass = renderer.resolve_samples(&distinct_lines(25)).unwrap();

    let counts = renderer.dispatch(&pass.frame, &mut UnavailableSink);
    assert_eq!(counts.total(), 0);
    assert_eq!(counts.skipped, 3);
    assert!(counts.abandoned.is_none());
}

#[test]
fn test_invalid_config_disables_renderer() {
    let config = Config {
        resolution: 8,
        ..Config::default()
    };
    let mut renderer = VoxelRenderer::new(config);
    assert!(!renderer.is_active());
    assert!(matches!(
        renderer.disabled_reason(),
        Some(ConfigError::ResolutionTooLow { resolution: 8, .. })
    ));

    // A camera does not clear a config error
    assert!(renderer.first_resolve(Some(&DepthCamera::default())).is_err());

    let mut sink = CollectingSink::new();
    let report = renderer.render_frame(
        &DepthFrame::empty(8),
        &DepthCamera::default(),
        &CaptureVolume::default(),
        &HardwareInfo::default(),
        &mut sink,
    );
    assert!(!report.active);
    assert!(matches!(
        report.error,
        Some(PipelineError::Config(ConfigError::ResolutionTooLow { .. }))
    ));
    assert!(sink.points.is_empty());

    // A valid resolution brings it back
    renderer.set_resolution(16).unwrap();
    assert!(renderer.disabled_reason().is_none());
    renderer
        .first_resolve(Some(&DepthCamera::default()))
        .unwrap();
    assert!(renderer.is_active());
    assert_eq!(renderer.config().resolution, 16);
}

#[test]
fn test_invalid_headroom_setter_disables_renderer() {
    let mut renderer = renderer(16, 1);
    assert!(renderer.set_headroom(POLTEX_MAX_HEADROOM + 1).is_err());
    assert!(!renderer.is_active());
    assert!(matches!(
        renderer.disabled_reason(),
        Some(ConfigError::HeadroomOutOfRange { .. })
    ));
    // The old layout is untouched
    assert_eq!(renderer.headroom(), 1);
    assert_eq!(renderer.config().headroom, 1);

    renderer.set_headroom(2).unwrap();
    assert!(renderer.is_active());
    assert_eq!(renderer.buffers().max_points(), 512);
}
