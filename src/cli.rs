// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Simulating frames from a procedural scene
//! - Rendering a frame from depth and colour images
//! - Dumping frames and printing buffer sizing

use glam::Vec3;
use std::path::{Path, PathBuf};
use std::time::Instant;
use vxlit::constants::{DisplayTarget, POLTEX_STRIDE, exports, max_depth_index, max_points};
use vxlit::export::{
    default_export_dir, export_point_cloud_las, load_frame, save_color_png, save_depth_png,
    timestamped_path,
};
use vxlit::scene::{Scene, orbit_camera};
use vxlit::voxel::{CollectingSink, PointSource};
use vxlit::{CaptureVolume, Config, DepthCamera, HardwareInfo, VoxelRenderer};

/// Elevation of the simulated camera orbit, in radians
const ORBIT_ELEVATION: f32 = 1.1;

/// Render `frames` frames of the demo scene and print a report per frame
pub fn simulate(
    config: Config,
    frames: usize,
    las: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolution = config.resolution;
    let hardware = HardwareInfo::new(config.display_target, Vec3::ONE);
    let volume = CaptureVolume::default();
    let scene = Scene::demo();

    let mut renderer = VoxelRenderer::new(config);
    renderer.first_resolve(Some(&DepthCamera::default()))?;

    let mut sink = CollectingSink::new();
    let start = Instant::now();

    for i in 0..frames {
        let camera = orbit_camera(&volume, i, frames, ORBIT_ELEVATION);
        let frame = scene.render(&camera, resolution);

        sink.clear();
        let report = renderer.render_frame(&frame, &camera, &volume, &hardware, &mut sink);
        println!("Frame {}/{}", i + 1, frames);
        println!("{}", report);
    }

    let elapsed = start.elapsed();
    println!(
        "Rendered {} frames in {:.2}s ({:.1} ms/frame)",
        frames,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64
    );

    if let Some(path) = las {
        let written = export_point_cloud_las(&sink.points, &path)?;
        println!("Wrote {} points to {}", written, path.display());
    }

    Ok(())
}

/// Run one frame from a depth and colour PNG
pub fn render_images(
    mut config: Config,
    depth: &Path,
    color: &Path,
    las: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load_frame(depth, color)?;
    config.resolution = frame.resolution();
    println!(
        "Loaded {}x{} frame, {} hits",
        frame.resolution(),
        frame.resolution(),
        frame.hit_count()
    );

    let hardware = HardwareInfo::new(config.display_target, Vec3::ONE);
    let volume = CaptureVolume::default();
    let camera = DepthCamera::default();

    let mut renderer = VoxelRenderer::new(config);
    renderer.first_resolve(Some(&camera))?;

    let mut sink = CollectingSink::new();
    let report = renderer.render_frame(&frame, &camera, &volume, &hardware, &mut sink);
    println!("{}", report);

    if let Some(path) = las {
        // Export the refined buffer so evicted points are left out
        let points = match renderer.last_frame() {
            Some(resolved) => {
                let view = renderer.buffers().view(&resolved, PointSource::Refined)?;
                view.points.iter().take(view.count).copied().collect()
            }
            None => sink.points,
        };
        let written = export_point_cloud_las(&points, &path)?;
        println!("Wrote {} points to {}", written, path.display());
    }

    Ok(())
}

/// Dump one procedural frame as PNGs
pub fn capture(config: &Config, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let volume = CaptureVolume::default();
    let camera = orbit_camera(&volume, 0, 1, ORBIT_ELEVATION);
    let frame = Scene::demo().render(&camera, config.resolution);

    let dir = output.unwrap_or_else(default_export_dir);
    let depth_path = timestamped_path(&dir, &format!("{}_depth", exports::FRAME_PREFIX), "png");
    let color_path = timestamped_path(&dir, &format!("{}_color", exports::FRAME_PREFIX), "png");

    save_depth_png(&frame, &depth_path)?;
    save_color_png(&frame, &color_path)?;

    println!("Depth: {}", depth_path.display());
    println!("Color: {}", color_path.display());
    Ok(())
}

/// Print buffer sizing for every display target
pub fn info(resolution: u32, headroom: u32) -> Result<(), Box<dyn std::error::Error>> {
    let points = max_points(resolution, headroom);
    let depth_slots = max_depth_index(resolution) + 1;

    println!("Resolution: {}x{}", resolution, resolution);
    println!("Headroom:   {}", headroom);
    println!(
        "Points:     {} per buffer ({} bytes)",
        points,
        points * POLTEX_STRIDE
    );
    println!("Depth:      {} slots", depth_slots);
    println!();

    for target in DisplayTarget::ALL {
        let budget = target.default_group_budget();
        let group_size = budget / POLTEX_STRIDE;
        println!("  {}", target.display_name());
        println!("      Group budget: {} bytes ({} points)", budget, group_size);
        println!("      Max groups:   {}", points.div_ceil(group_size));
    }
    Ok(())
}

/// Print the effective config as JSON
pub fn show_config(
    config: &Config,
    path: &Path,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        config.save(path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
