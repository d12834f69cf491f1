// SPDX-License-Identifier: GPL-3.0-only

//! Point cloud and frame export
//!
//! Writes the valid points of a resolved buffer as an uncompressed LAS file
//! and dumps depth frames as PNG images for debugging.

use crate::constants::exports;
use crate::errors::{PipelineError, PipelineResult};
use crate::voxel::{DepthFrame, Poltex, unpack_rgb};
use chrono::Local;
use las::{Builder, Color, Point, Writer};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Timestamped file name in `dir`, e.g. `vxlit_points_20240101_120000.las`
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stamp = Local::now().format(exports::TIMESTAMP_FORMAT);
    dir.join(format!("{}_{}.{}", prefix, stamp, extension))
}

/// Default directory for exports
pub fn default_export_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vxlit")
}

/// Export the valid points as a LAS 1.4 file with colour
///
/// Returns the number of points written.
pub fn export_point_cloud_las(points: &[Poltex], output_path: &Path) -> PipelineResult<usize> {
    let valid: Vec<&Poltex> = points.iter().filter(|p| p.is_valid()).collect();
    if valid.is_empty() {
        return Err(PipelineError::Export("No valid points to export".to_string()));
    }

    info!(
        point_count = valid.len(),
        path = %output_path.display(),
        "Exporting point cloud"
    );

    let bounds = |axis: usize| {
        valid
            .iter()
            .map(|p| p.position[axis] as f64)
            .fold((f64::MAX, f64::MIN), |(min, max), v| (min.min(v), max.max(v)))
    };
    let (min_x, max_x) = bounds(0);
    let (min_y, max_y) = bounds(1);
    let (min_z, max_z) = bounds(2);

    let mut builder = Builder::from((1, 4));
    builder.point_format.has_color = true;
    builder.point_format.is_compressed = false;

    // 1mm precision
    let scale = 0.001;
    builder.transforms = las::Vector {
        x: las::Transform {
            scale,
            offset: (min_x + max_x) / 2.0,
        },
        y: las::Transform {
            scale,
            offset: (min_y + max_y) / 2.0,
        },
        z: las::Transform {
            scale,
            offset: (min_z + max_z) / 2.0,
        },
    };

    let header = builder
        .into_header()
        .map_err(|e| PipelineError::Export(format!("Failed to build LAS header: {}", e)))?;

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(output_path, header)
        .map_err(|e| PipelineError::Export(format!("Failed to create LAS writer: {}", e)))?;

    for p in &valid {
        let [r, g, b] = unpack_rgb(p.color).map(|c| (u16::from(c) << 8) | u16::from(c));
        let mut point = Point::default();
        point.x = p.position.x as f64;
        point.y = p.position.y as f64;
        point.z = p.position.z as f64;
        point.color = Some(Color::new(r, g, b));
        writer
            .write_point(point)
            .map_err(|e| PipelineError::Export(format!("Failed to write point: {}", e)))?;
    }

    writer
        .close()
        .map_err(|e| PipelineError::Export(format!("Failed to close LAS file: {}", e)))?;

    debug!(path = %output_path.display(), "LAS export complete");
    Ok(valid.len())
}

/// Save the depth of a frame as a 16-bit grayscale PNG
pub fn save_depth_png(frame: &DepthFrame, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    frame.depth_image().save(path)?;
    debug!(path = %path.display(), "Saved depth frame");
    Ok(())
}

/// Save the colour of a frame as an RGB PNG
pub fn save_color_png(frame: &DepthFrame, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    frame.color_image().save(path)?;
    debug!(path = %path.display(), "Saved colour frame");
    Ok(())
}

/// Load a frame previously written by [`save_depth_png`] and [`save_color_png`]
pub fn load_frame(depth_path: &Path, color_path: &Path) -> PipelineResult<DepthFrame> {
    let depth = image::open(depth_path)?.into_luma16();
    let color = image::open(color_path)?.into_rgb8();
    Ok(DepthFrame::from_images(&depth, &color)?)
}
