// SPDX-License-Identifier: GPL-3.0-only

//! Depth camera frames and their projection into display space

use super::aspect::{CaptureVolume, RenderParameters};
use super::types::{LineKey, VoxelSample, pack_rgb, unpack_rgb};
use crate::constants::space::CYLINDER_FIT_MARGIN;
use crate::errors::ConfigError;
use glam::{Mat4, Vec2, Vec3};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

/// 16-bit depth image as written by depth cameras and PNG dumps
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One captured frame: normalised depth and packed colour per pixel
///
/// Pixels are row-major, row 0 at the top. Depth is linear between the
/// camera's near and far planes; 0 and 1 mean nothing was hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    resolution: u32,
    depth: Vec<f32>,
    color: Vec<u32>,
}

impl DepthFrame {
    pub fn new(resolution: u32, depth: Vec<f32>, color: Vec<u32>) -> Result<Self, ConfigError> {
        let expected = (resolution as usize) * (resolution as usize);
        for actual in [depth.len(), color.len()] {
            if actual != expected {
                return Err(ConfigError::FrameSizeMismatch { expected, actual });
            }
        }
        Ok(Self {
            resolution,
            depth,
            color,
        })
    }

    /// Frame where every pixel is empty
    pub fn empty(resolution: u32) -> Self {
        let n = (resolution as usize) * (resolution as usize);
        Self {
            resolution,
            depth: vec![0.0; n],
            color: vec![0; n],
        }
    }

    /// Build a frame from a 16-bit depth image and an RGB image of the same
    /// square size
    pub fn from_images(depth: &DepthImage, color: &RgbImage) -> Result<Self, ConfigError> {
        let (w, h) = depth.dimensions();
        let expected = (w as usize) * (w as usize);
        if w != h {
            return Err(ConfigError::FrameSizeMismatch {
                expected,
                actual: (w as usize) * (h as usize),
            });
        }
        if color.dimensions() != (w, h) {
            let (cw, ch) = color.dimensions();
            return Err(ConfigError::FrameSizeMismatch {
                expected,
                actual: (cw as usize) * (ch as usize),
            });
        }

        let depth_values = depth
            .pixels()
            .map(|Luma([v])| match *v {
                0 | u16::MAX => 0.0,
                v => v as f32 / u16::MAX as f32,
            })
            .collect();
        let color_values = color
            .pixels()
            .map(|Rgb([r, g, b])| pack_rgb(*r, *g, *b))
            .collect();

        Self::new(w, depth_values, color_values)
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn color(&self) -> &[u32] {
        &self.color
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32, color: u32) {
        let i = (y * self.resolution + x) as usize;
        if let (Some(d), Some(c)) = (self.depth.get_mut(i), self.color.get_mut(i)) {
            *d = depth;
            *c = color;
        }
    }

    /// Pixels that hit something
    pub fn hit_count(&self) -> usize {
        self.depth.iter().filter(|d| is_hit(**d)).count()
    }

    /// Depth as a 16-bit image (empty pixels are 0)
    pub fn depth_image(&self) -> DepthImage {
        let r = self.resolution;
        ImageBuffer::from_fn(r, r, |x, y| {
            let d = self.depth[(y * r + x) as usize];
            if is_hit(d) {
                Luma([(d * u16::MAX as f32).round().clamp(1.0, (u16::MAX - 1) as f32) as u16])
            } else {
                Luma([0])
            }
        })
    }

    pub fn color_image(&self) -> RgbImage {
        let r = self.resolution;
        ImageBuffer::from_fn(r, r, |x, y| Rgb(unpack_rgb(self.color[(y * r + x) as usize])))
    }
}

#[inline]
fn is_hit(depth: f32) -> bool {
    depth > 0.0 && depth < 1.0
}

/// Camera projection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Orthographic { half_size: f32 },
    /// Vertical field of view in radians
    Perspective { fov_y: f32 },
}

/// The synthetic camera that produced a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthCamera {
    pub position: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Default for DepthCamera {
    /// Orthographic camera above the origin looking straight down
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 20.0, 0.0),
            right: Vec3::X,
            up: Vec3::Z,
            forward: Vec3::NEG_Y,
            projection: Projection::Orthographic { half_size: 10.0 },
            near: 0.1,
            far: 40.0,
        }
    }
}

impl DepthCamera {
    /// Camera at `position` looking at `target` (left-handed, y up)
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        projection: Projection,
        near: f32,
        far: f32,
    ) -> Self {
        let forward = (target - position).normalize_or_zero();
        let world_up = if Vec3::Y.cross(forward) == Vec3::ZERO {
            Vec3::Z
        } else {
            Vec3::Y
        };
        // Rows of the left-handed view matrix are the camera basis
        let view = Mat4::look_at_lh(position, target, world_up);
        let row = |i| view.row(i).truncate();
        Self {
            position,
            right: row(0),
            up: row(1),
            forward: row(2),
            projection,
            near,
            far,
        }
    }

    /// Normalised device coordinates of a pixel centre
    fn ndc(px: u32, py: u32, resolution: u32) -> (f32, f32) {
        let r = resolution as f32;
        let x = (px as f32 + 0.5) / r * 2.0 - 1.0;
        let y = 1.0 - (py as f32 + 0.5) / r * 2.0;
        (x, y)
    }

    /// Ray through a pixel centre; the direction has a unit forward component
    pub fn pixel_ray(&self, px: u32, py: u32, resolution: u32) -> (Vec3, Vec3) {
        let (x, y) = Self::ndc(px, py, resolution);
        match self.projection {
            Projection::Orthographic { half_size } => {
                let origin = self.position + (self.right * x + self.up * y) * half_size;
                (origin, self.forward)
            }
            Projection::Perspective { fov_y } => {
                let t = (fov_y * 0.5).tan();
                (self.position, self.forward + (self.right * x + self.up * y) * t)
            }
        }
    }

    /// World position of a pixel at normalised depth `depth`
    pub fn unproject(&self, px: u32, py: u32, resolution: u32, depth: f32) -> Vec3 {
        let (origin, dir) = self.pixel_ray(px, py, resolution);
        origin + dir * self.linear_depth(depth)
    }

    /// Distance along the view axis for a normalised depth
    pub fn linear_depth(&self, depth: f32) -> f32 {
        self.near + depth * (self.far - self.near)
    }

    /// Normalised depth for a distance along the view axis
    pub fn normalized_depth(&self, distance: f32) -> f32 {
        (distance - self.near) / (self.far - self.near)
    }

    /// Switch to an orthographic view sized so the capture cylinder fits
    ///
    /// The cylinder height is twice the volume's y extent and its radius the
    /// mean of the x and z extents over two. Views from the side need the
    /// full height, views from an angle add part of the cylinder depth.
    pub fn fit_to_cylinder(&mut self, volume: &CaptureVolume) -> f32 {
        let extent = volume.extent();
        let height = extent.y * 2.0;
        let radius = (extent.x + extent.z) / 4.0;

        let to_camera = self.position - volume.position;
        let lateral = Vec2::new(to_camera.x, to_camera.z).length();
        let offset = Vec2::new(lateral, to_camera.y).normalize_or_zero();
        let diff = 1.0 - (offset.x.abs() - offset.y.abs()).abs();

        let ortho_y = height * CYLINDER_FIT_MARGIN + radius * diff;
        let half_size = ortho_y.max(radius);
        self.projection = Projection::Orthographic { half_size };
        half_size
    }
}

/// Projected samples of one frame plus what was left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    pub samples: Vec<VoxelSample>,
    /// Pixels without a hit
    pub empty: usize,
    /// Hits outside the clip shape
    pub clipped: usize,
    /// Hits that fell outside the line grid
    pub off_grid: usize,
}

/// Project every hit pixel of `frame` into display space
///
/// Capture-volume local coordinates (`-1..=1` across the volume) pick the
/// display line; the aspect and offset only move the drawn position.
pub fn project(
    frame: &DepthFrame,
    camera: &DepthCamera,
    volume: &CaptureVolume,
    params: &RenderParameters,
) -> SampleBatch {
    let r = frame.resolution;
    let extent = Vec3::select(volume.extent().cmpeq(Vec3::ZERO), Vec3::ONE, volume.extent());
    let mut batch = SampleBatch {
        samples: Vec::with_capacity(frame.hit_count()),
        ..SampleBatch::default()
    };

    for py in 0..r {
        for px in 0..r {
            let i = (py * r + px) as usize;
            let depth = frame.depth[i];
            if !is_hit(depth) {
                batch.empty += 1;
                continue;
            }

            let local = (camera.unproject(px, py, r, depth) - volume.position) / extent;
            // Scene (x, y up, z forward) to display (x, y, z down)
            let display = Vec3::new(local.x, -local.z, -local.y);

            if clipped(display, params.clip_radius) {
                batch.clipped += 1;
                continue;
            }

            let (Some(k1), Some(k2)) = (line_bin(display.x, r), line_bin(display.y, r)) else {
                batch.off_grid += 1;
                continue;
            };

            let position = display * params.aspect + params.offset;

            batch.samples.push(VoxelSample {
                position,
                line: LineKey::new(k1, k2),
                depth,
                color: brighten(frame.color[i], params.brightness),
            });
        }
    }
    batch
}

fn clipped(p: Vec3, clip_radius: f32) -> bool {
    if clip_radius == -1.0 {
        p.abs().max_element() > 1.0
    } else if clip_radius > 0.0 {
        p.truncate().length_squared() > clip_radius * clip_radius
    } else {
        false
    }
}

/// Bin a coordinate in `-1..=1` into `0..resolution`
fn line_bin(c: f32, resolution: u32) -> Option<u32> {
    if !(-1.0..=1.0).contains(&c) {
        return None;
    }
    let bin = ((c + 1.0) * 0.5 * resolution as f32) as u32;
    Some(bin.min(resolution - 1))
}

fn brighten(color: u32, brightness: f32) -> u32 {
    if brightness == 1.0 {
        return color;
    }
    let [r, g, b] = unpack_rgb(color).map(|c| (c as f32 * brightness).clamp(0.0, 255.0) as u8);
    pack_rgb(r, g, b)
}
