// SPDX-License-Identifier: GPL-3.0-only

//! Procedural depth source
//!
//! Ray-casts a handful of primitives to produce depth frames without a real
//! depth camera. Used by the `simulate` command and the integration tests.

use crate::voxel::{CaptureVolume, DepthCamera, DepthFrame, Projection, pack_rgb};
use glam::Vec3;
use std::f32::consts::PI;
use tracing::debug;

/// A primitive the scene can hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    /// Axis-aligned box
    Cuboid { min: Vec3, max: Vec3 },
    /// Horizontal plane at height `y`, checkered with `tile` sized squares
    Ground { y: f32, tile: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub shape: Shape,
    pub color: u32,
}

/// A set of objects rendered by ray casting
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, shape: Shape, color: u32) -> Self {
        self.objects.push(SceneObject { shape, color });
        self
    }

    /// A few primitives on a checkered floor, sized for the default capture
    /// volume
    pub fn demo() -> Self {
        Self::new()
            .with(Shape::Ground { y: -5.0, tile: 2.0 }, pack_rgb(90, 90, 90))
            .with(
                Shape::Sphere {
                    center: Vec3::new(0.0, -1.0, 0.0),
                    radius: 3.0,
                },
                pack_rgb(230, 60, 40),
            )
            .with(
                Shape::Sphere {
                    center: Vec3::new(5.0, -3.5, 4.0),
                    radius: 1.5,
                },
                pack_rgb(40, 200, 80),
            )
            .with(
                Shape::Cuboid {
                    min: Vec3::new(-7.0, -5.0, -6.0),
                    max: Vec3::new(-3.0, 0.0, -2.0),
                },
                pack_rgb(50, 90, 230),
            )
    }

    /// Nearest hit along a ray: (distance along `dir`, colour)
    fn trace(&self, origin: Vec3, dir: Vec3, min_t: f32) -> Option<(f32, u32)> {
        let mut best: Option<(f32, u32)> = None;
        for object in &self.objects {
            let Some(t) = intersect(&object.shape, origin, dir, min_t) else {
                continue;
            };
            if best.is_some_and(|(b, _)| b <= t) {
                continue;
            }
            let color = match object.shape {
                Shape::Ground { tile, .. } => {
                    let p = origin + dir * t;
                    let checker = ((p.x / tile).floor() + (p.z / tile).floor()) as i64;
                    if checker.rem_euclid(2) == 0 {
                        object.color
                    } else {
                        shade(object.color, 0.6)
                    }
                }
                _ => object.color,
            };
            best = Some((t, color));
        }
        best
    }

    /// Render a depth frame as seen by `camera`
    pub fn render(&self, camera: &DepthCamera, resolution: u32) -> DepthFrame {
        let mut frame = DepthFrame::empty(resolution);
        for py in 0..resolution {
            for px in 0..resolution {
                let (origin, dir) = camera.pixel_ray(px, py, resolution);
                if let Some((t, color)) = self.trace(origin, dir, camera.near) {
                    let depth = camera.normalized_depth(t);
                    if depth > 0.0 && depth < 1.0 {
                        frame.set(px, py, depth, color);
                    }
                }
            }
        }
        debug!(resolution, hits = frame.hit_count(), "Scene rendered");
        frame
    }
}

/// Camera orbiting the capture volume, step `index` of `steps`
///
/// The camera looks down at the volume from `elevation` radians above the
/// horizon and is fitted to the capture cylinder.
pub fn orbit_camera(volume: &CaptureVolume, index: usize, steps: usize, elevation: f32) -> DepthCamera {
    let angle = 2.0 * PI * index as f32 / steps.max(1) as f32;
    let distance = 2.0 * volume.extent().max_element().max(0.0);
    let horizontal = distance * elevation.cos();
    let position = volume.position
        + Vec3::new(
            horizontal * angle.cos(),
            distance * elevation.sin(),
            horizontal * angle.sin(),
        );
    let mut camera = DepthCamera::look_at(
        position,
        volume.position,
        Projection::Orthographic { half_size: 1.0 },
        0.1,
        distance * 2.0,
    );
    camera.fit_to_cylinder(volume);
    camera
}

fn shade(color: u32, k: f32) -> u32 {
    let [r, g, b] = crate::voxel::unpack_rgb(color).map(|c| (c as f32 * k) as u8);
    pack_rgb(r, g, b)
}

fn intersect(shape: &Shape, origin: Vec3, dir: Vec3, min_t: f32) -> Option<f32> {
    match *shape {
        Shape::Sphere { center, radius } => {
            let oc = origin - center;
            let a = dir.length_squared();
            let b = 2.0 * oc.dot(dir);
            let c = oc.length_squared() - radius * radius;
            let disc = b * b - 4.0 * a * c;
            if disc < 0.0 {
                return None;
            }
            let sq = disc.sqrt();
            [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)]
                .into_iter()
                .find(|t| *t >= min_t)
        }
        Shape::Cuboid { min, max } => {
            let mut t0 = f32::NEG_INFINITY;
            let mut t1 = f32::INFINITY;
            for axis in 0..3 {
                if dir[axis].abs() < f32::EPSILON {
                    if origin[axis] < min[axis] || origin[axis] > max[axis] {
                        return None;
                    }
                    continue;
                }
                let inv = 1.0 / dir[axis];
                let (mut near, mut far) = ((min[axis] - origin[axis]) * inv, (max[axis] - origin[axis]) * inv);
                if near > far {
                    std::mem::swap(&mut near, &mut far);
                }
                t0 = t0.max(near);
                t1 = t1.min(far);
                if t0 > t1 {
                    return None;
                }
            }
            [t0, t1].into_iter().find(|t| *t >= min_t)
        }
        Shape::Ground { y, .. } => {
            if dir.y.abs() < f32::EPSILON {
                return None;
            }
            let t = (y - origin.y) / dir.y;
            (t >= min_t).then_some(t)
        }
    }
}
