// SPDX-License-Identifier: GPL-3.0-only

//! Record layouts shared by the resolver, the buffers and the dispatcher
//!
//! `Poltex` and `DepthSample` keep the exact byte layout the display runtime
//! and the compute buffers use, so they are `Pod` and can be handed over as
//! raw bytes.

use crate::constants::{DEPTH_SAMPLE_STRIDE, INDEX_COUNT, POLTEX_STRIDE};
use glam::Vec3;

/// `uv[1]` value marking an evicted or stale poltex
pub const INVALID_V: f32 = -1.0;

/// One point of the display point cloud
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Poltex {
    /// Display-space position
    pub position: Vec3,
    /// `u` = normalised depth, `v` = depth slot (or -1 when invalid)
    pub uv: [f32; 2],
    /// Packed 0xRRGGBB colour, 0 = no contribution
    pub color: u32,
}

impl Poltex {
    pub fn new(position: Vec3, depth: f32, slot: usize, color: u32) -> Self {
        Self {
            position,
            uv: [depth, slot as f32],
            color,
        }
    }

    /// Mark the record as evicted
    #[inline]
    pub fn invalidate(&mut self) {
        self.uv[1] = INVALID_V;
        self.color = 0;
    }

    /// Whether the record should reach the display
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.color != 0 && self.uv[1] != INVALID_V
    }

    /// Normalised depth the record was resolved with
    #[inline]
    pub fn depth(&self) -> f32 {
        self.uv[0]
    }
}

/// One entry of the per-line depth buffer
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthSample {
    /// Normalised depth of the winning sample
    pub value: f32,
    /// Index of the winning record in the refined buffer, -1 if unmapped
    pub data_index: i32,
    /// Resolve pass that wrote this entry
    pub frame_tag: i32,
}

impl DepthSample {
    /// Entry that no pass has written
    pub const EMPTY: DepthSample = DepthSample {
        value: 0.0,
        data_index: -1,
        frame_tag: 0,
    };

    /// An entry is only present for the pass that wrote it
    #[inline]
    pub fn is_current(&self, frame_tag: i32) -> bool {
        self.frame_tag == frame_tag
    }
}

impl Default for DepthSample {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// The three-entry index buffer
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ResolveCounters {
    /// Next write index into the refined buffer
    pub refined_index: i32,
    /// Tag of the current resolve pass
    pub frame_tag: i32,
    /// Next write index into the raw buffer
    pub raw_index: i32,
}

impl ResolveCounters {
    pub fn new(frame_tag: i32) -> Self {
        Self {
            refined_index: 0,
            frame_tag,
            raw_index: 0,
        }
    }
}

/// A display line: the two cross-section axes, the third collapsed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub k1: u32,
    pub k2: u32,
}

impl LineKey {
    pub fn new(k1: u32, k2: u32) -> Self {
        Self { k1, k2 }
    }
}

/// A projected depth-camera sample ready to be resolved
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VoxelSample {
    /// Display-space position
    pub position: Vec3,
    /// Line this sample lands on
    pub line: LineKey,
    /// Normalised depth from the camera (smaller is nearer)
    pub depth: f32,
    /// Packed 0xRRGGBB colour
    pub color: u32,
}

/// Pack 8-bit channels into the display colour format
#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Unpack a display colour into 8-bit channels
#[inline]
pub fn unpack_rgb(color: u32) -> [u8; 3] {
    [
        ((color >> 16) & 0xff) as u8,
        ((color >> 8) & 0xff) as u8,
        (color & 0xff) as u8,
    ]
}

const _: () = assert!(std::mem::size_of::<Poltex>() == POLTEX_STRIDE);
const _: () = assert!(std::mem::size_of::<DepthSample>() == DEPTH_SAMPLE_STRIDE);
const _: () = assert!(std::mem::size_of::<ResolveCounters>() == INDEX_COUNT * 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate() {
        let mut p = Poltex::new(Vec3::new(0.1, 0.2, 0.3), 0.5, 7, 0xff8800);
        assert!(p.is_valid());
        p.invalidate();
        assert!(!p.is_valid());
        assert_eq!(p.uv[1], INVALID_V);
        assert_eq!(p.color, 0);
        // Position and depth survive for debugging
        assert_eq!(p.position, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(p.depth(), 0.5);
    }

    #[test]
    fn test_pack_rgb() {
        assert_eq!(pack_rgb(0x12, 0x34, 0x56), 0x123456);
        assert_eq!(unpack_rgb(0x123456), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_poltex_bytes() {
        let p = Poltex::new(Vec3::new(1.0, 2.0, 3.0), 0.25, 4, 0xffffff);
        let bytes: &[u8] = bytemuck::bytes_of(&p);
        assert_eq!(bytes.len(), POLTEX_STRIDE);
        assert_eq!(&bytes[20..24], &0xffffffu32.to_ne_bytes());
    }
}
