// SPDX-License-Identifier: GPL-3.0-only

//! vxlit - depth camera to volumetric display pipeline
//!
//! Converts per-pixel depth and colour from a depth camera into a point cloud
//! with at most one point per display line, and sends it to the display in
//! draw calls bounded by a byte budget.
//!
//! # Architecture
//!
//! ```text
//! CameraAspectAdapter ──► RenderParameters
//!                              │
//! DepthFrame ──► project ──► VoxelSamples
//!                              │
//!                  DepthToVoxelResolver ──► FrameBufferSet
//!                                               │
//!                                   BatchDispatcher ──► DrawSink
//! ```
//!
//! - [`voxel`]: the pipeline
//! - [`config`]: user configuration handling
//! - [`scene`]: procedural depth source
//! - [`export`]: LAS and PNG export

pub mod config;
pub mod constants;
pub mod errors;
pub mod export;
pub mod scene;
pub mod voxel;

// Re-export commonly used types
pub use config::Config;
pub use constants::DisplayTarget;
pub use errors::{PipelineError, PipelineResult};
pub use voxel::{
    CaptureVolume, DepthCamera, DepthFrame, DrawSink, FrameReport, HardwareInfo, Poltex,
    RenderMode, VoxelRenderer,
};
