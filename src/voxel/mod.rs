// SPDX-License-Identifier: GPL-3.0-only

//! Depth-camera-to-voxel pipeline
//!
//! - [`buffers`]: point, depth and counter buffers with generation handles
//! - [`resolver`]: nearest-sample-per-line resolve pass
//! - [`dispatch`]: byte-budgeted draw call batching
//! - [`aspect`]: render parameters from camera, capture volume and settings
//! - [`frame`]: depth frames, the depth camera and projection
//! - [`renderer`]: the per-frame loop

pub mod aspect;
pub mod buffers;
pub mod dispatch;
pub mod frame;
pub mod pairing;
pub mod renderer;
pub mod resolver;
pub mod types;

pub use aspect::{
    AspectRatioMode, CameraAspectAdapter, CaptureVolume, HardwareInfo, RenderParameters,
    RenderSettings, fit_correction,
};
pub use buffers::{BufferLayout, FrameBufferSet, Generation, PointSource, ResolvedFrame};
pub use dispatch::{BatchDispatcher, CollectingSink, DrawSink, GroupCounts, UnavailableSink};
pub use frame::{DepthCamera, DepthFrame, DepthImage, Projection, SampleBatch, project};
pub use pairing::{cantor_inverse, cantor_pair};
pub use renderer::{FrameReport, RenderMode, ResolvePass, VoxelRenderer};
pub use resolver::{Claim, DepthToVoxelResolver, OverflowPolicy, ResolveOutcome, ResolveStats, ResolverState};
pub use types::{DepthSample, LineKey, Poltex, ResolveCounters, VoxelSample, pack_rgb, unpack_rgb};
