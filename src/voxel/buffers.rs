// SPDX-License-Identifier: GPL-3.0-only

//! Point, depth and index buffers for one renderer
//!
//! Mirrors the compute-buffer set of the depth camera: a raw poltex buffer
//! holding every captured sample, a refined buffer holding the depth-tested
//! samples, the per-line depth buffer and the three-entry index buffer.
//! Every reallocation bumps the buffer generation so frames resolved against
//! the old buffers can be recognised and refused.

use super::types::{DepthSample, Poltex, ResolveCounters};
use crate::constants::{
    DEPTH_SAMPLE_STRIDE, MIN_RESOLUTION, POLTEX_MAX_HEADROOM, POLTEX_MIN_HEADROOM, POLTEX_STRIDE,
    max_depth_index, max_points,
};
use crate::errors::{ConfigError, DispatchError};
use tracing::{debug, info};

/// Identifies one allocation of a [`FrameBufferSet`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

/// Which poltex buffer to read
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PointSource {
    /// Depth-tested samples, at most one valid record per line
    Refined,
    /// Every captured sample
    Raw,
}

/// Cached buffer layout - avoids reallocation when nothing changed
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferLayout {
    pub resolution: u32,
    pub headroom: u32,
}

impl BufferLayout {
    pub fn new(resolution: u32, headroom: u32) -> Self {
        Self {
            resolution,
            headroom,
        }
    }

    /// Check if the layout has changed and buffers need reallocating
    pub fn needs_update(&self, resolution: u32, headroom: u32) -> bool {
        self.resolution != resolution || self.headroom != headroom
    }

    /// Check if a layout has been allocated (non-zero)
    pub fn is_initialized(&self) -> bool {
        self.resolution > 0 && self.headroom > 0
    }

    /// Validate against the pipeline limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution <= MIN_RESOLUTION {
            return Err(ConfigError::ResolutionTooLow {
                resolution: self.resolution,
                minimum: MIN_RESOLUTION,
            });
        }
        if !(POLTEX_MIN_HEADROOM..=POLTEX_MAX_HEADROOM).contains(&self.headroom) {
            return Err(ConfigError::HeadroomOutOfRange {
                headroom: self.headroom,
                min: POLTEX_MIN_HEADROOM,
                max: POLTEX_MAX_HEADROOM,
            });
        }
        Ok(())
    }

    /// Poltex capacity of each point buffer
    pub fn max_points(&self) -> usize {
        max_points(self.resolution, self.headroom)
    }

    /// Largest depth slot index (inclusive)
    pub fn max_depth_samples(&self) -> usize {
        max_depth_index(self.resolution)
    }

    /// Total bytes held by the buffers of this layout
    pub fn byte_size(&self) -> usize {
        2 * self.max_points() * POLTEX_STRIDE
            + (self.max_depth_samples() + 1) * DEPTH_SAMPLE_STRIDE
    }
}

/// Read-only window onto a resolved poltex buffer
#[derive(Debug, Clone, Copy)]
pub struct PointView<'a> {
    pub points: &'a [Poltex],
    pub count: usize,
    pub generation: Generation,
}

/// Read-only window onto the depth buffer of a resolved pass
#[derive(Debug, Clone, Copy)]
pub struct DepthView<'a> {
    pub depth: &'a [DepthSample],
    pub points: &'a [Poltex],
    pub frame_tag: i32,
    pub generation: Generation,
}

/// Counters of a completed resolve pass, tied to the buffers it was written into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub generation: Generation,
    pub counters: ResolveCounters,
}

/// Mutable split borrow handed to the resolver
pub(crate) struct BufferPartsMut<'a> {
    pub raw: &'a mut [Poltex],
    pub refined: &'a mut [Poltex],
    pub depth: &'a mut [DepthSample],
    pub counters: &'a mut ResolveCounters,
}

/// Buffers owned exclusively by one renderer
#[derive(Debug)]
pub struct FrameBufferSet {
    layout: BufferLayout,
    raw: Vec<Poltex>,
    refined: Vec<Poltex>,
    depth: Vec<DepthSample>,
    counters: ResolveCounters,
    generation: Generation,
}

impl FrameBufferSet {
    /// Allocate buffers for `resolution × resolution` pixels with `headroom`
    /// poltex per pixel
    pub fn allocate(resolution: u32, headroom: u32) -> Result<Self, ConfigError> {
        let mut set = Self::unallocated();
        set.reallocate(resolution, headroom)?;
        Ok(set)
    }

    /// Empty set holding no buffers
    pub fn unallocated() -> Self {
        Self {
            layout: BufferLayout::default(),
            raw: Vec::new(),
            refined: Vec::new(),
            depth: Vec::new(),
            counters: ResolveCounters::default(),
            generation: Generation::default(),
        }
    }

    /// Dispose the current buffers and allocate fresh, zeroed ones
    ///
    /// Invalidates every poltex index and view issued before the call.
    pub fn reallocate(&mut self, resolution: u32, headroom: u32) -> Result<(), ConfigError> {
        let layout = BufferLayout::new(resolution, headroom);
        layout.validate()?;

        self.dispose();

        let max_points = layout.max_points();
        // The largest pairing index is inclusive
        let depth_len = layout.max_depth_samples() + 1;

        debug!(
            resolution,
            headroom,
            max_points,
            depth_len,
            bytes = layout.byte_size(),
            "Allocating poltex buffers"
        );

        let raw = zeroed_vec::<Poltex>(max_points, &layout)?;
        let refined = zeroed_vec::<Poltex>(max_points, &layout)?;
        let depth = filled_vec(depth_len, DepthSample::EMPTY, &layout)?;

        self.raw = raw;
        self.refined = refined;
        self.depth = depth;
        self.counters = ResolveCounters::default();
        self.layout = layout;

        info!(
            resolution,
            headroom,
            generation = self.generation.0,
            "Poltex buffers ready"
        );
        Ok(())
    }

    /// Release every buffer; safe to call repeatedly
    pub fn dispose(&mut self) {
        // Only a live allocation moves the generation forward
        if !self.layout.is_initialized() {
            return;
        }
        debug!(generation = self.generation.0, "Disposing poltex buffers");
        self.raw = Vec::new();
        self.refined = Vec::new();
        self.depth = Vec::new();
        self.counters = ResolveCounters::default();
        self.layout = BufferLayout::default();
        self.generation = Generation(self.generation.0 + 1);
    }

    /// Start a new pass without clearing any buffer
    #[inline]
    pub fn reset(&mut self, frame_tag: i32) {
        self.counters = ResolveCounters::new(frame_tag);
    }

    pub fn is_allocated(&self) -> bool {
        self.layout.is_initialized()
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn resolution(&self) -> u32 {
        self.layout.resolution
    }

    pub fn headroom(&self) -> u32 {
        self.layout.headroom
    }

    /// Poltex capacity of each point buffer
    pub fn max_points(&self) -> usize {
        self.refined.len()
    }

    /// Largest depth slot index (`2r² − 2r`)
    pub fn max_depth_samples(&self) -> usize {
        self.depth.len().saturating_sub(1)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn counters(&self) -> ResolveCounters {
        self.counters
    }

    pub fn refined(&self) -> &[Poltex] {
        &self.refined
    }

    pub fn raw(&self) -> &[Poltex] {
        &self.raw
    }

    pub fn depth(&self) -> &[DepthSample] {
        &self.depth
    }

    pub(crate) fn parts_mut(&mut self) -> BufferPartsMut<'_> {
        BufferPartsMut {
            raw: &mut self.raw,
            refined: &mut self.refined,
            depth: &mut self.depth,
            counters: &mut self.counters,
        }
    }

    fn check_generation(&self, frame: &ResolvedFrame) -> Result<(), DispatchError> {
        if frame.generation != self.generation {
            return Err(DispatchError::StaleGeneration {
                frame: frame.generation.0,
                current: self.generation.0,
            });
        }
        Ok(())
    }

    /// Points written by a resolved pass
    ///
    /// Fails fast if the buffers were reallocated after the pass.
    pub fn view(
        &self,
        frame: &ResolvedFrame,
        source: PointSource,
    ) -> Result<PointView<'_>, DispatchError> {
        self.check_generation(frame)?;
        let (points, count) = match source {
            PointSource::Refined => (&self.refined[..], frame.counters.refined_index),
            PointSource::Raw => (&self.raw[..], frame.counters.raw_index),
        };
        Ok(PointView {
            points,
            count: count.max(0) as usize,
            generation: self.generation,
        })
    }

    /// Depth slots and refined points of a resolved pass
    pub fn depth_view(&self, frame: &ResolvedFrame) -> Result<DepthView<'_>, DispatchError> {
        self.check_generation(frame)?;
        Ok(DepthView {
            depth: &self.depth,
            points: &self.refined,
            frame_tag: frame.counters.frame_tag,
            generation: self.generation,
        })
    }
}

fn zeroed_vec<T: bytemuck::Zeroable + Clone>(
    len: usize,
    layout: &BufferLayout,
) -> Result<Vec<T>, ConfigError> {
    filled_vec(len, T::zeroed(), layout)
}

fn filled_vec<T: Clone>(len: usize, value: T, layout: &BufferLayout) -> Result<Vec<T>, ConfigError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ConfigError::AllocationFailed {
            requested: layout.byte_size(),
        })?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        let set = FrameBufferSet::allocate(16, 1).unwrap();
        assert_eq!(set.max_points(), 256);
        assert_eq!(set.max_depth_samples(), 480);
        assert_eq!(set.raw().len(), 256);
        assert_eq!(set.depth().len(), 481);
    }

    #[test]
    fn test_rejects_low_resolution() {
        assert!(matches!(
            FrameBufferSet::allocate(8, 1),
            Err(ConfigError::ResolutionTooLow { .. })
        ));
        assert!(matches!(
            FrameBufferSet::allocate(16, 16),
            Err(ConfigError::HeadroomOutOfRange { .. })
        ));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut set = FrameBufferSet::allocate(16, 1).unwrap();
        let generation = set.generation();
        set.dispose();
        set.dispose();
        assert!(!set.is_allocated());
        assert_eq!(set.max_points(), 0);
        assert_eq!(set.generation().0, generation.0 + 1);
    }

    #[test]
    fn test_reset_keeps_contents() {
        let mut set = FrameBufferSet::allocate(16, 1).unwrap();
        set.parts_mut().depth[3].frame_tag = 7;
        set.reset(8);
        assert_eq!(set.counters(), ResolveCounters::new(8));
        assert_eq!(set.depth()[3].frame_tag, 7);
    }

    #[test]
    fn test_stale_view_is_refused() {
        let mut set = FrameBufferSet::allocate(16, 1).unwrap();
        let frame = ResolvedFrame {
            generation: set.generation(),
            counters: ResolveCounters::new(1),
        };
        assert!(set.view(&frame, PointSource::Refined).is_ok());
        set.reallocate(16, 2).unwrap();
        assert!(matches!(
            set.view(&frame, PointSource::Refined),
            Err(DispatchError::StaleGeneration { .. })
        ));
    }
}
