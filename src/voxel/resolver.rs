// SPDX-License-Identifier: GPL-3.0-only

//! Depth-to-voxel resolve pass
//!
//! Every projected sample lands on a display line. The line's Cantor slot in
//! the depth buffer remembers the nearest sample seen in the current pass and
//! the refined poltex it was written to. A nearer sample evicts that poltex
//! (marks it invalid) and appends its own, so each line ends the pass with at
//! most one valid point.
//!
//! Depth entries are tagged with the pass that wrote them. Entries from older
//! passes are treated as empty, which is why the depth buffer never needs
//! clearing between frames.

use super::buffers::{BufferPartsMut, FrameBufferSet, PointSource, ResolvedFrame};
use super::pairing::cantor_pair;
use super::types::{DepthSample, Poltex, VoxelSample};
use crate::errors::OverflowError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// What to do when the point buffer fills up mid-pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Grow the headroom by one, reallocate and resolve the frame again
    #[default]
    Grow,
    /// Drop the excess samples for this pass
    Drop,
}

/// Resolver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// No pass started since the last reset
    Idle,
    /// Claim loop in progress, counters still moving
    Resolving,
    /// Counters frozen, buffers safe to read
    Resolved,
}

/// Result of submitting one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Sample now owns its line
    Claimed,
    /// Sample replaced a farther sample on its line
    Evicted,
    /// A nearer (or equally near) sample already owns the line
    Rejected,
    /// Line key lies outside the depth buffer
    OutOfRange,
    /// No room left in the refined buffer
    Overflow,
    /// Submitted while no pass was running
    Ignored,
}

/// Per-pass counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub submitted: usize,
    pub claimed: usize,
    pub evicted: usize,
    pub rejected: usize,
    pub out_of_range: usize,
    /// Samples lost to a full refined buffer
    pub refined_dropped: usize,
    /// Samples lost to a full raw buffer
    pub raw_dropped: usize,
}

/// A completed pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOutcome {
    pub frame: ResolvedFrame,
    pub stats: ResolveStats,
    /// Set when the buffer that gets drawn ran out of room
    pub overflow: Option<OverflowError>,
}

/// Converts projected samples into the refined point cloud
#[derive(Debug)]
pub struct DepthToVoxelResolver {
    frame_counter: i32,
    state: ResolverState,
    depth_threshold: f32,
    primary: PointSource,
    stats: ResolveStats,
}

impl Default for DepthToVoxelResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthToVoxelResolver {
    pub fn new() -> Self {
        Self {
            frame_counter: 0,
            state: ResolverState::Idle,
            depth_threshold: 0.0,
            primary: PointSource::Refined,
            stats: ResolveStats::default(),
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// Tag of the most recent pass (0 before the first one)
    pub fn frame_tag(&self) -> i32 {
        self.frame_counter
    }

    #[cfg(test)]
    pub(crate) fn set_frame_counter(&mut self, tag: i32) {
        self.frame_counter = tag;
    }

    /// Margin a sample must be nearer by to evict the incumbent.
    /// 0 keeps the strict less-than rule.
    pub fn set_depth_threshold(&mut self, threshold: f32) {
        self.depth_threshold = threshold;
    }

    /// Buffer whose exhaustion counts as an overflow
    pub fn set_primary(&mut self, source: PointSource) {
        self.primary = source;
    }

    pub fn primary(&self) -> PointSource {
        self.primary
    }

    /// Run a complete pass over `samples`
    pub fn resolve<I>(&mut self, buffers: &mut FrameBufferSet, samples: I) -> ResolveOutcome
    where
        I: IntoIterator<Item = VoxelSample>,
    {
        self.begin_pass(buffers);
        let tag = self.frame_counter;
        let threshold = self.depth_threshold;
        let mut stats = ResolveStats::default();
        {
            let mut parts = buffers.parts_mut();
            for sample in samples {
                claim(&mut parts, tag, threshold, &sample, &mut stats);
            }
        }
        self.stats = stats;
        self.finish_pass(buffers)
    }

    /// Reset the counters and start a new tagged pass
    pub fn begin_pass(&mut self, buffers: &mut FrameBufferSet) -> i32 {
        if self.frame_counter == i32::MAX {
            // Tags must keep increasing; start over from a clean depth buffer
            debug!("Frame tag wrapped, clearing depth buffer");
            buffers
                .parts_mut()
                .depth
                .iter_mut()
                .for_each(|d| *d = DepthSample::EMPTY);
            self.frame_counter = 0;
        }
        self.frame_counter += 1;
        buffers.reset(self.frame_counter);
        self.stats = ResolveStats::default();
        self.state = ResolverState::Resolving;
        self.frame_counter
    }

    /// Submit one sample to the running pass
    pub fn submit(&mut self, buffers: &mut FrameBufferSet, sample: &VoxelSample) -> Claim {
        if self.state != ResolverState::Resolving {
            return Claim::Ignored;
        }
        let mut parts = buffers.parts_mut();
        claim(
            &mut parts,
            self.frame_counter,
            self.depth_threshold,
            sample,
            &mut self.stats,
        )
    }

    /// Freeze the counters of the running pass
    pub fn finish_pass(&mut self, buffers: &FrameBufferSet) -> ResolveOutcome {
        self.state = ResolverState::Resolved;
        let stats = self.stats;

        let (dropped, capacity) = match self.primary {
            PointSource::Refined => (stats.refined_dropped, buffers.refined().len()),
            PointSource::Raw => (stats.raw_dropped, buffers.raw().len()),
        };
        let overflow = (dropped > 0).then(|| OverflowError {
            capacity,
            dropped,
            headroom: buffers.headroom(),
        });

        if let Some(ref e) = overflow {
            trace!(
                capacity = e.capacity,
                dropped = e.dropped,
                headroom = e.headroom,
                "Poltex buffer full"
            );
        }

        ResolveOutcome {
            frame: ResolvedFrame {
                generation: buffers.generation(),
                counters: buffers.counters(),
            },
            stats,
            overflow,
        }
    }
}

fn claim(
    parts: &mut BufferPartsMut<'_>,
    tag: i32,
    threshold: f32,
    sample: &VoxelSample,
    stats: &mut ResolveStats,
) -> Claim {
    stats.submitted += 1;

    let slot = cantor_pair(sample.line);
    if slot >= parts.depth.len() {
        stats.out_of_range += 1;
        return Claim::OutOfRange;
    }

    let record = Poltex::new(sample.position, sample.depth, slot, sample.color);

    // Raw buffer keeps every sample on a valid line
    let raw_index = parts.counters.raw_index as usize;
    if let Some(raw) = parts.raw.get_mut(raw_index) {
        *raw = record;
        parts.counters.raw_index += 1;
    } else {
        stats.raw_dropped += 1;
    }

    let entry = parts.depth[slot];
    let incumbent = (entry.is_current(tag) && entry.data_index >= 0).then_some(entry);

    if let Some(current) = incumbent {
        // Strictly nearer wins; equal depth keeps the first writer
        if !(sample.depth + threshold < current.value) {
            stats.rejected += 1;
            return Claim::Rejected;
        }
    }

    let index = parts.counters.refined_index as usize;
    if index >= parts.refined.len() {
        stats.refined_dropped += 1;
        return Claim::Overflow;
    }

    let result = match incumbent {
        Some(current) => {
            if let Some(old) = parts.refined.get_mut(current.data_index as usize) {
                old.invalidate();
            }
            stats.evicted += 1;
            Claim::Evicted
        }
        None => {
            stats.claimed += 1;
            Claim::Claimed
        }
    };

    parts.refined[index] = record;
    parts.counters.refined_index += 1;
    parts.depth[slot] = DepthSample {
        value: sample.depth,
        data_index: index as i32,
        frame_tag: tag,
    };

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::types::LineKey;
    use glam::Vec3;

    fn sample(k1: u32, k2: u32, depth: f32, color: u32) -> VoxelSample {
        VoxelSample {
            position: Vec3::new(k1 as f32, k2 as f32, depth),
            line: LineKey::new(k1, k2),
            depth,
            color,
        }
    }

    #[test]
    fn test_state_machine() {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        assert_eq!(resolver.state(), ResolverState::Idle);
        assert_eq!(
            resolver.submit(&mut buffers, &sample(0, 0, 0.5, 1)),
            Claim::Ignored
        );

        let tag = resolver.begin_pass(&mut buffers);
        assert_eq!(tag, 1);
        assert_eq!(resolver.state(), ResolverState::Resolving);
        assert_eq!(
            resolver.submit(&mut buffers, &sample(0, 0, 0.5, 1)),
            Claim::Claimed
        );
        let outcome = resolver.finish_pass(&buffers);
        assert_eq!(resolver.state(), ResolverState::Resolved);
        assert_eq!(outcome.frame.counters.refined_index, 1);
        assert_eq!(outcome.frame.counters.frame_tag, 1);
    }

    #[test]
    fn test_frame_tag_wrap_clears_stale_slots() {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();

        // Tag 1 leaves a near sample on (5, 5)
        let outcome = resolver.resolve(&mut buffers, [sample(5, 5, 0.1, 0x0000ff)]);
        assert_eq!(outcome.frame.counters.frame_tag, 1);

        resolver.set_frame_counter(i32::MAX - 1);
        let outcome = resolver.resolve(&mut buffers, [sample(2, 3, 0.1, 0x00ff00)]);
        assert_eq!(outcome.frame.counters.frame_tag, i32::MAX);
        assert_eq!(outcome.stats.claimed, 1);

        // Tags restart at 1; neither old entry may look current
        let outcome = resolver.resolve(
            &mut buffers,
            [sample(2, 3, 0.9, 0xff0000), sample(5, 5, 0.9, 0xff0000)],
        );
        assert_eq!(outcome.frame.counters.frame_tag, 1);
        assert_eq!(outcome.stats.claimed, 2);
        assert_eq!(outcome.stats.rejected, 0);
        assert_eq!(outcome.frame.counters.refined_index, 2);
        assert!(buffers.refined()[..2].iter().all(|p| p.color == 0xff0000));
        assert_eq!(resolver.frame_tag(), 1);
    }

    #[test]
    fn test_equal_depth_keeps_first() {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        let outcome = resolver.resolve(
            &mut buffers,
            [sample(2, 3, 0.4, 0x0000ff), sample(2, 3, 0.4, 0xff0000)],
        );
        assert_eq!(outcome.stats.rejected, 1);
        assert_eq!(outcome.frame.counters.refined_index, 1);
        assert_eq!(buffers.refined()[0].color, 0x0000ff);
    }

    #[test]
    fn test_threshold_requires_margin() {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        resolver.set_depth_threshold(0.05);
        let outcome = resolver.resolve(
            &mut buffers,
            [sample(1, 1, 0.50, 0x111111), sample(1, 1, 0.48, 0x222222)],
        );
        assert_eq!(outcome.stats.rejected, 1);
        assert!(buffers.refined()[0].is_valid());
    }

    #[test]
    fn test_out_of_range_line() {
        let mut buffers = FrameBufferSet::allocate(16, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        // Cantor index of (0, 31) is 527, past the 480 slot limit
        let outcome = resolver.resolve(&mut buffers, [sample(0, 31, 0.1, 1)]);
        assert_eq!(outcome.stats.out_of_range, 1);
        assert_eq!(outcome.frame.counters.refined_index, 0);
        assert_eq!(outcome.frame.counters.raw_index, 0);
    }

    #[test]
    fn test_raw_overflow_is_not_primary() {
        let mut buffers = FrameBufferSet::allocate(9, 1).unwrap();
        let mut resolver = DepthToVoxelResolver::new();
        // 81 points of capacity; 100 samples on a single line
        let samples = (0..100).map(|i| sample(0, 0, 1.0 - i as f32 * 0.001, 1));
        let outcome = resolver.resolve(&mut buffers, samples);
        assert_eq!(outcome.stats.raw_dropped, 19);
        // Every sample is nearer than the last, so the refined buffer fills too
        assert!(outcome.overflow.is_some());

        let samples = (0..100).map(|i| sample(0, 0, 0.1 + i as f32 * 0.001, 1));
        let outcome = resolver.resolve(&mut buffers, samples);
        assert_eq!(outcome.stats.raw_dropped, 19);
        assert_eq!(outcome.frame.counters.refined_index, 1);
        assert!(outcome.overflow.is_none());

        resolver.set_primary(PointSource::Raw);
        let samples = (0..100).map(|i| sample(0, 0, 0.1 + i as f32 * 0.001, 1));
        let outcome = resolver.resolve(&mut buffers, samples);
        assert_eq!(outcome.overflow.map(|o| o.dropped), Some(19));
    }
}
