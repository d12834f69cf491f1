// SPDX-License-Identifier: GPL-3.0-only

//! Batched hand-off of resolved points to the display
//!
//! The display driver accepts a bounded number of bytes per draw call. Point
//! clouds larger than one group are copied slice by slice into a reusable
//! scratch buffer and sent as consecutive calls.

use super::buffers::DepthView;
use super::types::Poltex;
use crate::constants::{DisplayTarget, POLTEX_STRIDE};
use crate::errors::{ConfigError, DispatchError};
use tracing::{debug, trace, warn};

/// Receiver of point groups, usually the display driver
pub trait DrawSink {
    /// Draw one group of points
    fn draw_points(&mut self, points: &[Poltex]);

    /// Whether the display can currently accept draw calls
    fn is_available(&self) -> bool {
        true
    }
}

impl<F> DrawSink for F
where
    F: FnMut(&[Poltex]),
{
    fn draw_points(&mut self, points: &[Poltex]) {
        self(points)
    }
}

/// Sink that keeps everything it is given
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub groups: Vec<usize>,
    pub points: Vec<Poltex>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.points.clear();
    }
}

impl DrawSink for CollectingSink {
    fn draw_points(&mut self, points: &[Poltex]) {
        self.groups.push(points.len());
        self.points.extend_from_slice(points);
    }
}

/// Sink standing in for a disconnected display
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSink;

impl DrawSink for UnavailableSink {
    fn draw_points(&mut self, _points: &[Poltex]) {}

    fn is_available(&self) -> bool {
        false
    }
}

/// Outcome of one flush
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupCounts {
    /// Points sent per draw call, in order
    pub counts: Vec<usize>,
    /// Groups skipped because the sink was unavailable
    pub skipped: usize,
    /// Set when the flush was abandoned part way
    pub abandoned: Option<DispatchError>,
}

impl GroupCounts {
    /// Points that reached the sink
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Draw calls made
    pub fn calls(&self) -> usize {
        self.counts.len()
    }
}

/// Splits point buffers into draw calls under a byte budget
#[derive(Debug)]
pub struct BatchDispatcher {
    group_size: usize,
    scratch: Vec<Poltex>,
}

impl BatchDispatcher {
    pub fn new(group_byte_budget: usize) -> Result<Self, ConfigError> {
        let group_size = group_size_for(group_byte_budget)?;
        Ok(Self {
            group_size,
            scratch: Vec::new(),
        })
    }

    /// Dispatcher using the default budget of `target`
    pub fn for_target(target: DisplayTarget) -> Self {
        Self {
            group_size: (target.default_group_budget() / POLTEX_STRIDE).max(1),
            scratch: Vec::new(),
        }
    }

    /// Points per draw call
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Change the per-call byte budget
    pub fn set_budget(&mut self, group_byte_budget: usize) -> Result<(), ConfigError> {
        self.group_size = group_size_for(group_byte_budget)?;
        self.scratch = Vec::new();
        debug!(group_size = self.group_size, "Dispatch group size changed");
        Ok(())
    }

    /// Number of groups a buffer of `capacity` points can need
    pub fn groups_for(&self, capacity: usize) -> usize {
        capacity.div_ceil(self.group_size)
    }

    /// Send the first `count` points of `points` in bounded groups
    ///
    /// A range error abandons the remaining groups of this flush.
    pub fn flush(
        &mut self,
        points: &[Poltex],
        count: usize,
        sink: &mut dyn DrawSink,
    ) -> GroupCounts {
        let mut result = GroupCounts::default();
        if count == 0 {
            return result;
        }

        if count < self.group_size {
            match points.get(..count) {
                Some(slice) => send(sink, slice, &mut result),
                None => abandon(&mut result, count, points.len(), 0),
            }
            return result;
        }

        let groups = count.div_ceil(self.group_size);
        for group in 0..groups {
            let start = group * self.group_size;
            let end = (start + self.group_size).min(count);
            let Some(slice) = points.get(start..end) else {
                abandon(&mut result, end, points.len(), group);
                break;
            };
            self.scratch.clear();
            self.scratch.extend_from_slice(slice);
            send(sink, &self.scratch, &mut result);
        }

        trace!(count, groups, sent = result.total(), "Flushed point groups");
        result
    }

    /// Send the first `count` points in one call regardless of the budget
    pub fn flush_single(
        &mut self,
        points: &[Poltex],
        count: usize,
        sink: &mut dyn DrawSink,
    ) -> GroupCounts {
        let mut result = GroupCounts::default();
        if count == 0 {
            return result;
        }
        match points.get(..count) {
            Some(slice) => send(sink, slice, &mut result),
            None => abandon(&mut result, count, points.len(), 0),
        }
        result
    }

    /// Walk the depth slots of the current pass and send each winning point
    ///
    /// Evicted records never reach the sink, so every group is dense.
    pub fn flush_depth_walk(&mut self, view: &DepthView<'_>, sink: &mut dyn DrawSink) -> GroupCounts {
        let mut result = GroupCounts::default();
        self.scratch.clear();
        let mut group = 0;

        for entry in view.depth {
            if !entry.is_current(view.frame_tag) || entry.data_index < 0 {
                continue;
            }
            let index = entry.data_index as usize;
            let Some(point) = view.points.get(index) else {
                abandon(&mut result, index + 1, view.points.len(), group);
                self.scratch.clear();
                return result;
            };
            if !point.is_valid() {
                continue;
            }
            self.scratch.push(*point);
            if self.scratch.len() == self.group_size {
                send(sink, &self.scratch, &mut result);
                self.scratch.clear();
                group += 1;
            }
        }

        if !self.scratch.is_empty() {
            send(sink, &self.scratch, &mut result);
            self.scratch.clear();
        }
        result
    }
}

fn group_size_for(group_byte_budget: usize) -> Result<usize, ConfigError> {
    let size = group_byte_budget / POLTEX_STRIDE;
    if size == 0 {
        return Err(ConfigError::InvalidGroupBudget(group_byte_budget));
    }
    Ok(size)
}

fn send(sink: &mut dyn DrawSink, slice: &[Poltex], result: &mut GroupCounts) {
    if sink.is_available() {
        sink.draw_points(slice);
        result.counts.push(slice.len());
    } else {
        result.skipped += 1;
    }
}

fn abandon(result: &mut GroupCounts, requested_end: usize, available: usize, group: usize) {
    let err = DispatchError::Mismatch {
        requested_end,
        available,
        group,
    };
    warn!(%err, "Abandoning remaining point groups for this frame");
    result.abandoned = Some(err);
}
