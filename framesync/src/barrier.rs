//! Pipeline barrier declarations and batching.
//!
//! A barrier names a source stage and access (what must finish and be made
//! available) and a destination stage and access (what must wait and see the
//! result). Image barriers can also transition the image layout.
//!
//! Barriers are collected in a [`BarrierBatch`] and recorded into a command
//! stream as a single pipeline barrier command.

use std::collections::HashMap;

use crate::command::CommandStream;
use crate::device::{BufferHandle, ImageHandle};
use crate::types::{ImageAspect, ImageLayout, MemoryAccess, PipelineStage};

/// A memory dependency covering all resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalBarrier {
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
}

/// A dependency on one image, with an optional layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub aspect: ImageAspect,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
}

/// A dependency on a whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
}

/// A batch of barriers to record together.
///
/// Stage masks are the union of all added barriers. Image barriers are keyed
/// by image, so a later barrier for the same image replaces the earlier one.
#[derive(Debug, Default, Clone)]
pub struct BarrierBatch {
    global_barriers: Vec<GlobalBarrier>,
    image_barriers: HashMap<ImageHandle, ImageBarrier>,
    buffer_barriers: Vec<BufferBarrier>,
    src_stage_mask: PipelineStage,
    dst_stage_mask: PipelineStage,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global memory barrier.
    ///
    /// A missing access means there is nothing to make available (source) or
    /// visible (destination); only execution is ordered.
    pub fn add_global_barrier(
        &mut self,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Option<MemoryAccess>,
        dst_access: Option<MemoryAccess>,
    ) {
        self.global_barriers.push(GlobalBarrier {
            src_stage,
            dst_stage,
            src_access: src_access.unwrap_or(MemoryAccess::empty()),
            dst_access: dst_access.unwrap_or(MemoryAccess::empty()),
        });
        self.src_stage_mask |= src_stage;
        self.dst_stage_mask |= dst_stage;
    }

    /// Add an image barrier.
    ///
    /// A barrier that neither changes the layout nor carries any access
    /// only orders execution, and is added as an execution-only global
    /// barrier instead.
    pub fn add_image_barrier(&mut self, barrier: ImageBarrier) {
        if barrier.old_layout == barrier.new_layout
            && barrier.src_access.is_empty()
            && barrier.dst_access.is_empty()
        {
            self.add_global_barrier(barrier.src_stage, barrier.dst_stage, None, None);
            return;
        }

        self.src_stage_mask |= barrier.src_stage;
        self.dst_stage_mask |= barrier.dst_stage;
        self.image_barriers.insert(barrier.image, barrier);
    }

    /// Add a buffer barrier.
    pub fn add_buffer_barrier(&mut self, barrier: BufferBarrier) {
        self.src_stage_mask |= barrier.src_stage;
        self.dst_stage_mask |= barrier.dst_stage;
        self.buffer_barriers.push(barrier);
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.global_barriers.len() + self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// Union of all source stages.
    pub fn src_stage_mask(&self) -> PipelineStage {
        self.src_stage_mask
    }

    /// Union of all destination stages.
    pub fn dst_stage_mask(&self) -> PipelineStage {
        self.dst_stage_mask
    }

    pub fn global_barriers(&self) -> &[GlobalBarrier] {
        &self.global_barriers
    }

    pub fn image_barriers(&self) -> impl Iterator<Item = &ImageBarrier> {
        self.image_barriers.values()
    }

    pub fn buffer_barriers(&self) -> &[BufferBarrier] {
        &self.buffer_barriers
    }

    /// Record all barriers into `stream` as one command.
    ///
    /// Does nothing if the batch is empty.
    ///
    /// # Panics
    ///
    /// Panics if the batch is not empty and `stream` is not recording.
    pub fn record(&self, stream: &mut CommandStream) {
        if self.is_empty() {
            return;
        }
        stream.pipeline_barrier(self);
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.global_barriers.clear();
        self.image_barriers.clear();
        self.buffer_barriers.clear();
        self.src_stage_mask = PipelineStage::empty();
        self.dst_stage_mask = PipelineStage::empty();
    }
}
