//! Command streams.
//!
//! A [`CommandStream`] is a recording command buffer bound to one queue. Its
//! state moves through:
//!
//! ```text
//! Initial ──begin──► Recording ──end──► Executable ──submit──► Pending
//!                       ▲                                        │
//!                       └────────────── begin (reusable) ────────┘
//! ```
//!
//! Recording into a stream that is not recording is a programming error and
//! panics. Streams handed out by sync strategies are always recording.
//!
//! The device object is freed when the stream is dropped, so a submitted
//! stream must be kept alive until the work that uses it has completed. The
//! sync strategies and the deferred reaper take care of that.

use std::fmt;
use std::sync::Arc;

use crate::barrier::{BarrierBatch, BufferBarrier, ImageBarrier};
use crate::device::{BufferHandle, ImageCopy, ImageHandle, SharedDevice, StreamHandle};
use crate::error::SyncError;
use crate::types::{ImageAspect, ImageLayout, MemoryAccess, PipelineStage, QueueId, StreamUsage};

/// Recording state of a [`CommandStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Allocated, nothing recorded.
    Initial,
    /// Commands can be recorded.
    Recording,
    /// Ended and ready to submit.
    Executable,
    /// Submitted to a queue.
    Pending,
}

/// A command buffer bound to a queue.
pub struct CommandStream {
    device: SharedDevice,
    queue: QueueId,
    handle: StreamHandle,
    usage: StreamUsage,
    state: StreamState,
}

impl CommandStream {
    /// Allocate a new stream for `queue`.
    pub fn allocate(
        device: &SharedDevice,
        queue: QueueId,
        usage: StreamUsage,
    ) -> Result<Self, SyncError> {
        let handle = device.allocate_command_stream(queue, usage)?;
        Ok(Self {
            device: Arc::clone(device),
            queue,
            handle,
            usage,
            state: StreamState::Initial,
        })
    }

    /// Start recording.
    ///
    /// Single-use streams can only be begun once.
    pub fn begin(&mut self) -> Result<(), SyncError> {
        let allowed = match self.state {
            StreamState::Initial => true,
            StreamState::Executable | StreamState::Pending => self.usage == StreamUsage::Reusable,
            StreamState::Recording => false,
        };
        if !allowed {
            return Err(SyncError::InvalidStreamState(format!(
                "cannot begin {:?} stream in state {:?}",
                self.usage, self.state
            )));
        }
        self.device.begin_command_stream(self.handle, self.usage)?;
        self.state = StreamState::Recording;
        Ok(())
    }

    /// Finish recording.
    pub fn end(&mut self) -> Result<(), SyncError> {
        if self.state != StreamState::Recording {
            return Err(SyncError::InvalidStreamState(format!(
                "cannot end stream in state {:?}",
                self.state
            )));
        }
        self.device.end_command_stream(self.handle)?;
        self.state = StreamState::Executable;
        Ok(())
    }

    /// Record that the stream has been handed to a queue.
    pub(crate) fn mark_submitted(&mut self) {
        self.state = StreamState::Pending;
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn usage(&self) -> StreamUsage {
        self.usage
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == StreamState::Recording
    }

    fn assert_recording(&self, what: &str) {
        assert!(
            self.is_recording(),
            "cannot record {what} into a stream in state {:?}",
            self.state
        );
    }

    /// Record every barrier of `batch` as a single command.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    pub fn pipeline_barrier(&mut self, batch: &BarrierBatch) {
        self.assert_recording("a pipeline barrier");
        self.device.cmd_pipeline_barrier(self.handle, batch);
    }

    /// Record a memory dependency covering all resources.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    pub fn establish_global_memory_barrier(
        &mut self,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Option<MemoryAccess>,
        dst_access: Option<MemoryAccess>,
    ) {
        let mut batch = BarrierBatch::new();
        batch.add_global_barrier(src_stage, dst_stage, src_access, dst_access);
        self.pipeline_barrier(&batch);
    }

    /// Record an image dependency that may also transition its layout.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    #[allow(clippy::too_many_arguments)]
    pub fn establish_image_memory_barrier(
        &mut self,
        image: ImageHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Option<MemoryAccess>,
        dst_access: Option<MemoryAccess>,
    ) {
        let mut batch = BarrierBatch::new();
        batch.add_image_barrier(ImageBarrier {
            image,
            aspect: ImageAspect::COLOR,
            old_layout,
            new_layout,
            src_stage,
            dst_stage,
            src_access: src_access.unwrap_or_default(),
            dst_access: dst_access.unwrap_or_default(),
        });
        batch.record(self);
    }

    /// Record a dependency on a whole buffer.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    pub fn establish_buffer_memory_barrier(
        &mut self,
        buffer: BufferHandle,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
        src_access: Option<MemoryAccess>,
        dst_access: Option<MemoryAccess>,
    ) {
        let mut batch = BarrierBatch::new();
        batch.add_buffer_barrier(BufferBarrier {
            buffer,
            src_stage,
            dst_stage,
            src_access: src_access.unwrap_or_default(),
            dst_access: dst_access.unwrap_or_default(),
        });
        self.pipeline_barrier(&batch);
    }

    /// Fill `size` bytes of `buffer` at `offset` with a repeated value.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    pub fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, data: u32) {
        self.assert_recording("a buffer fill");
        self.device
            .cmd_fill_buffer(self.handle, buffer, offset, size, data);
    }

    /// Copy one image into another.
    ///
    /// # Panics
    ///
    /// Panics if the stream is not recording.
    pub fn copy_image(&mut self, copy: &ImageCopy) {
        self.assert_recording("an image copy");
        self.device.cmd_copy_image(self.handle, copy);
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if self.state == StreamState::Recording {
            log::warn!("Command stream {:?} dropped while recording", self.handle);
        }
        self.device.free_command_stream(self.queue, self.handle);
    }
}

impl fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStream")
            .field("handle", &self.handle)
            .field("queue", &self.queue)
            .field("usage", &self.usage)
            .field("state", &self.state)
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandStream: Send, Sync);
