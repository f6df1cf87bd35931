//! Device and presentation abstractions.
//!
//! The synchronization layer never talks to a graphics API directly. Everything
//! it needs from the environment goes through two traits:
//!
//! - [`GpuDevice`]: fences, semaphores, command streams, barriers and queue
//!   submission.
//! - [`PresentationEngine`]: acquiring and presenting swap-chain images, and
//!   recreating the surface when it goes stale.
//!
//! Two implementations are provided:
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | Dummy | [`DummyDevice`], [`DummyPresentation`] | Records every call, used for tests |
//! | Vulkan | `VulkanDevice`, `VulkanPresentation` | Requires the `vulkan-backend` feature |
//!
//! Handles are plain 64-bit newtypes. The wrappers in [`crate::primitives`]
//! and [`crate::command`] own them and destroy them on drop.

mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::any::Any;
use std::sync::Arc;

pub use dummy::{DeviceEvent, DummyDevice, DummyPresentation, DummySurface};

use crate::barrier::BarrierBatch;
use crate::error::SyncError;
use crate::types::{ImageLayout, PipelineStage, QueueId, StreamUsage, Timeout};

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw backend handle.
            pub const fn as_raw(self) -> u64 {
                self.0
            }
        }
    };
}

define_handle!(
    /// Raw handle of a host-waitable fence.
    FenceHandle
);
define_handle!(
    /// Raw handle of a device-only semaphore.
    SemaphoreHandle
);
define_handle!(
    /// Raw handle of a command stream (command buffer).
    StreamHandle
);
define_handle!(
    /// Raw handle of a buffer owned by the caller.
    BufferHandle
);
define_handle!(
    /// Raw handle of an image owned by the caller.
    ImageHandle
);

/// Shared, type-erased device.
pub type SharedDevice = Arc<dyn GpuDevice>;

/// Status of a fence as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// The fence has not been signaled yet.
    Unsignaled,
    /// The GPU has signaled the fence.
    Signaled,
}

/// A semaphore the submission waits on, with the stage that waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stage: PipelineStage,
}

/// One queue submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct Submission<'a> {
    /// Ended command streams to execute, in order. May be empty.
    pub streams: &'a [StreamHandle],
    /// Semaphores to wait on before execution.
    pub waits: &'a [SemaphoreWait],
    /// Semaphores signaled once all streams have completed.
    pub signals: &'a [SemaphoreHandle],
    /// Fence signaled once all streams have completed.
    pub fence: Option<FenceHandle>,
}

/// Interface to the GPU used by the synchronization layer.
///
/// Implementations must be callable from several threads, but callers
/// serialize submissions to a given queue.
pub trait GpuDevice: Send + Sync + 'static {
    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Queue used for graphics work and presentation.
    fn graphics_queue(&self) -> QueueId;

    /// Queue preferred for copies and fills.
    ///
    /// Defaults to the graphics queue for devices without a dedicated one.
    fn transfer_queue(&self) -> QueueId {
        self.graphics_queue()
    }

    /// Create a fence, optionally already signaled.
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, SyncError>;

    /// Destroy a fence. The fence must not be in use.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Block until the fence is signaled or the timeout expires.
    ///
    /// Returns `Ok(false)` if the timeout expired first.
    fn wait_fence(&self, fence: FenceHandle, timeout: Timeout) -> Result<bool, SyncError>;

    /// Return a signaled fence to the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle) -> Result<(), SyncError>;

    /// Query the fence without blocking.
    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, SyncError>;

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> Result<SemaphoreHandle, SyncError>;

    /// Destroy a semaphore. No pending work may reference it.
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Allocate a command stream for `queue`.
    fn allocate_command_stream(
        &self,
        queue: QueueId,
        usage: StreamUsage,
    ) -> Result<StreamHandle, SyncError>;

    /// Free a command stream allocated for `queue`.
    fn free_command_stream(&self, queue: QueueId, stream: StreamHandle);

    /// Start recording.
    fn begin_command_stream(&self, stream: StreamHandle, usage: StreamUsage)
    -> Result<(), SyncError>;

    /// Finish recording.
    fn end_command_stream(&self, stream: StreamHandle) -> Result<(), SyncError>;

    /// Record a pipeline barrier covering every entry of `batch`.
    fn cmd_pipeline_barrier(&self, stream: StreamHandle, batch: &BarrierBatch);

    /// Record a buffer fill with a repeated 32-bit value.
    fn cmd_fill_buffer(
        &self,
        stream: StreamHandle,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        data: u32,
    );

    /// Record a copy of the color aspect of one image into another.
    fn cmd_copy_image(&self, stream: StreamHandle, copy: &ImageCopy);

    /// Submit work to a queue.
    fn queue_submit(&self, queue: QueueId, submission: &Submission<'_>) -> Result<(), SyncError>;

    /// Block until the queue has no pending work.
    fn queue_wait_idle(&self, queue: QueueId) -> Result<(), SyncError>;
}

/// Parameters of an image-to-image copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopy {
    pub src: ImageHandle,
    pub src_layout: ImageLayout,
    pub dst: ImageHandle,
    pub dst_layout: ImageLayout,
    pub width: u32,
    pub height: u32,
}

/// Result of asking the presentation engine for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired and the semaphore will be signaled.
    Ready(u32),
    /// An image was acquired, but the surface no longer matches exactly.
    /// The semaphore will be signaled.
    Suboptimal(u32),
    /// The surface changed; no image was acquired and nothing is signaled.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented as-is.
    Optimal,
    /// Presented, but the surface should be recreated.
    Suboptimal,
    /// The surface changed and must be recreated.
    OutOfDate,
}

/// Objects of a surface that has been replaced.
///
/// Dropping the value destroys them, so it is handed to the deferred reaper
/// until frames that used the old surface have completed.
pub type OutdatedSurface = Box<dyn Any + Send>;

/// Interface to the swap-chain owning presentation engine.
pub trait PresentationEngine: Send {
    /// Number of presentable images.
    fn image_count(&self) -> usize;

    /// Acquire the next presentable image, signaling `signal` when the
    /// presentation engine has released it.
    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Timeout,
    ) -> Result<AcquireOutcome, SyncError>;

    /// Queue `image_index` for presentation once every `waits` semaphore has
    /// been signaled.
    fn present(
        &mut self,
        queue: QueueId,
        waits: &[SemaphoreHandle],
        image_index: u32,
    ) -> Result<PresentOutcome, SyncError>;

    /// Rebuild the surface, returning the replaced objects if any.
    fn recreate(&mut self) -> Result<Option<OutdatedSurface>, SyncError>;
}

/// Number of presentable images to request from a surface.
///
/// One more than the minimum, clamped by the maximum. A maximum of zero means
/// there is no limit.
pub fn presentable_image_count(min_image_count: u32, max_image_count: u32) -> u32 {
    let preferred = min_image_count.saturating_add(1);
    if max_image_count > 0 {
        preferred.min(max_image_count)
    } else {
        preferred
    }
}
