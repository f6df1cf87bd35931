//! Common types shared by the synchronization layer.
//!
//! This module contains pipeline stage and memory access flags, image layout
//! states, wait timeouts and small identifier types.

mod image;
mod stage;
mod timeout;

pub use image::{ImageAspect, ImageLayout};
pub use stage::{MemoryAccess, PipelineStage, ReadAccess, WriteAccess};
pub use timeout::Timeout;

/// Monotonically increasing frame counter value.
///
/// Signed so that `frame - frames_in_flight` stays meaningful for the
/// first frames.
pub type FrameId = i64;

/// Identifies a device queue.
///
/// The meaning of the index is backend specific. Backends expose the queue
/// used for graphics and presentation through
/// [`GpuDevice::graphics_queue`](crate::device::GpuDevice::graphics_queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u32);

impl QueueId {
    /// Get the raw queue index.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// How a command stream is going to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamUsage {
    /// Recorded and submitted exactly once.
    #[default]
    SingleUse,
    /// May be submitted more than once.
    Reusable,
}
