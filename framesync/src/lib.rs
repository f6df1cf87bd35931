//! # RedLilium Framesync
//!
//! GPU work submission and synchronization for RedLilium.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Fence`] and [`Semaphore`] - Host-waitable and GPU-only completion primitives
//! - [`BarrierBatch`] - Pipeline barriers recorded into a [`CommandStream`]
//! - [`SyncStrategy`] - How an operation's work is ordered against the work around it
//! - [`FramePipeliner`] - Acquire, submit and present with several frames in flight
//! - [`DeferredReaper`] - Releases resources once the frames that used them completed
//! - [`device`] - Backend traits with Dummy (for testing) and Vulkan implementations
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_framesync::{FramePipeliner, PipelinerConfig, SyncStrategy, handlers, ops};
//!
//! let mut pipeliner = FramePipeliner::new(device.clone(), presentation, PipelinerConfig::default())?;
//! loop {
//!     pipeliner.begin_frame()?;
//!     let sync = SyncStrategy::with_barriers_on_current_frame(
//!         pipeliner.lifetime(),
//!         Some(handlers::default_before()),
//!         Some(handlers::default_after()),
//!     );
//!     ops::fill_buffer(&device, buffer, 0, size, 0, sync)?;
//!     pipeliner.render_frame(Vec::new())?;
//! }
//! ```

#[macro_use]
pub mod profiling;

pub mod barrier;
pub mod command;
pub mod device;
pub mod error;
pub mod ops;
pub mod pipeliner;
pub mod primitives;
pub mod reaper;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use barrier::{BarrierBatch, BufferBarrier, GlobalBarrier, ImageBarrier};
pub use command::{CommandStream, StreamState};
pub use device::{
    AcquireOutcome, DummyDevice, DummyPresentation, GpuDevice, PresentOutcome,
    PresentationEngine, SharedDevice,
};
pub use error::{ErrorKind, SyncError};
pub use pipeliner::{FrameLifetime, FramePipeliner, FrameState, PipelinerConfig, RecreationReasons};
pub use primitives::{Fence, Semaphore};
pub use reaper::{DeferredReaper, DeferredResource, ResourceCategory};
pub use sync::{HandlerRequest, SyncStrategy, SyncType, handlers, presets};
pub use types::{
    FrameId, ImageAspect, ImageLayout, MemoryAccess, PipelineStage, QueueId, ReadAccess,
    StreamUsage, Timeout, WriteAccess,
};

/// Framesync library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the synchronization layer.
///
/// Only logs the version; call once at startup.
pub fn init() {
    log::info!("RedLilium Framesync v{} initialized", VERSION);
}
