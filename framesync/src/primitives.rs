//! Completion primitives: host-waitable fences and device-only semaphores.
//!
//! | Primitive | Signaled by | Waited on by | Host can reset |
//! |-----------|-------------|--------------|----------------|
//! | [`Fence`] | GPU | CPU | yes |
//! | [`Semaphore`] | GPU | GPU | no |
//!
//! Both are cheap to clone; clones share the same underlying object, which is
//! destroyed when the last clone is dropped.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::CommandStream;
use crate::device::{FenceHandle, FenceStatus, SemaphoreHandle, SemaphoreWait, SharedDevice};
use crate::error::SyncError;
use crate::types::{PipelineStage, Timeout};

struct FenceInner {
    device: SharedDevice,
    handle: FenceHandle,
}

impl Drop for FenceInner {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

/// A GPU→CPU completion signal.
///
/// The CPU can poll it, block on it with a timeout, and reset it once
/// signaled. A fence must not be reset while a submission that signals it is
/// still pending.
#[derive(Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Fence {
    /// Create a new fence.
    ///
    /// Frame fences are created signaled so the first wait on each frame slot
    /// returns immediately.
    pub fn new(device: &SharedDevice, signaled: bool) -> Result<Self, SyncError> {
        let handle = device.create_fence(signaled)?;
        Ok(Self {
            inner: Arc::new(FenceInner {
                device: Arc::clone(device),
                handle,
            }),
        })
    }

    /// Raw device handle.
    pub fn handle(&self) -> FenceHandle {
        self.inner.handle
    }

    /// Block until the fence is signaled.
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first.
    pub fn wait(&self, timeout: Timeout) -> Result<bool, SyncError> {
        self.inner.device.wait_fence(self.inner.handle, timeout)
    }

    /// Block with no timeout.
    pub fn wait_until_signaled(&self) -> Result<(), SyncError> {
        if self.wait(Timeout::Infinite)? {
            Ok(())
        } else {
            Err(SyncError::Timeout)
        }
    }

    /// Return the fence to the unsignaled state.
    pub fn reset(&self) -> Result<(), SyncError> {
        self.inner.device.reset_fence(self.inner.handle)
    }

    /// Query the fence without blocking.
    pub fn status(&self) -> Result<FenceStatus, SyncError> {
        self.inner.device.fence_status(self.inner.handle)
    }

    /// Check if the fence is signaled (non-blocking).
    ///
    /// Query errors are reported as not signaled.
    pub fn is_signaled(&self) -> bool {
        matches!(self.status(), Ok(FenceStatus::Signaled))
    }
}

impl PartialEq for Fence {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle
    }
}

impl Eq for Fence {}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("handle", &self.inner.handle)
            .finish()
    }
}

#[derive(Default)]
struct Retained {
    streams: Vec<CommandStream>,
    semaphores: Vec<Semaphore>,
}

struct SemaphoreInner {
    device: SharedDevice,
    handle: SemaphoreHandle,
    retained: Mutex<Retained>,
}

impl Drop for SemaphoreInner {
    fn drop(&mut self) {
        // Work tied to this semaphore goes first.
        let retained = std::mem::take(self.retained.get_mut());
        drop(retained);
        self.device.destroy_semaphore(self.handle);
    }
}

/// A GPU→GPU ordering signal.
///
/// Semaphores are opaque to the CPU: there is no way to query, wait on or
/// reset them from the host. A binary semaphore is signaled by exactly one
/// submission and must be waited on at most once per signal.
///
/// A semaphore produced by a submission can retain the command stream and
/// the wait semaphores of that submission, tying their lifetimes together.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
    wait_stage: PipelineStage,
}

impl Semaphore {
    /// Create a new semaphore. Waits on it block all commands by default.
    pub fn new(device: &SharedDevice) -> Result<Self, SyncError> {
        let handle = device.create_semaphore()?;
        Ok(Self {
            inner: Arc::new(SemaphoreInner {
                device: Arc::clone(device),
                handle,
                retained: Mutex::new(Retained::default()),
            }),
            wait_stage: PipelineStage::ALL_COMMANDS,
        })
    }

    /// Raw device handle.
    pub fn handle(&self) -> SemaphoreHandle {
        self.inner.handle
    }

    /// Stage of the waiting submission that is blocked by this semaphore.
    pub fn wait_stage(&self) -> PipelineStage {
        self.wait_stage
    }

    /// Use a narrower wait stage for this handle.
    pub fn with_wait_stage(mut self, stage: PipelineStage) -> Self {
        self.wait_stage = stage;
        self
    }

    /// Description of a wait on this semaphore for a submission.
    pub fn as_wait(&self) -> SemaphoreWait {
        SemaphoreWait {
            semaphore: self.inner.handle,
            stage: self.wait_stage,
        }
    }

    /// Keep `stream` alive as long as this semaphore.
    pub fn retain_stream(&self, stream: CommandStream) {
        self.inner.retained.lock().streams.push(stream);
    }

    /// Keep other semaphores alive as long as this one.
    pub fn retain_semaphores(&self, semaphores: impl IntoIterator<Item = Semaphore>) {
        self.inner.retained.lock().semaphores.extend(semaphores);
    }
}

impl PartialEq for Semaphore {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle
    }
}

impl Eq for Semaphore {}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("handle", &self.inner.handle)
            .field("wait_stage", &self.wait_stage)
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DummyDevice, Submission};

    fn device() -> (Arc<DummyDevice>, SharedDevice) {
        let dummy = Arc::new(DummyDevice::new());
        let shared: SharedDevice = dummy.clone();
        (dummy, shared)
    }

    #[test]
    fn test_fence_signaled_on_creation() {
        let (_, device) = device();
        let fence = Fence::new(&device, true).unwrap();
        assert!(fence.is_signaled());
        assert!(fence.wait(Timeout::IMMEDIATE).unwrap());
    }

    #[test]
    fn test_fence_reset_and_submit() {
        let (dummy, device) = device();
        let fence = Fence::new(&device, true).unwrap();
        fence.reset().unwrap();
        assert!(!fence.is_signaled());

        device
            .queue_submit(
                DummyDevice::QUEUE,
                &Submission {
                    fence: Some(fence.handle()),
                    ..Default::default()
                },
            )
            .unwrap();
        fence.wait_until_signaled().unwrap();
        assert!(fence.is_signaled());
        assert_eq!(dummy.blocking_wait_count(), 1);
    }

    #[test]
    fn test_fence_clone_shares_state() {
        let (dummy, device) = device();
        let fence = Fence::new(&device, false).unwrap();
        let clone = fence.clone();
        assert_eq!(fence, clone);

        drop(fence);
        assert_eq!(dummy.live_fences(), 1);
        drop(clone);
        assert_eq!(dummy.live_fences(), 0);
    }

    #[test]
    fn test_semaphore_destroyed_with_last_clone() {
        let (dummy, device) = device();
        let semaphore = Semaphore::new(&device).unwrap();
        let narrowed = semaphore
            .clone()
            .with_wait_stage(PipelineStage::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(semaphore.wait_stage(), PipelineStage::ALL_COMMANDS);
        assert_eq!(
            narrowed.as_wait().stage,
            PipelineStage::COLOR_ATTACHMENT_OUTPUT
        );

        drop(semaphore);
        assert_eq!(dummy.live_semaphores(), 1);
        drop(narrowed);
        assert_eq!(dummy.live_semaphores(), 0);
    }

    #[test]
    fn test_semaphore_retains_stream_and_waits() {
        let (dummy, device) = device();
        let signal = Semaphore::new(&device).unwrap();
        let wait = Semaphore::new(&device).unwrap();
        let stream =
            CommandStream::allocate(&device, DummyDevice::QUEUE, Default::default()).unwrap();

        signal.retain_stream(stream);
        signal.retain_semaphores([wait]);
        assert_eq!(dummy.live_streams(), 1);
        assert_eq!(dummy.live_semaphores(), 2);

        drop(signal);
        assert_eq!(dummy.live_streams(), 0);
        assert_eq!(dummy.live_semaphores(), 0);
    }
}
