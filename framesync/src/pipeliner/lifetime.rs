//! Frame-scoped ownership shared between the pipeliner and sync strategies.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::command::CommandStream;
use crate::primitives::Semaphore;
use crate::reaper::{DeferredReaper, DeferredResource};
use crate::types::{FrameId, QueueId};

/// The current frame counter, the deferred reaper and pending present
/// dependencies.
///
/// Sync strategies created with
/// [`with_barriers_on_current_frame`](crate::sync::SyncStrategy::with_barriers_on_current_frame)
/// or
/// [`with_semaphore_to_present_dependency`](crate::sync::SyncStrategy::with_semaphore_to_present_dependency)
/// hold an `Arc` to this.
pub struct FrameLifetime {
    current_frame: AtomicI64,
    queue: QueueId,
    reaper: DeferredReaper,
    present_dependencies: Mutex<Vec<(FrameId, Semaphore)>>,
}

impl FrameLifetime {
    pub(crate) fn new(frames_in_flight: usize, queue: QueueId) -> Self {
        Self {
            current_frame: AtomicI64::new(0),
            queue,
            reaper: DeferredReaper::new(frames_in_flight),
            present_dependencies: Mutex::new(Vec::new()),
        }
    }

    /// Id of the frame being recorded.
    pub fn current_frame(&self) -> FrameId {
        self.current_frame.load(Ordering::Acquire)
    }

    /// Queue the frames are submitted to.
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn frames_in_flight(&self) -> usize {
        self.reaper.frames_in_flight()
    }

    pub fn reaper(&self) -> &DeferredReaper {
        &self.reaper
    }

    /// Keep `resource` alive until `frame` (the current frame if `None`) has
    /// completed.
    pub fn tag_for_deferred_release(
        &self,
        resource: impl Into<DeferredResource>,
        frame: Option<FrameId>,
    ) {
        let frame = frame.unwrap_or_else(|| self.current_frame());
        self.reaper.tag(resource, frame);
    }

    /// Make the present of `frame` (the current frame if `None`) wait on
    /// `semaphore`.
    ///
    /// The semaphore is released through the reaper once that frame has
    /// completed.
    pub fn add_present_dependency(&self, semaphore: Semaphore, frame: Option<FrameId>) {
        let frame = frame.unwrap_or_else(|| self.current_frame());
        self.present_dependencies.lock().push((frame, semaphore));
    }

    /// Handoff that keeps a submitted stream alive until the current frame
    /// has completed.
    ///
    /// The frame is read when the handoff runs, not when it is created.
    pub fn stream_lifetime_handler(
        self: &Arc<Self>,
    ) -> impl FnOnce(CommandStream) + Send + 'static {
        let lifetime = Arc::clone(self);
        move |stream| lifetime.tag_for_deferred_release(stream, None)
    }

    /// Remove and return the dependencies of frames up to `frame`.
    pub(crate) fn take_present_dependencies_up_to(&self, frame: FrameId) -> Vec<Semaphore> {
        let mut dependencies = self.present_dependencies.lock();
        let mut taken = Vec::new();
        dependencies.retain(|(dependency_frame, semaphore)| {
            if *dependency_frame <= frame {
                taken.push(semaphore.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Put back dependencies taken for a frame that failed to submit.
    pub(crate) fn restore_present_dependencies(&self, frame: FrameId, semaphores: Vec<Semaphore>) {
        self.present_dependencies
            .lock()
            .extend(semaphores.into_iter().map(|semaphore| (frame, semaphore)));
    }

        pub(crate) fn pending_present_dependencies(&self) -> usize {
        self.present_dependencies.lock().len()
    }

    /// Move on to the next frame. Returns the new frame id.
    pub(crate) fn advance(&self) -> FrameId {
        self.current_frame.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl fmt::Debug for FrameLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLifetime")
            .field("current_frame", &self.current_frame())
            .field("queue", &self.queue)
            .field("reaper", &self.reaper)
            .field(
                "present_dependencies",
                &self.pending_present_dependencies(),
            )
            .finish()
    }
}

static_assertions::assert_impl_all!(FrameLifetime: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DummyDevice, SharedDevice};
    use crate::reaper::ResourceCategory;

    #[test]
    fn test_present_dependencies_split_by_frame() {
        let device: SharedDevice = Arc::new(DummyDevice::new());
        let lifetime = FrameLifetime::new(2, DummyDevice::QUEUE);
        lifetime.add_present_dependency(Semaphore::new(&device).unwrap(), None);
        lifetime.add_present_dependency(Semaphore::new(&device).unwrap(), Some(3));

        assert_eq!(lifetime.take_present_dependencies_up_to(0).len(), 1);
        assert_eq!(lifetime.take_present_dependencies_up_to(2).len(), 0);
        assert_eq!(lifetime.take_present_dependencies_up_to(3).len(), 1);
        assert_eq!(lifetime.pending_present_dependencies(), 0);
    }

    #[test]
    fn test_stream_handler_tags_at_handoff_frame() {
        let device: SharedDevice = Arc::new(DummyDevice::new());
        let lifetime = Arc::new(FrameLifetime::new(1, DummyDevice::QUEUE));
        let handler = lifetime.stream_lifetime_handler();

        lifetime.advance();
        lifetime.advance();
        handler(CommandStream::allocate(&device, DummyDevice::QUEUE, Default::default()).unwrap());

        let reaper = lifetime.reaper();
        assert_eq!(reaper.pending_in(ResourceCategory::CommandStreams), 1);
        assert_eq!(reaper.reap(2), 0);
        assert_eq!(reaper.reap(3), 1);
    }
}
