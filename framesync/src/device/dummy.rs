//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't execute anything. It tracks the state of every fence,
//! semaphore and command stream and records each call into an event log, so
//! tests can assert on the exact sequence of submissions and waits.
//!
//! Work is "executed" lazily: a fence passed to a submission stays unsignaled
//! until the host waits on it, the queue is drained, or
//! [`DummyDevice::complete_all`] is called. A host wait on a pending fence is
//! recorded with `blocked: true`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::barrier::BarrierBatch;
use crate::error::SyncError;
use crate::types::{QueueId, StreamUsage, Timeout};

use super::{
    AcquireOutcome, BufferHandle, FenceHandle, FenceStatus, GpuDevice, ImageCopy, ImageHandle,
    OutdatedSurface, PresentOutcome, PresentationEngine, SemaphoreHandle, StreamHandle,
    Submission,
};

/// A call observed by [`DummyDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    CreateFence {
        fence: FenceHandle,
        signaled: bool,
    },
    DestroyFence(FenceHandle),
    /// A host wait. `blocked` is true if the fence was not yet signaled.
    WaitFence {
        fence: FenceHandle,
        blocked: bool,
    },
    ResetFence(FenceHandle),
    CreateSemaphore(SemaphoreHandle),
    DestroySemaphore(SemaphoreHandle),
    AllocateStream {
        stream: StreamHandle,
        queue: QueueId,
    },
    FreeStream(StreamHandle),
    BeginStream(StreamHandle),
    EndStream(StreamHandle),
    Barrier {
        stream: StreamHandle,
        global: usize,
        image: usize,
        buffer: usize,
    },
    FillBuffer {
        stream: StreamHandle,
        buffer: BufferHandle,
    },
    CopyImage {
        stream: StreamHandle,
        src: ImageHandle,
        dst: ImageHandle,
    },
    Submit {
        queue: QueueId,
        streams: Vec<StreamHandle>,
        waits: Vec<SemaphoreHandle>,
        signals: Vec<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    },
    QueueWaitIdle(QueueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    /// Submitted; carries the submission sequence number.
    Pending(u64),
    Signaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug, Default)]
struct DummyState {
    fences: HashMap<FenceHandle, FenceState>,
    semaphores: Vec<SemaphoreHandle>,
    streams: HashMap<StreamHandle, StreamState>,
    events: Vec<DeviceEvent>,
    submissions: u64,
    failing_allocations: u32,
    failing_submissions: u32,
}

impl DummyState {
    /// Complete every submission up to and including `sequence`.
    fn complete_through(&mut self, sequence: u64) {
        for state in self.fences.values_mut() {
            if let FenceState::Pending(seq) = *state
                && seq <= sequence
            {
                *state = FenceState::Signaled;
            }
        }
    }

    fn complete_pending(&mut self) {
        self.complete_through(u64::MAX);
    }
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    state: Mutex<DummyState>,
    next_handle: AtomicU64,
    transfer_queue: Option<QueueId>,
}

impl DummyDevice {
    /// The graphics queue, always present.
    pub const QUEUE: QueueId = QueueId(0);
    /// The dedicated transfer queue of [`with_transfer_queue`](Self::with_transfer_queue).
    pub const TRANSFER_QUEUE: QueueId = QueueId(1);

    /// Create a dummy device with a single queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState::default()),
            next_handle: AtomicU64::new(1),
            transfer_queue: None,
        }
    }

    /// Create a dummy device with a dedicated transfer queue.
    pub fn with_transfer_queue() -> Self {
        Self {
            transfer_queue: Some(Self::TRANSFER_QUEUE),
            ..Self::new()
        }
    }

    /// Make the next `count` command stream allocations fail with
    /// [`SyncError::OutOfMemory`].
    pub fn fail_stream_allocations(&self, count: u32) {
        self.state.lock().failing_allocations = count;
    }

    /// Make the next `count` queue submissions fail with
    /// [`SyncError::OutOfMemory`] before anything is submitted.
    pub fn fail_submissions(&self, count: u32) {
        self.state.lock().failing_submissions = count;
    }

    fn has_queue(&self, queue: QueueId) -> bool {
        queue == Self::QUEUE || self.transfer_queue == Some(queue)
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Let the "GPU" finish every submitted piece of work.
    pub fn complete_all(&self) {
        self.state.lock().complete_pending();
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.clone()
    }

    /// Forget recorded events. Object state is kept.
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Number of queue submissions recorded.
    pub fn submit_count(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Submit { .. }))
    }

    /// Number of queue idle waits recorded.
    pub fn wait_idle_count(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::QueueWaitIdle(_)))
    }

    /// Number of host waits that had to block on unfinished work.
    pub fn blocking_wait_count(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::WaitFence { blocked: true, .. }))
    }

    /// Number of command streams allocated so far.
    pub fn allocated_stream_count(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::AllocateStream { .. }))
    }

    /// Number of semaphores created so far.
    pub fn created_semaphore_count(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::CreateSemaphore(_)))
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn live_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Whether the fence is currently signaled.
    pub fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state.lock().fences.get(&fence) == Some(&FenceState::Signaled)
    }

    fn count(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn graphics_queue(&self) -> QueueId {
        Self::QUEUE
    }

    fn transfer_queue(&self) -> QueueId {
        self.transfer_queue.unwrap_or(Self::QUEUE)
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, SyncError> {
        let fence = FenceHandle::from_raw(self.next_raw());
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        let mut state = self.state.lock();
        state.fences.insert(fence, initial);
        state.events.push(DeviceEvent::CreateFence { fence, signaled });
        log::trace!("DummyDevice: created fence {fence:?} (signaled: {signaled})");
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        state.events.push(DeviceEvent::DestroyFence(fence));
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Timeout) -> Result<bool, SyncError> {
        let mut state = self.state.lock();
        let current = *state
            .fences
            .get(&fence)
            .ok_or_else(|| SyncError::InvalidParameter(format!("unknown fence {fence:?}")))?;

        match current {
            FenceState::Signaled => {
                state.events.push(DeviceEvent::WaitFence {
                    fence,
                    blocked: false,
                });
                Ok(true)
            }
            FenceState::Pending(sequence) => {
                // Queue order is execution order: earlier work finishes first.
                state.complete_through(sequence);
                state.events.push(DeviceEvent::WaitFence {
                    fence,
                    blocked: true,
                });
                Ok(true)
            }
            FenceState::Unsignaled => {
                state.events.push(DeviceEvent::WaitFence {
                    fence,
                    blocked: true,
                });
                if timeout.is_infinite() {
                    Err(SyncError::Internal(format!(
                        "fence {fence:?} was never submitted; waiting on it would block forever"
                    )))
                } else {
                    Ok(false)
                }
            }
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        match state.fences.get_mut(&fence) {
            Some(FenceState::Pending(_)) => {
                return Err(SyncError::InvalidParameter(format!(
                    "fence {fence:?} is still in use by a submission"
                )));
            }
            Some(s) => *s = FenceState::Unsignaled,
            None => {
                return Err(SyncError::InvalidParameter(format!("unknown fence {fence:?}")));
            }
        }
        state.events.push(DeviceEvent::ResetFence(fence));
        Ok(())
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, SyncError> {
        match self.state.lock().fences.get(&fence) {
            Some(FenceState::Signaled) => Ok(FenceStatus::Signaled),
            Some(_) => Ok(FenceStatus::Unsignaled),
            None => Err(SyncError::InvalidParameter(format!("unknown fence {fence:?}"))),
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, SyncError> {
        let semaphore = SemaphoreHandle::from_raw(self.next_raw());
        let mut state = self.state.lock();
        state.semaphores.push(semaphore);
        state.events.push(DeviceEvent::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state.lock();
        state.semaphores.retain(|s| *s != semaphore);
        state.events.push(DeviceEvent::DestroySemaphore(semaphore));
    }

    fn allocate_command_stream(
        &self,
        queue: QueueId,
        usage: StreamUsage,
    ) -> Result<StreamHandle, SyncError> {
        if !self.has_queue(queue) {
            return Err(SyncError::InvalidParameter(format!(
                "dummy device has no queue {}",
                queue.index()
            )));
        }
        let mut state = self.state.lock();
        if state.failing_allocations > 0 {
            state.failing_allocations -= 1;
            return Err(SyncError::OutOfMemory);
        }
        let stream = StreamHandle::from_raw(self.next_raw());
        state.streams.insert(stream, StreamState::Initial);
        state
            .events
            .push(DeviceEvent::AllocateStream { stream, queue });
        log::trace!("DummyDevice: allocated {usage:?} stream {stream:?}");
        Ok(stream)
    }

    fn free_command_stream(&self, _queue: QueueId, stream: StreamHandle) {
        let mut state = self.state.lock();
        state.streams.remove(&stream);
        state.events.push(DeviceEvent::FreeStream(stream));
    }

    fn begin_command_stream(
        &self,
        stream: StreamHandle,
        _usage: StreamUsage,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        match state.streams.get_mut(&stream) {
            Some(s) if *s != StreamState::Recording => *s = StreamState::Recording,
            Some(_) => {
                return Err(SyncError::InvalidStreamState(format!(
                    "stream {stream:?} is already recording"
                )));
            }
            None => {
                return Err(SyncError::InvalidParameter(format!(
                    "unknown stream {stream:?}"
                )));
            }
        }
        state.events.push(DeviceEvent::BeginStream(stream));
        Ok(())
    }

    fn end_command_stream(&self, stream: StreamHandle) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        match state.streams.get_mut(&stream) {
            Some(s) if *s == StreamState::Recording => *s = StreamState::Executable,
            Some(_) => {
                return Err(SyncError::InvalidStreamState(format!(
                    "stream {stream:?} is not recording"
                )));
            }
            None => {
                return Err(SyncError::InvalidParameter(format!(
                    "unknown stream {stream:?}"
                )));
            }
        }
        state.events.push(DeviceEvent::EndStream(stream));
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, stream: StreamHandle, batch: &BarrierBatch) {
        self.state.lock().events.push(DeviceEvent::Barrier {
            stream,
            global: batch.global_barriers().len(),
            image: batch.image_barriers().count(),
            buffer: batch.buffer_barriers().len(),
        });
    }

    fn cmd_fill_buffer(
        &self,
        stream: StreamHandle,
        buffer: BufferHandle,
        _offset: u64,
        _size: u64,
        _data: u32,
    ) {
        self.state
            .lock()
            .events
            .push(DeviceEvent::FillBuffer { stream, buffer });
    }

    fn cmd_copy_image(&self, stream: StreamHandle, copy: &ImageCopy) {
        self.state.lock().events.push(DeviceEvent::CopyImage {
            stream,
            src: copy.src,
            dst: copy.dst,
        });
    }

    fn queue_submit(&self, queue: QueueId, submission: &Submission<'_>) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(SyncError::OutOfMemory);
        }

        for stream in submission.streams {
            if state.streams.get(stream) != Some(&StreamState::Executable) {
                return Err(SyncError::InvalidStreamState(format!(
                    "stream {stream:?} submitted without being ended"
                )));
            }
        }

        state.submissions += 1;
        let sequence = state.submissions;
        if let Some(fence) = submission.fence {
            match state.fences.get_mut(&fence) {
                Some(s) if *s == FenceState::Unsignaled => *s = FenceState::Pending(sequence),
                Some(_) => {
                    return Err(SyncError::InvalidParameter(format!(
                        "fence {fence:?} submitted while signaled or pending"
                    )));
                }
                None => {
                    return Err(SyncError::InvalidParameter(format!(
                        "unknown fence {fence:?}"
                    )));
                }
            }
        }

        state.events.push(DeviceEvent::Submit {
            queue,
            streams: submission.streams.to_vec(),
            waits: submission.waits.iter().map(|w| w.semaphore).collect(),
            signals: submission.signals.to_vec(),
            fence: submission.fence,
        });
        log::trace!(
            "DummyDevice: submit {} streams on queue {}",
            submission.streams.len(),
            queue.index()
        );
        Ok(())
    }

    fn queue_wait_idle(&self, queue: QueueId) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        state.complete_pending();
        state.events.push(DeviceEvent::QueueWaitIdle(queue));
        Ok(())
    }
}

/// Marker object standing in for the resources of a replaced surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummySurface {
    pub generation: u32,
}

/// Scripted presentation engine.
///
/// Acquire and present results are taken from queues filled by the test.
/// Once a script runs dry, images are handed out round-robin and presents
/// succeed.
#[derive(Debug)]
pub struct DummyPresentation {
    image_count: usize,
    next_image: usize,
    generation: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    image_count_after_recreate: Option<usize>,
    acquired: Vec<u32>,
    presented: Vec<u32>,
    recreations: u32,
}

impl DummyPresentation {
    /// Create a presentation engine with `image_count` images.
    pub fn new(image_count: usize) -> Self {
        Self {
            image_count,
            next_image: 0,
            generation: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            image_count_after_recreate: None,
            acquired: Vec::new(),
            presented: Vec::new(),
            recreations: 0,
        }
    }

    /// Queue acquire results.
    pub fn script_acquire(&mut self, outcomes: impl IntoIterator<Item = AcquireOutcome>) {
        self.acquire_script.extend(outcomes);
    }

    /// Queue present results.
    pub fn script_present(&mut self, outcomes: impl IntoIterator<Item = PresentOutcome>) {
        self.present_script.extend(outcomes);
    }

    /// Change the image count at the next recreation.
    pub fn set_image_count_after_recreate(&mut self, count: usize) {
        self.image_count_after_recreate = Some(count);
    }

    /// Image indices handed out so far.
    pub fn acquired(&self) -> &[u32] {
        &self.acquired
    }

    /// Image indices presented so far.
    pub fn presented(&self) -> &[u32] {
        &self.presented
    }

    /// Number of times the surface has been recreated.
    pub fn recreations(&self) -> u32 {
        self.recreations
    }
}

impl PresentationEngine for DummyPresentation {
    fn image_count(&self) -> usize {
        self.image_count
    }

    fn acquire_next_image(
        &mut self,
        _signal: SemaphoreHandle,
        _timeout: Timeout,
    ) -> Result<AcquireOutcome, SyncError> {
        let outcome = self.acquire_script.pop_front().unwrap_or_else(|| {
            let index = self.next_image % self.image_count.max(1);
            self.next_image = index + 1;
            AcquireOutcome::Ready(index as u32)
        });
        if let AcquireOutcome::Ready(index) | AcquireOutcome::Suboptimal(index) = outcome {
            self.acquired.push(index);
        }
        Ok(outcome)
    }

    fn present(
        &mut self,
        _queue: QueueId,
        _waits: &[SemaphoreHandle],
        image_index: u32,
    ) -> Result<PresentOutcome, SyncError> {
        self.presented.push(image_index);
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Optimal))
    }

    fn recreate(&mut self) -> Result<Option<OutdatedSurface>, SyncError> {
        let outdated = DummySurface {
            generation: self.generation,
        };
        self.generation += 1;
        self.recreations += 1;
        if let Some(count) = self.image_count_after_recreate.take() {
            self.image_count = count;
        }
        self.next_image = 0;
        log::trace!(
            "DummyPresentation: recreated surface (generation {})",
            self.generation
        );
        Ok(Some(Box::new(outdated)))
    }
}
