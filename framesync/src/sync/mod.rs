//! Sync strategies: how an operation's GPU work is ordered against the work
//! around it.
//!
//! Operations that record GPU commands (buffer fills, layout transitions,
//! copies, ...) take a [`SyncStrategy`] by value. The strategy hides which
//! synchronization mechanism is used behind three calls the operation makes:
//!
//! 1. [`SyncStrategy::establish_barrier_before`] before recording its commands
//! 2. [`SyncStrategy::establish_barrier_after`] after recording them
//! 3. [`SyncStrategy::submit_and_sync`] to finish
//!
//! # Modes
//!
//! | Factory | Stream | On submit |
//! |---------|--------|-----------|
//! | [`not_required`](SyncStrategy::not_required) | never created | logic error |
//! | [`wait_idle`](SyncStrategy::wait_idle) | owned | submit, then block until the queue is idle |
//! | [`with_semaphores`](SyncStrategy::with_semaphores) | owned | full barrier, submit signaling a new semaphore, hand it off |
//! | [`with_barriers`](SyncStrategy::with_barriers) | owned | submit, hand the stream off |
//! | [`with_barriers_by_return`](SyncStrategy::with_barriers_by_return) | owned | end, return the stream unsubmitted |
//! | [`auxiliary_with_barriers`](SyncStrategy::auxiliary_with_barriers) | master's | nothing, the master submits |
//!
//! The command stream is created lazily, the first time something has to be
//! recorded into it, and starts recording immediately.
//!
//! # Auxiliary strategies
//!
//! Several operations can share one stream and one submission. The master
//! strategy is passed to each operation through an auxiliary, and finally
//! submitted itself:
//!
//! ```ignore
//! let mut master = SyncStrategy::with_barriers_on_current_frame(
//!     &lifetime,
//!     Some(handlers::default_before()),
//!     Some(handlers::default_after()),
//! );
//! for (buffer, size) in uploads {
//!     let aux = SyncStrategy::auxiliary_with_barriers(
//!         &mut master,
//!         &device,
//!         HandlerRequest::StealOnDemand,
//!         HandlerRequest::None,
//!     )?;
//!     ops::fill_buffer(&device, buffer, 0, size, 0, aux)?;
//! }
//! master.submit_and_sync(&device)?;
//! ```
//!
//! A stolen handler lives in exactly one place at a time, so it fires at most
//! once no matter whether the master or an auxiliary reaches it first.

pub mod handlers;
pub mod presets;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

pub use handlers::{
    AfterHandler, BeforeHandler, HandlerRequest, SemaphoreHandoff, StreamHandoff,
};

use crate::command::CommandStream;
use crate::device::{SemaphoreWait, SharedDevice, Submission};
use crate::error::SyncError;
use crate::pipeliner::FrameLifetime;
use crate::primitives::Semaphore;
use crate::types::{
    FrameId, MemoryAccess, PipelineStage, QueueId, ReadAccess, StreamUsage, WriteAccess,
};

type StreamSlot = Arc<Mutex<Option<CommandStream>>>;
type HandlerSlot<H> = Arc<Mutex<Option<H>>>;

enum BarrierOwnership {
    /// This strategy submits its stream and hands it off.
    Owned(StreamHandoff),
    /// The stream belongs to a master strategy.
    Auxiliary,
}

enum SyncMode {
    NotRequired,
    WaitIdle {
        deliberate: bool,
    },
    ViaSemaphore {
        handoff: SemaphoreHandoff,
        wait_before: Vec<Semaphore>,
    },
    ViaBarrier(BarrierOwnership),
    ByReturn,
    Consumed,
}

/// Observable mode of a [`SyncStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncType {
    NotRequired,
    WaitIdle,
    ViaSemaphore,
    ViaBarrier,
    AuxiliaryBarrier,
    ByReturn,
    /// `submit_and_sync` has completed.
    Submitted,
}

/// How the GPU work of one operation is synchronized.
///
/// Consumed by exactly one `submit_and_sync`. See the [module docs](self).
pub struct SyncStrategy {
    mode: SyncMode,
    auxiliary: bool,
    stream: StreamSlot,
    stream_usage: StreamUsage,
    before: HandlerSlot<BeforeHandler>,
    after: HandlerSlot<AfterHandler>,
    queue: Option<QueueId>,
    queue_hint: Option<QueueId>,
}

impl SyncStrategy {
    fn with_mode(
        mode: SyncMode,
        before: Option<BeforeHandler>,
        after: Option<AfterHandler>,
    ) -> Self {
        Self {
            mode,
            auxiliary: false,
            stream: Arc::new(Mutex::new(None)),
            stream_usage: StreamUsage::SingleUse,
            before: Arc::new(Mutex::new(before)),
            after: Arc::new(Mutex::new(after)),
            queue: None,
            queue_hint: None,
        }
    }

    /// The caller guarantees no ordering is needed.
    ///
    /// Establishing barriers is a no-op and no command stream is ever
    /// created. Submitting is a logic error.
    pub fn not_required() -> Self {
        Self::with_mode(SyncMode::NotRequired, None, None)
    }

    /// Submit and block until the queue is idle.
    ///
    /// Always correct, but serializes the whole queue. Logs a warning on
    /// every submit; use [`wait_idle_deliberately`](Self::wait_idle_deliberately)
    /// where this is intended, such as at initialization.
    pub fn wait_idle() -> Self {
        Self::with_mode(SyncMode::WaitIdle { deliberate: false }, None, None)
    }

    /// Same as [`wait_idle`](Self::wait_idle), without the warning.
    pub fn wait_idle_deliberately() -> Self {
        Self::with_mode(SyncMode::WaitIdle { deliberate: true }, None, None)
    }

    /// Wait on `wait_before` and signal a new semaphore, passed to `handoff`
    /// after submission.
    ///
    /// A full memory barrier is recorded at the end of the stream, so the
    /// semaphore stands for the completion of everything recorded.
    pub fn with_semaphores<F>(handoff: F, wait_before: Vec<Semaphore>) -> Self
    where
        F: FnOnce(Semaphore) + Send + 'static,
    {
        Self::with_mode(
            SyncMode::ViaSemaphore {
                handoff: Box::new(handoff),
                wait_before,
            },
            None,
            None,
        )
    }

    /// Order through pipeline barriers recorded by `before` and `after`, and
    /// hand the submitted stream to `handoff`.
    ///
    /// Pass [`handlers::default_before`] and [`handlers::default_after`] when
    /// the surrounding work is unknown.
    pub fn with_barriers<F>(
        handoff: F,
        before: Option<BeforeHandler>,
        after: Option<AfterHandler>,
    ) -> Self
    where
        F: FnOnce(CommandStream) + Send + 'static,
    {
        Self::with_mode(
            SyncMode::ViaBarrier(BarrierOwnership::Owned(Box::new(handoff))),
            before,
            after,
        )
    }

    /// Like [`with_barriers`](Self::with_barriers), but `submit_and_sync`
    /// returns the ended stream instead of submitting it.
    pub fn with_barriers_by_return(
        before: Option<BeforeHandler>,
        after: Option<AfterHandler>,
    ) -> Self {
        Self::with_mode(SyncMode::ByReturn, before, after)
    }

    /// Barrier strategy whose submitted stream is kept alive until the
    /// current frame has completed.
    ///
    /// Submits to the pipeliner's queue, since only work on that queue is
    /// covered by the frame's fence.
    pub fn with_barriers_on_current_frame(
        lifetime: &Arc<FrameLifetime>,
        before: Option<BeforeHandler>,
        after: Option<AfterHandler>,
    ) -> Self {
        Self::with_barriers(lifetime.stream_lifetime_handler(), before, after)
            .on_queue(lifetime.queue())
    }

    /// Semaphore strategy whose semaphore must be signaled before the
    /// presentation of `frame` (the current frame if `None`).
    pub fn with_semaphore_to_present_dependency(
        lifetime: &Arc<FrameLifetime>,
        wait_before: Vec<Semaphore>,
        frame: Option<FrameId>,
    ) -> Self {
        let lifetime = Arc::clone(lifetime);
        Self::with_semaphores(
            move |semaphore| lifetime.add_present_dependency(semaphore, frame),
            wait_before,
        )
    }

    /// Record into the command stream of `master` instead of an own one.
    ///
    /// The master must be a barrier strategy. Its stream is created now if
    /// it does not exist yet. Submitting the auxiliary does nothing; the
    /// master submits the shared stream.
    pub fn auxiliary_with_barriers(
        master: &mut SyncStrategy,
        device: &SharedDevice,
        before: HandlerRequest<BeforeHandler>,
        after: HandlerRequest<AfterHandler>,
    ) -> Result<SyncStrategy, SyncError> {
        match master.mode {
            SyncMode::ViaBarrier(_) | SyncMode::ByReturn => {}
            SyncMode::Consumed => return Err(SyncError::AlreadySubmitted),
            _ => {
                return Err(SyncError::InvalidParameter(format!(
                    "auxiliary strategies need a barrier master, got {:?}",
                    master.sync_type()
                )));
            }
        }
        master.with_command_stream(device, |_| ())?;

        let before = resolve_request(before, &master.before, |slot| {
            handlers::before(move |stream, stage, access| {
                let stolen = slot.lock().take();
                if let Some(handler) = stolen {
                    handler(stream, stage, access);
                }
            })
        });
        let after = resolve_request(after, &master.after, |slot| {
            handlers::after(move |stream, stage, access| {
                let stolen = slot.lock().take();
                if let Some(handler) = stolen {
                    handler(stream, stage, access);
                }
            })
        });

        Ok(Self {
            mode: SyncMode::ViaBarrier(BarrierOwnership::Auxiliary),
            auxiliary: true,
            stream: Arc::clone(&master.stream),
            stream_usage: master.stream_usage,
            before: Arc::new(Mutex::new(before)),
            after: Arc::new(Mutex::new(after)),
            // Auxiliaries never submit.
            queue: None,
            queue_hint: None,
        })
    }

    /// Submit to `queue` regardless of what the operation suggests.
    pub fn on_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Allocate a stream that may be submitted more than once.
    pub fn create_reusable_command_stream(mut self) -> Self {
        self.stream_usage = StreamUsage::Reusable;
        self
    }

    /// Allocate a stream for one submission (the default).
    pub fn create_single_use_command_stream(mut self) -> Self {
        self.stream_usage = StreamUsage::SingleUse;
        self
    }

    /// Queue suggested by the operation, used when none was set explicitly.
    pub fn set_queue_hint(&mut self, queue: QueueId) {
        self.queue_hint = Some(queue);
    }

    /// The explicit queue, else the operation's hint, else the graphics queue.
    pub fn queue_to_use(&self, device: &SharedDevice) -> QueueId {
        if let Some(queue) = self.queue {
            return queue;
        }
        if let Some(queue) = self.queue_hint {
            log::trace!(
                "No queue specified, using queue {} suggested by the operation",
                queue.index()
            );
            return queue;
        }
        log::trace!("No queue specified, using the graphics queue");
        device.graphics_queue()
    }

    pub fn sync_type(&self) -> SyncType {
        match &self.mode {
            SyncMode::NotRequired => SyncType::NotRequired,
            SyncMode::WaitIdle { .. } => SyncType::WaitIdle,
            SyncMode::ViaSemaphore { .. } => SyncType::ViaSemaphore,
            SyncMode::ViaBarrier(BarrierOwnership::Owned(_)) => SyncType::ViaBarrier,
            SyncMode::ViaBarrier(BarrierOwnership::Auxiliary) => SyncType::AuxiliaryBarrier,
            SyncMode::ByReturn => SyncType::ByReturn,
            SyncMode::Consumed => SyncType::Submitted,
        }
    }

    /// Whether a command stream has been created and not yet submitted.
    pub fn has_command_stream(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Run `f` with the recording command stream, creating it first if
    /// needed.
    pub fn with_command_stream<R>(
        &mut self,
        device: &SharedDevice,
        f: impl FnOnce(&mut CommandStream) -> R,
    ) -> Result<R, SyncError> {
        match self.mode {
            SyncMode::Consumed => return Err(SyncError::AlreadySubmitted),
            SyncMode::NotRequired => return Err(SyncError::SyncNotRequired),
            _ => {}
        }

        let mut slot = self.stream.lock();
        if let Some(stream) = slot.as_mut() {
            return Ok(f(stream));
        }
        if self.auxiliary {
            // The master has already submitted the shared stream.
            return Err(SyncError::NoCommandStream);
        }

        let queue = self.queue_to_use(device);
        let mut stream = CommandStream::allocate(device, queue, self.stream_usage)?;
        stream.begin()?;
        let stream = slot.insert(stream);
        Ok(f(stream))
    }

    /// Record the dependency of the operation on earlier work.
    ///
    /// Fires the before handler once; later calls are no-ops.
    pub fn establish_barrier_before(
        &mut self,
        device: &SharedDevice,
        dst_stage: PipelineStage,
        dst_access: Option<ReadAccess>,
    ) -> Result<(), SyncError> {
        if matches!(self.mode, SyncMode::Consumed) {
            return Err(SyncError::AlreadySubmitted);
        }
        if self.before.lock().is_none() {
            return Ok(());
        }
        // A failed allocation leaves the handler in place.
        let slot = Arc::clone(&self.before);
        self.with_command_stream(device, |stream| {
            let handler = slot.lock().take();
            if let Some(handler) = handler {
                handler(stream, dst_stage, dst_access);
            }
        })
    }

    /// Record the dependency of later work on the operation.
    ///
    /// Fires the after handler once; later calls are no-ops.
    pub fn establish_barrier_after(
        &mut self,
        device: &SharedDevice,
        src_stage: PipelineStage,
        src_access: Option<WriteAccess>,
    ) -> Result<(), SyncError> {
        if matches!(self.mode, SyncMode::Consumed) {
            return Err(SyncError::AlreadySubmitted);
        }
        if self.after.lock().is_none() {
            return Ok(());
        }
        // A failed allocation leaves the handler in place.
        let slot = Arc::clone(&self.after);
        self.with_command_stream(device, |stream| {
            let handler = slot.lock().take();
            if let Some(handler) = handler {
                handler(stream, src_stage, src_access);
            }
        })
    }

    fn take_stream(&self) -> Option<CommandStream> {
        self.stream.lock().take()
    }

    /// Finish the operation according to the strategy's mode.
    ///
    /// Returns the ended stream for by-return strategies and `None`
    /// otherwise. A strategy can only be submitted once.
    pub fn submit_and_sync(
        &mut self,
        device: &SharedDevice,
    ) -> Result<Option<CommandStream>, SyncError> {
        profile_function!();
        let queue = self.queue_to_use(device);

        match std::mem::replace(&mut self.mode, SyncMode::Consumed) {
            SyncMode::Consumed => Err(SyncError::AlreadySubmitted),
            SyncMode::NotRequired => {
                self.mode = SyncMode::NotRequired;
                log::error!(
                    "Sync was declared not required, but the operation has to be synchronized"
                );
                Err(SyncError::SyncNotRequired)
            }
            SyncMode::ViaSemaphore {
                handoff,
                wait_before,
            } => {
                let Some(mut stream) = self.take_stream() else {
                    self.mode = SyncMode::ViaSemaphore {
                        handoff,
                        wait_before,
                    };
                    return Err(SyncError::NoCommandStream);
                };
                stream.establish_global_memory_barrier(
                    PipelineStage::ALL_COMMANDS,
                    PipelineStage::ALL_COMMANDS,
                    Some(MemoryAccess::ANY),
                    Some(MemoryAccess::ANY),
                );
                stream.end()?;

                let semaphore = Semaphore::new(device)?;
                let waits: Vec<SemaphoreWait> =
                    wait_before.iter().map(Semaphore::as_wait).collect();
                let streams = [stream.handle()];
                let signals = [semaphore.handle()];
                device.queue_submit(
                    queue,
                    &Submission {
                        streams: &streams,
                        waits: &waits,
                        signals: &signals,
                        fence: None,
                    },
                )?;
                stream.mark_submitted();

                semaphore.retain_stream(stream);
                semaphore.retain_semaphores(wait_before);
                handoff(semaphore);
                Ok(None)
            }
            SyncMode::ViaBarrier(BarrierOwnership::Owned(handoff)) => {
                let Some(mut stream) = self.take_stream() else {
                    self.mode = SyncMode::ViaBarrier(BarrierOwnership::Owned(handoff));
                    return Err(SyncError::NoCommandStream);
                };
                stream.end()?;
                let streams = [stream.handle()];
                device.queue_submit(
                    queue,
                    &Submission {
                        streams: &streams,
                        ..Default::default()
                    },
                )?;
                stream.mark_submitted();
                handoff(stream);
                Ok(None)
            }
            // The master submits the shared stream.
            SyncMode::ViaBarrier(BarrierOwnership::Auxiliary) => Ok(None),
            SyncMode::WaitIdle { deliberate } => {
                let Some(mut stream) = self.take_stream() else {
                    self.mode = SyncMode::WaitIdle { deliberate };
                    return Err(SyncError::NoCommandStream);
                };
                if !deliberate {
                    log::warn!(
                        "Performing wait_idle on queue {} because no other sync strategy was given",
                        queue.index()
                    );
                }
                stream.end()?;
                let streams = [stream.handle()];
                device.queue_submit(
                    queue,
                    &Submission {
                        streams: &streams,
                        ..Default::default()
                    },
                )?;
                stream.mark_submitted();
                device.queue_wait_idle(queue)?;
                Ok(None)
            }
            SyncMode::ByReturn => {
                let Some(mut stream) = self.take_stream() else {
                    self.mode = SyncMode::ByReturn;
                    return Err(SyncError::NoCommandStream);
                };
                stream.end()?;
                Ok(Some(stream))
            }
        }
    }
}

fn resolve_request<H>(
    request: HandlerRequest<H>,
    master: &HandlerSlot<H>,
    forward: impl FnOnce(HandlerSlot<H>) -> H,
) -> Option<H> {
    match request {
        HandlerRequest::None => None,
        HandlerRequest::Custom(handler) => Some(handler),
        HandlerRequest::StealOnDemand => Some(forward(Arc::clone(master))),
        HandlerRequest::StealImmediately => master.lock().take(),
    }
}

impl Drop for SyncStrategy {
    fn drop(&mut self) {
        if !self.auxiliary && self.stream.lock().is_some() {
            if matches!(self.mode, SyncMode::ByReturn) {
                log::error!(
                    "Sync was requested by return, but the command stream has not been fetched"
                );
            } else {
                log::error!(
                    "Command stream has not been submitted but the sync strategy is dropped"
                );
            }
        }
        if self.before.lock().is_some() {
            log::debug!("The before-operation barrier handler of a sync strategy was never invoked");
        }
        if self.after.lock().is_some() {
            log::debug!("The after-operation barrier handler of a sync strategy was never invoked");
        }
    }
}

impl fmt::Debug for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStrategy")
            .field("sync_type", &self.sync_type())
            .field("has_command_stream", &self.has_command_stream())
            .field("stream_usage", &self.stream_usage)
            .field("queue", &self.queue)
            .field("queue_hint", &self.queue_hint)
            .finish()
    }
}

static_assertions::assert_impl_all!(SyncStrategy: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DummyDevice};

    fn device() -> (Arc<DummyDevice>, SharedDevice) {
        let dummy = Arc::new(DummyDevice::new());
        let shared: SharedDevice = dummy.clone();
        (dummy, shared)
    }

    fn counting_before(counter: &Arc<Mutex<u32>>) -> BeforeHandler {
        let counter = Arc::clone(counter);
        handlers::before(move |_, _, _| *counter.lock() += 1)
    }

    fn barrier_strategy(streams: &Arc<Mutex<Vec<CommandStream>>>) -> SyncStrategy {
        let streams = Arc::clone(streams);
        SyncStrategy::with_barriers(move |stream| streams.lock().push(stream), None, None)
    }

    #[test]
    fn test_not_required_is_noop() {
        let (dummy, device) = device();
        let mut sync = SyncStrategy::not_required();

        sync.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        sync.establish_barrier_after(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        assert_eq!(dummy.allocated_stream_count(), 0);

        let err = sync.submit_and_sync(&device).unwrap_err();
        assert_eq!(err, SyncError::SyncNotRequired);
        assert!(err.is_logic());
        assert_eq!(sync.sync_type(), SyncType::NotRequired);
    }

    #[test]
    fn test_submit_twice_rejected() {
        let (_, device) = device();
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let mut sync = barrier_strategy(&submitted);
        sync.with_command_stream(&device, |_| ()).unwrap();

        assert!(sync.submit_and_sync(&device).unwrap().is_none());
        assert_eq!(sync.sync_type(), SyncType::Submitted);
        assert_eq!(
            sync.submit_and_sync(&device).unwrap_err(),
            SyncError::AlreadySubmitted
        );
        assert_eq!(submitted.lock().len(), 1);
    }

    #[test]
    fn test_handlers_fire_once() {
        let (_, device) = device();
        let counter = Arc::new(Mutex::new(0));
        let mut sync = SyncStrategy::with_barriers_by_return(Some(counting_before(&counter)), None);

        sync.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        sync.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        assert_eq!(*counter.lock(), 1);
        assert!(sync.has_command_stream());

        let stream = sync.submit_and_sync(&device).unwrap();
        assert!(stream.is_some());
    }

    #[test]
    fn test_semaphore_mode_signals_and_retains() {
        let (dummy, device) = device();
        let wait = Semaphore::new(&device).unwrap();
        let wait_handle = wait.handle();
        let received = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&received);
        let mut sync =
            SyncStrategy::with_semaphores(move |s| *slot.lock() = Some(s), vec![wait]);

        let stream_handle = sync
            .with_command_stream(&device, |stream| {
                stream.fill_buffer(crate::device::BufferHandle::from_raw(9), 0, 4, 0);
                stream.handle()
            })
            .unwrap();
        sync.submit_and_sync(&device).unwrap();

        let semaphore = received.lock().take().unwrap();
        let submit = dummy
            .events()
            .into_iter()
            .find(|e| matches!(e, DeviceEvent::Submit { .. }));
        assert_eq!(
            submit,
            Some(DeviceEvent::Submit {
                queue: DummyDevice::QUEUE,
                streams: vec![stream_handle],
                waits: vec![wait_handle],
                signals: vec![semaphore.handle()],
                fence: None,
            })
        );
        // The trailing full barrier.
        assert!(
            dummy
                .events()
                .iter()
                .any(|e| matches!(e, DeviceEvent::Barrier { global: 1, .. }))
        );

        assert_eq!(dummy.live_streams(), 1);
        drop(semaphore);
        assert_eq!(dummy.live_streams(), 0);
        assert_eq!(dummy.live_semaphores(), 0);
    }

    #[test]
    fn test_submit_without_stream_keeps_mode() {
        let (_, device) = device();
        let mut sync = SyncStrategy::with_barriers_by_return(None, None);
        assert_eq!(
            sync.submit_and_sync(&device).unwrap_err(),
            SyncError::NoCommandStream
        );
        assert_eq!(sync.sync_type(), SyncType::ByReturn);
    }

    #[test]
    fn test_auxiliary_shares_master_stream() {
        let (dummy, device) = device();
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let mut master = barrier_strategy(&submitted);

        let mut aux = SyncStrategy::auxiliary_with_barriers(
            &mut master,
            &device,
            HandlerRequest::None,
            HandlerRequest::None,
        )
        .unwrap();
        assert_eq!(aux.sync_type(), SyncType::AuxiliaryBarrier);
        aux.with_command_stream(&device, |_| ()).unwrap();
        assert!(aux.submit_and_sync(&device).unwrap().is_none());
        assert_eq!(dummy.submit_count(), 0);

        master.submit_and_sync(&device).unwrap();
        assert_eq!(dummy.allocated_stream_count(), 1);
        assert_eq!(dummy.submit_count(), 1);
    }

    #[test]
    fn test_steal_immediately_moves_handler() {
        let (_, device) = device();
        let counter = Arc::new(Mutex::new(0));
        let mut master =
            SyncStrategy::with_barriers_by_return(Some(counting_before(&counter)), None);
        let mut aux = SyncStrategy::auxiliary_with_barriers(
            &mut master,
            &device,
            HandlerRequest::StealImmediately,
            HandlerRequest::None,
        )
        .unwrap();

        master
            .establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        assert_eq!(*counter.lock(), 0);
        aux.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        assert_eq!(*counter.lock(), 1);

        aux.submit_and_sync(&device).unwrap();
        master.submit_and_sync(&device).unwrap();
    }

    #[test]
    fn test_auxiliary_requires_barrier_master() {
        let (_, device) = device();
        let mut master = SyncStrategy::wait_idle();
        let result = SyncStrategy::auxiliary_with_barriers(
            &mut master,
            &device,
            HandlerRequest::None,
            HandlerRequest::None,
        );
        assert!(matches!(result, Err(SyncError::InvalidParameter(_))));
    }

    #[test]
    fn test_auxiliary_after_master_submitted() {
        let (_, device) = device();
        let mut master = SyncStrategy::with_barriers_by_return(None, None);
        let mut aux = SyncStrategy::auxiliary_with_barriers(
            &mut master,
            &device,
            HandlerRequest::None,
            HandlerRequest::None,
        )
        .unwrap();
        let _stream = master.submit_and_sync(&device).unwrap();
        assert_eq!(
            aux.with_command_stream(&device, |_| ()).unwrap_err(),
            SyncError::NoCommandStream
        );
    }

    #[test]
    fn test_handler_survives_failed_stream_allocation() {
        let (dummy, device) = device();
        let counter = Arc::new(Mutex::new(0));
        let mut sync = SyncStrategy::with_barriers_by_return(Some(counting_before(&counter)), None);

        dummy.fail_stream_allocations(1);
        assert_eq!(
            sync.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
                .unwrap_err(),
            SyncError::OutOfMemory
        );
        assert_eq!(*counter.lock(), 0);
        assert!(!sync.has_command_stream());

        sync.establish_barrier_before(&device, PipelineStage::TRANSFER, None)
            .unwrap();
        assert_eq!(*counter.lock(), 1);
        assert!(sync.submit_and_sync(&device).unwrap().is_some());
    }

    #[test]
    fn test_queue_resolution() {
        let (_, device) = device();
        let mut sync = SyncStrategy::wait_idle_deliberately();
        assert_eq!(sync.queue_to_use(&device), DummyDevice::QUEUE);

        sync.set_queue_hint(QueueId(2));
        assert_eq!(sync.queue_to_use(&device), QueueId(2));

        let sync = sync.on_queue(QueueId(5));
        assert_eq!(sync.queue_to_use(&device), QueueId(5));
    }

    #[test]
    fn test_stream_created_on_resolved_queue() {
        let (_, device) = device();
        let mut sync = SyncStrategy::wait_idle_deliberately().on_queue(QueueId(7));
        // The dummy device only has queue 0.
        assert!(matches!(
            sync.with_command_stream(&device, |_| ()),
            Err(SyncError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_reusable_stream_usage() {
        let (_, device) = device();
        let mut sync = SyncStrategy::with_barriers_by_return(None, None)
            .create_reusable_command_stream();
        sync.with_command_stream(&device, |_| ()).unwrap();
        let stream = sync.submit_and_sync(&device).unwrap().unwrap();
        assert_eq!(stream.usage(), StreamUsage::Reusable);
    }
}
