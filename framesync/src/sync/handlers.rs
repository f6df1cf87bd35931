//! Barrier handler and lifetime handoff types.

use crate::command::CommandStream;
use crate::primitives::Semaphore;
use crate::types::{MemoryAccess, PipelineStage, ReadAccess, WriteAccess};

/// Records the dependency that must be satisfied before an operation.
///
/// Receives the stream, the first stage of the operation and the kind of read
/// the operation performs.
pub type BeforeHandler =
    Box<dyn FnOnce(&mut CommandStream, PipelineStage, Option<ReadAccess>) + Send>;

/// Records the dependency that later work has on an operation.
///
/// Receives the stream, the last stage of the operation and the kind of write
/// it performed.
pub type AfterHandler =
    Box<dyn FnOnce(&mut CommandStream, PipelineStage, Option<WriteAccess>) + Send>;

/// Takes ownership of a submitted command stream.
pub type StreamHandoff = Box<dyn FnOnce(CommandStream) + Send>;

/// Takes ownership of the semaphore signaled by a submission.
pub type SemaphoreHandoff = Box<dyn FnOnce(Semaphore) + Send>;

/// Box a closure as a [`BeforeHandler`].
pub fn before<F>(handler: F) -> BeforeHandler
where
    F: FnOnce(&mut CommandStream, PipelineStage, Option<ReadAccess>) + Send + 'static,
{
    Box::new(handler)
}

/// Box a closure as an [`AfterHandler`].
pub fn after<F>(handler: F) -> AfterHandler
where
    F: FnOnce(&mut CommandStream, PipelineStage, Option<WriteAccess>) + Send + 'static,
{
    Box::new(handler)
}

/// Waits for every earlier write to finish before the operation starts.
///
/// The preceding work is unknown, so the barrier is as wide as possible on
/// the source side.
pub fn default_before() -> BeforeHandler {
    before(|stream, dst_stage, dst_access| {
        stream.establish_global_memory_barrier(
            PipelineStage::ALL_COMMANDS,
            dst_stage,
            Some(MemoryAccess::ANY_WRITE),
            dst_access.map(MemoryAccess::from),
        );
    })
}

/// Makes the operation's writes visible to every later read.
pub fn default_after() -> AfterHandler {
    after(|stream, src_stage, src_access| {
        stream.establish_global_memory_barrier(
            src_stage,
            PipelineStage::ALL_COMMANDS,
            src_access.map(MemoryAccess::from),
            Some(MemoryAccess::ANY_READ),
        );
    })
}

/// What an auxiliary strategy does for one of its barrier handlers.
pub enum HandlerRequest<H> {
    /// No barrier.
    None,
    /// Use this handler.
    Custom(H),
    /// Invoke the master's handler when the auxiliary's fires, taking it
    /// from the master at that point.
    StealOnDemand,
    /// Move the master's handler into the auxiliary right away.
    StealImmediately,
}

impl<H> From<H> for HandlerRequest<H> {
    fn from(handler: H) -> Self {
        HandlerRequest::Custom(handler)
    }
}

impl<H> std::fmt::Debug for HandlerRequest<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandlerRequest::None => "None",
            HandlerRequest::Custom(_) => "Custom",
            HandlerRequest::StealOnDemand => "StealOnDemand",
            HandlerRequest::StealImmediately => "StealImmediately",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{DeviceEvent, DummyDevice, SharedDevice};

    #[test]
    fn test_default_handlers_record_global_barriers() {
        let dummy = Arc::new(DummyDevice::new());
        let device: SharedDevice = dummy.clone();
        let mut stream =
            CommandStream::allocate(&device, DummyDevice::QUEUE, Default::default()).unwrap();
        stream.begin().unwrap();

        default_before()(
            &mut stream,
            PipelineStage::TRANSFER,
            Some(ReadAccess::new(MemoryAccess::TRANSFER_READ)),
        );
        default_after()(
            &mut stream,
            PipelineStage::TRANSFER,
            Some(WriteAccess::new(MemoryAccess::TRANSFER_WRITE)),
        );

        let globals = dummy
            .events()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Barrier { global: 1, .. }))
            .count();
        assert_eq!(globals, 2);
    }
}
