//! GPU operations driven through a [`SyncStrategy`].
//!
//! Each operation follows the same shape:
//!
//! ```text
//! establish_barrier_before ─► record commands ─► establish_barrier_after ─► submit_and_sync
//! ```
//!
//! The result is whatever `submit_and_sync` returns: the ended stream for
//! by-return strategies, `None` otherwise.
//!
//! Each operation suggests a queue through
//! [`SyncStrategy::set_queue_hint`]: copies and fills go to the device's
//! transfer queue, layout transitions to the graphics queue. A queue set
//! with [`SyncStrategy::on_queue`] takes precedence. A by-return stream
//! handed to the frame pipeliner must have been recorded for its queue.

use crate::barrier::{BarrierBatch, ImageBarrier};
use crate::command::CommandStream;
use crate::device::{BufferHandle, ImageCopy, ImageHandle, SharedDevice};
use crate::error::SyncError;
use crate::sync::SyncStrategy;
use crate::types::{
    ImageAspect, ImageLayout, MemoryAccess, PipelineStage, ReadAccess, WriteAccess,
};

/// Fill `size` bytes of `buffer` at `offset` with `data`.
pub fn fill_buffer(
    device: &SharedDevice,
    buffer: BufferHandle,
    offset: u64,
    size: u64,
    data: u32,
    mut sync: SyncStrategy,
) -> Result<Option<CommandStream>, SyncError> {
    profile_scope!("fill_buffer");

    sync.set_queue_hint(device.transfer_queue());
    // A fill only writes.
    sync.establish_barrier_before(device, PipelineStage::TRANSFER, None)?;
    sync.with_command_stream(device, |stream| {
        stream.fill_buffer(buffer, offset, size, data)
    })?;
    sync.establish_barrier_after(
        device,
        PipelineStage::TRANSFER,
        Some(WriteAccess::new(MemoryAccess::TRANSFER_WRITE)),
    )?;
    sync.submit_and_sync(device)
}

/// Transition `image` from `old_layout` to `new_layout`.
pub fn transition_image_layout(
    device: &SharedDevice,
    image: ImageHandle,
    aspect: ImageAspect,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    mut sync: SyncStrategy,
) -> Result<Option<CommandStream>, SyncError> {
    // The new layout may be used by any stage.
    sync.set_queue_hint(device.graphics_queue());
    sync.establish_barrier_before(device, PipelineStage::ALL_COMMANDS, None)?;
    sync.with_command_stream(device, |stream| {
        let mut batch = BarrierBatch::new();
        batch.add_image_barrier(ImageBarrier {
            image,
            aspect,
            old_layout,
            new_layout,
            src_stage: PipelineStage::ALL_COMMANDS,
            dst_stage: PipelineStage::ALL_COMMANDS,
            src_access: MemoryAccess::ANY_WRITE,
            dst_access: MemoryAccess::ANY,
        });
        batch.record(stream);
    })?;
    sync.establish_barrier_after(device, PipelineStage::ALL_COMMANDS, None)?;
    sync.submit_and_sync(device)
}

/// Copy a `width` x `height` region of `src` into `dst`.
///
/// The images must be in the transfer source and transfer destination
/// layouts when the copy executes, typically arranged by the strategy's
/// before handler (see [`presets::image_copy`](crate::sync::presets::image_copy)).
pub fn copy_image(
    device: &SharedDevice,
    src: ImageHandle,
    dst: ImageHandle,
    width: u32,
    height: u32,
    mut sync: SyncStrategy,
) -> Result<Option<CommandStream>, SyncError> {
    profile_scope!("copy_image");

    sync.set_queue_hint(device.transfer_queue());
    sync.establish_barrier_before(
        device,
        PipelineStage::TRANSFER,
        Some(ReadAccess::new(MemoryAccess::TRANSFER_READ)),
    )?;
    sync.with_command_stream(device, |stream| {
        stream.copy_image(&ImageCopy {
            src,
            src_layout: ImageLayout::TransferSrc,
            dst,
            dst_layout: ImageLayout::TransferDst,
            width,
            height,
        })
    })?;
    sync.establish_barrier_after(
        device,
        PipelineStage::TRANSFER,
        Some(WriteAccess::new(MemoryAccess::TRANSFER_WRITE)),
    )?;
    sync.submit_and_sync(device)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{DeviceEvent, DummyDevice};
    use crate::sync::handlers;

    fn device() -> (Arc<DummyDevice>, SharedDevice) {
        let dummy = Arc::new(DummyDevice::new());
        let shared: SharedDevice = dummy.clone();
        (dummy, shared)
    }

    #[test]
    fn test_fill_buffer_records_in_order() {
        let (dummy, device) = device();
        let sync = SyncStrategy::with_barriers_by_return(
            Some(handlers::default_before()),
            Some(handlers::default_after()),
        );
        let stream = fill_buffer(&device, BufferHandle::from_raw(50), 0, 64, 7, sync)
            .unwrap()
            .unwrap();

        let recorded: Vec<_> = dummy
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    DeviceEvent::Barrier { .. } | DeviceEvent::FillBuffer { .. }
                )
            })
            .collect();
        assert_eq!(recorded.len(), 3);
        assert!(matches!(recorded[0], DeviceEvent::Barrier { .. }));
        assert!(matches!(recorded[1], DeviceEvent::FillBuffer { .. }));
        assert!(matches!(recorded[2], DeviceEvent::Barrier { .. }));
        assert_eq!(dummy.submit_count(), 0);
        drop(stream);
    }

    #[test]
    fn test_fill_buffer_not_required_fails_without_stream() {
        let (dummy, device) = device();
        let result = fill_buffer(
            &device,
            BufferHandle::from_raw(50),
            0,
            64,
            0,
            SyncStrategy::not_required(),
        );
        assert_eq!(result.unwrap_err(), SyncError::SyncNotRequired);
        assert_eq!(dummy.allocated_stream_count(), 0);
    }

    #[test]
    fn test_transition_image_layout() {
        let (dummy, device) = device();
        transition_image_layout(
            &device,
            ImageHandle::from_raw(3),
            ImageAspect::COLOR,
            ImageLayout::Undefined,
            ImageLayout::ShaderReadOnly,
            SyncStrategy::wait_idle_deliberately(),
        )
        .unwrap();
        assert_eq!(dummy.submit_count(), 1);
        assert_eq!(dummy.wait_idle_count(), 1);
        assert_eq!(dummy.live_streams(), 0);
    }

    #[test]
    fn test_operations_hint_their_queue() {
        let dummy = Arc::new(DummyDevice::with_transfer_queue());
        let device: SharedDevice = dummy.clone();

        let stream = fill_buffer(
            &device,
            BufferHandle::from_raw(50),
            0,
            64,
            0,
            SyncStrategy::with_barriers_by_return(None, None),
        )
        .unwrap()
        .unwrap();
        assert_eq!(stream.queue(), DummyDevice::TRANSFER_QUEUE);

        let stream = transition_image_layout(
            &device,
            ImageHandle::from_raw(3),
            ImageAspect::COLOR,
            ImageLayout::Undefined,
            ImageLayout::General,
            SyncStrategy::with_barriers_by_return(None, None),
        )
        .unwrap()
        .unwrap();
        assert_eq!(stream.queue(), DummyDevice::QUEUE);
    }

    #[test]
    fn test_copy_image_records_copy() {
        let (dummy, device) = device();
        let src = ImageHandle::from_raw(1);
        let dst = ImageHandle::from_raw(2);
        let _stream = copy_image(
            &device,
            src,
            dst,
            16,
            16,
            SyncStrategy::with_barriers_by_return(None, None),
        )
        .unwrap();
        assert!(dummy.events().iter().any(|e| matches!(
            e,
            DeviceEvent::CopyImage { src: s, dst: d, .. } if *s == src && *d == dst
        )));
    }
}
