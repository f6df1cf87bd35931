//! Ready-made barrier handlers for common operations.

use crate::device::ImageHandle;
use crate::types::{ImageAspect, ImageLayout};

/// An image taking part in an operation.
///
/// `layout` is the layout the image is in outside of the operation: the one
/// it is transitioned from before, and back to afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub image: ImageHandle,
    pub layout: ImageLayout,
    pub aspect: ImageAspect,
}

impl ImageState {
    /// Color image in `layout`.
    pub fn new(image: ImageHandle, layout: ImageLayout) -> Self {
        Self {
            image,
            layout,
            aspect: ImageAspect::COLOR,
        }
    }
}

/// Handlers for image-to-image copies, typically into a presentable image.
pub mod image_copy {
    use super::ImageState;
    use crate::barrier::{BarrierBatch, ImageBarrier};
    use crate::sync::handlers::{AfterHandler, BeforeHandler, after, before};
    use crate::types::{ImageLayout, MemoryAccess, PipelineStage};

    /// Move both images into transfer layouts.
    ///
    /// The destination's previous contents are discarded, so nothing is
    /// waited for on its side. The source must be fully written first.
    pub fn wait_for_previous_operations(src: ImageState, dst: ImageState) -> BeforeHandler {
        before(move |stream, dst_stage, dst_access| {
            let mut batch = BarrierBatch::new();
            batch.add_image_barrier(ImageBarrier {
                image: dst.image,
                aspect: dst.aspect,
                old_layout: dst.layout,
                new_layout: ImageLayout::TransferDst,
                src_stage: PipelineStage::TOP_OF_PIPE,
                dst_stage: PipelineStage::TRANSFER,
                src_access: MemoryAccess::empty(),
                dst_access: MemoryAccess::TRANSFER_WRITE,
            });
            batch.add_image_barrier(ImageBarrier {
                image: src.image,
                aspect: src.aspect,
                old_layout: src.layout,
                new_layout: ImageLayout::TransferSrc,
                src_stage: PipelineStage::ALL_COMMANDS,
                dst_stage,
                src_access: MemoryAccess::ANY_WRITE,
                dst_access: dst_access.map(MemoryAccess::from).unwrap_or_default(),
            });
            batch.record(stream);
        })
    }

    /// Return the destination to its own layout and make the copied data
    /// visible to any later access.
    ///
    /// The source is left in the transfer source layout.
    pub fn let_subsequent_operations_wait(_src: ImageState, dst: ImageState) -> AfterHandler {
        after(move |stream, _src_stage, _src_access| {
            stream.establish_image_memory_barrier(
                dst.image,
                ImageLayout::TransferDst,
                dst.layout,
                PipelineStage::TRANSFER,
                PipelineStage::ALL_COMMANDS,
                Some(MemoryAccess::TRANSFER_WRITE),
                Some(MemoryAccess::ANY),
            );
        })
    }

    /// Hand the destination straight to the presentation engine.
    ///
    /// The present waits on a semaphore, so no destination access is needed.
    pub fn directly_into_present(_src: ImageState, dst: ImageState) -> AfterHandler {
        after(move |stream, _src_stage, _src_access| {
            stream.establish_image_memory_barrier(
                dst.image,
                ImageLayout::TransferDst,
                ImageLayout::PresentSrc,
                PipelineStage::TRANSFER,
                PipelineStage::BOTTOM_OF_PIPE,
                Some(MemoryAccess::TRANSFER_WRITE),
                None,
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::command::CommandStream;
    use crate::device::{DeviceEvent, DummyDevice, SharedDevice};
    use crate::types::{MemoryAccess, PipelineStage, ReadAccess, WriteAccess};

    fn recording() -> (Arc<DummyDevice>, CommandStream) {
        let dummy = Arc::new(DummyDevice::new());
        let device: SharedDevice = dummy.clone();
        let mut stream =
            CommandStream::allocate(&device, DummyDevice::QUEUE, Default::default()).unwrap();
        stream.begin().unwrap();
        (dummy, stream)
    }

    fn images() -> (ImageState, ImageState) {
        (
            ImageState::new(ImageHandle::from_raw(100), ImageLayout::ColorAttachment),
            ImageState::new(ImageHandle::from_raw(200), ImageLayout::Undefined),
        )
    }

    #[test]
    fn test_wait_for_previous_operations_batches_both_images() {
        let (dummy, mut stream) = recording();
        let (src, dst) = images();
        image_copy::wait_for_previous_operations(src, dst)(
            &mut stream,
            PipelineStage::TRANSFER,
            Some(ReadAccess::new(MemoryAccess::TRANSFER_READ)),
        );

        let barriers: Vec<_> = dummy
            .events()
            .into_iter()
            .filter(|e| matches!(e, DeviceEvent::Barrier { .. }))
            .collect();
        assert_eq!(barriers.len(), 1);
        assert!(matches!(barriers[0], DeviceEvent::Barrier { image: 2, .. }));
    }

    #[test]
    fn test_directly_into_present() {
        let (dummy, mut stream) = recording();
        let (src, dst) = images();
        image_copy::directly_into_present(src, dst)(
            &mut stream,
            PipelineStage::TRANSFER,
            Some(WriteAccess::new(MemoryAccess::TRANSFER_WRITE)),
        );
        assert!(
            dummy
                .events()
                .iter()
                .any(|e| matches!(e, DeviceEvent::Barrier { image: 1, .. }))
        );
    }
}
