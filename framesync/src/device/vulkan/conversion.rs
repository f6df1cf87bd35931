//! Type conversions between framesync types and Vulkan types.

use ash::vk;
use ash::vk::Handle;

use crate::device::{BufferHandle, FenceHandle, ImageHandle, SemaphoreHandle, StreamHandle};
use crate::error::SyncError;
use crate::types::{ImageAspect, ImageLayout, MemoryAccess, PipelineStage};

/// Convert PipelineStage flags to Vulkan pipeline stage flags.
pub fn convert_pipeline_stage(stage: PipelineStage) -> vk::PipelineStageFlags {
    const MAPPING: [(PipelineStage, vk::PipelineStageFlags); 16] = [
        (PipelineStage::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStage::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
        (PipelineStage::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStage::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStage::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (
            PipelineStage::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        (
            PipelineStage::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        (
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (PipelineStage::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (PipelineStage::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStage::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (PipelineStage::HOST, vk::PipelineStageFlags::HOST),
        (PipelineStage::ALL_GRAPHICS, vk::PipelineStageFlags::ALL_GRAPHICS),
        (PipelineStage::ALL_COMMANDS, vk::PipelineStageFlags::ALL_COMMANDS),
        (
            PipelineStage::ACCELERATION_STRUCTURE_BUILD,
            vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        ),
        (
            PipelineStage::RAY_TRACING_SHADER,
            vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
        ),
    ];

    MAPPING
        .iter()
        .filter(|(ours, _)| stage.contains(*ours))
        .fold(vk::PipelineStageFlags::empty(), |acc, (_, vk_flag)| {
            acc | *vk_flag
        })
}

/// Source stage mask of a pipeline barrier.
///
/// Vulkan rejects an empty mask; nothing to wait for maps to top of pipe.
pub fn convert_src_stage_mask(stage: PipelineStage) -> vk::PipelineStageFlags {
    let flags = convert_pipeline_stage(stage);
    if flags.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        flags
    }
}

/// Destination stage mask of a pipeline barrier.
///
/// Nothing waiting maps to bottom of pipe.
pub fn convert_dst_stage_mask(stage: PipelineStage) -> vk::PipelineStageFlags {
    let flags = convert_pipeline_stage(stage);
    if flags.is_empty() {
        vk::PipelineStageFlags::BOTTOM_OF_PIPE
    } else {
        flags
    }
}

/// Convert MemoryAccess flags to Vulkan access flags.
pub fn convert_memory_access(access: MemoryAccess) -> vk::AccessFlags {
    const MAPPING: [(MemoryAccess, vk::AccessFlags); 19] = [
        (
            MemoryAccess::INDIRECT_COMMAND_READ,
            vk::AccessFlags::INDIRECT_COMMAND_READ,
        ),
        (MemoryAccess::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (
            MemoryAccess::VERTEX_ATTRIBUTE_READ,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
        ),
        (MemoryAccess::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
        (
            MemoryAccess::INPUT_ATTACHMENT_READ,
            vk::AccessFlags::INPUT_ATTACHMENT_READ,
        ),
        (MemoryAccess::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (MemoryAccess::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (
            MemoryAccess::COLOR_ATTACHMENT_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
        ),
        (
            MemoryAccess::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (
            MemoryAccess::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ),
        (
            MemoryAccess::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (MemoryAccess::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (MemoryAccess::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (MemoryAccess::HOST_READ, vk::AccessFlags::HOST_READ),
        (MemoryAccess::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
        (MemoryAccess::ANY_READ, vk::AccessFlags::MEMORY_READ),
        (MemoryAccess::ANY_WRITE, vk::AccessFlags::MEMORY_WRITE),
        (
            MemoryAccess::ACCELERATION_STRUCTURE_READ,
            vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
        ),
        (
            MemoryAccess::ACCELERATION_STRUCTURE_WRITE,
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        ),
    ];

    MAPPING
        .iter()
        .filter(|(ours, _)| access.contains(*ours))
        .fold(vk::AccessFlags::empty(), |acc, (_, vk_flag)| acc | *vk_flag)
}

/// Convert ImageLayout to Vulkan image layout.
pub fn convert_image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Convert ImageAspect flags to Vulkan image aspect flags.
pub fn convert_image_aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    let mut result = vk::ImageAspectFlags::empty();

    if aspect.contains(ImageAspect::COLOR) {
        result |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(ImageAspect::DEPTH) {
        result |= vk::ImageAspectFlags::DEPTH;
    }
    if aspect.contains(ImageAspect::STENCIL) {
        result |= vk::ImageAspectFlags::STENCIL;
    }

    result
}

/// Map a failed Vulkan call to a [`SyncError`].
pub fn map_vk_error(result: vk::Result, context: &str) -> SyncError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            SyncError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => SyncError::DeviceLost,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => SyncError::Timeout,
        other => SyncError::Internal(format!("{context}: {other:?}")),
    }
}

pub fn fence_handle(fence: vk::Fence) -> FenceHandle {
    FenceHandle::from_raw(fence.as_raw())
}

pub fn vk_fence(fence: FenceHandle) -> vk::Fence {
    vk::Fence::from_raw(fence.as_raw())
}

pub fn semaphore_handle(semaphore: vk::Semaphore) -> SemaphoreHandle {
    SemaphoreHandle::from_raw(semaphore.as_raw())
}

pub fn vk_semaphore(semaphore: SemaphoreHandle) -> vk::Semaphore {
    vk::Semaphore::from_raw(semaphore.as_raw())
}

pub fn stream_handle(command_buffer: vk::CommandBuffer) -> StreamHandle {
    StreamHandle::from_raw(command_buffer.as_raw())
}

pub fn vk_command_buffer(stream: StreamHandle) -> vk::CommandBuffer {
    vk::CommandBuffer::from_raw(stream.as_raw())
}

/// Wrap an application-owned image for use in barriers and copies.
pub fn image_handle(image: vk::Image) -> ImageHandle {
    ImageHandle::from_raw(image.as_raw())
}

pub fn vk_image(image: ImageHandle) -> vk::Image {
    vk::Image::from_raw(image.as_raw())
}

/// Wrap an application-owned buffer for use in barriers and fills.
pub fn buffer_handle(buffer: vk::Buffer) -> BufferHandle {
    BufferHandle::from_raw(buffer.as_raw())
}

pub fn vk_buffer(buffer: BufferHandle) -> vk::Buffer {
    vk::Buffer::from_raw(buffer.as_raw())
}
