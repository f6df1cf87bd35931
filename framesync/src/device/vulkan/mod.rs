//! Vulkan backend using ash.
//!
//! [`VulkanDevice`] implements [`GpuDevice`] on top of a logical device the
//! application created. It owns one command pool per queue it was given, and
//! nothing else: instance, device and queues stay owned by the application.
//!
//! [`VulkanPresentation`] implements [`PresentationEngine`](crate::device::PresentationEngine)
//! on top of `VK_KHR_swapchain`.
//!
//! Command pools are externally synchronized, so allocating and freeing a
//! stream locks the pool of its queue. Recording into streams of the same
//! queue from several threads at once is not supported.

mod conversion;
mod swapchain;

pub use conversion::{buffer_handle, image_handle, map_vk_error};
pub use swapchain::{OutdatedSwapchain, VulkanPresentation};

use ash::vk;
use parking_lot::Mutex;

use self::conversion::{
    convert_dst_stage_mask, convert_image_aspect, convert_image_layout, convert_memory_access,
    convert_pipeline_stage, convert_src_stage_mask, fence_handle, semaphore_handle,
    stream_handle, vk_buffer, vk_command_buffer, vk_fence, vk_image, vk_semaphore,
};
use super::{
    BufferHandle, FenceHandle, FenceStatus, GpuDevice, ImageCopy, SemaphoreHandle, StreamHandle,
    Submission,
};
use crate::barrier::BarrierBatch;
use crate::error::SyncError;
use crate::types::{PipelineStage, QueueId, StreamUsage, Timeout};

/// A device queue and the command pool streams for it are allocated from.
struct VulkanQueue {
    queue: vk::Queue,
    family: u32,
    command_pool: Mutex<vk::CommandPool>,
}

/// Vulkan implementation of [`GpuDevice`].
pub struct VulkanDevice {
    device: ash::Device,
    queues: Vec<VulkanQueue>,
    graphics_queue: QueueId,
    transfer_queue: QueueId,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("queues", &self.queues.len())
            .field("graphics_queue", &self.graphics_queue)
            .field("transfer_queue", &self.transfer_queue)
            .finish()
    }
}

impl VulkanDevice {
    /// Wrap a logical device.
    ///
    /// `queues` lists `(queue, family index)` pairs; [`QueueId`] `i` refers to
    /// the `i`-th entry. `graphics_queue` must support graphics and present.
    ///
    /// # Safety
    ///
    /// `device` and every queue must stay valid until the returned value is
    /// dropped, and the queues must belong to `device`.
    pub unsafe fn new(
        device: ash::Device,
        queues: &[(vk::Queue, u32)],
        graphics_queue: QueueId,
    ) -> Result<Self, SyncError> {
        if graphics_queue.index() as usize >= queues.len() {
            return Err(SyncError::InvalidParameter(format!(
                "graphics queue {} out of range ({} queues)",
                graphics_queue.index(),
                queues.len()
            )));
        }

        let mut created: Vec<VulkanQueue> = Vec::with_capacity(queues.len());
        for &(queue, family) in queues {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            match unsafe { device.create_command_pool(&pool_info, None) } {
                Ok(pool) => created.push(VulkanQueue {
                    queue,
                    family,
                    command_pool: Mutex::new(pool),
                }),
                Err(e) => {
                    for queue in created {
                        let pool = queue.command_pool.into_inner();
                        unsafe { device.destroy_command_pool(pool, None) };
                    }
                    return Err(map_vk_error(e, "Failed to create command pool"));
                }
            }
        }

        log::info!(
            "Vulkan device wrapped: {} queues, graphics queue {}",
            created.len(),
            graphics_queue.index()
        );

        Ok(Self {
            device,
            queues: created,
            graphics_queue,
            transfer_queue: graphics_queue,
        })
    }

    /// Prefer `queue` for copies and fills instead of the graphics queue.
    ///
    /// Images and buffers touched there must be shared concurrently with the
    /// graphics queue family, or transferred explicitly.
    pub fn with_transfer_queue(mut self, queue: QueueId) -> Result<Self, SyncError> {
        self.queue(queue)?;
        self.transfer_queue = queue;
        Ok(self)
    }

    /// The wrapped logical device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// The Vulkan queue behind `queue`.
    pub fn vk_queue(&self, queue: QueueId) -> Result<vk::Queue, SyncError> {
        self.queue(queue).map(|q| q.queue)
    }

    /// Queue family index of `queue`.
    pub fn queue_family(&self, queue: QueueId) -> Result<u32, SyncError> {
        self.queue(queue).map(|q| q.family)
    }

    fn queue(&self, queue: QueueId) -> Result<&VulkanQueue, SyncError> {
        self.queues.get(queue.index() as usize).ok_or_else(|| {
            SyncError::InvalidParameter(format!("unknown queue {}", queue.index()))
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        for queue in &mut self.queues {
            unsafe {
                if let Err(e) = self.device.queue_wait_idle(queue.queue) {
                    log::error!("Failed to wait for queue idle on shutdown: {:?}", e);
                }
                self.device
                    .destroy_command_pool(*queue.command_pool.get_mut(), None);
            }
        }
    }
}

/// Stage at which a submission waits on a semaphore.
fn wait_stage_mask(stage: PipelineStage) -> vk::PipelineStageFlags {
    let flags = convert_pipeline_stage(stage);
    if flags.is_empty() {
        vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        flags
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn graphics_queue(&self) -> QueueId {
        self.graphics_queue
    }

    fn transfer_queue(&self) -> QueueId {
        self.transfer_queue
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, SyncError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { self.device.create_fence(&fence_info, None) }
            .map_err(|e| map_vk_error(e, "Failed to create fence"))?;
        Ok(fence_handle(fence))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(vk_fence(fence), None) };
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Timeout) -> Result<bool, SyncError> {
        let fences = [vk_fence(fence)];
        match unsafe { self.device.wait_for_fences(&fences, true, timeout.as_nanos()) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(map_vk_error(e, "Fence wait failed")),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), SyncError> {
        unsafe { self.device.reset_fences(&[vk_fence(fence)]) }
            .map_err(|e| map_vk_error(e, "Failed to reset fence"))
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, SyncError> {
        match unsafe { self.device.get_fence_status(vk_fence(fence)) } {
            Ok(true) => Ok(FenceStatus::Signaled),
            Ok(false) => Ok(FenceStatus::Unsignaled),
            Err(e) => Err(map_vk_error(e, "Failed to query fence")),
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, SyncError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&semaphore_info, None) }
            .map_err(|e| map_vk_error(e, "Failed to create semaphore"))?;
        Ok(semaphore_handle(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(vk_semaphore(semaphore), None) };
    }

    fn allocate_command_stream(
        &self,
        queue: QueueId,
        usage: StreamUsage,
    ) -> Result<StreamHandle, SyncError> {
        let pool = self.queue(queue)?.command_pool.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| map_vk_error(e, "Failed to allocate command buffer"))?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Internal("no command buffer allocated".to_string()))?;

        log::trace!(
            "Allocated {:?} command buffer {:?} on queue {}",
            usage,
            command_buffer,
            queue.index()
        );
        Ok(stream_handle(command_buffer))
    }

    fn free_command_stream(&self, queue: QueueId, stream: StreamHandle) {
        let Ok(queue) = self.queue(queue) else {
            log::error!("Cannot free command buffer {stream:?}: unknown queue {}", queue.index());
            return;
        };
        let pool = queue.command_pool.lock();
        unsafe {
            self.device
                .free_command_buffers(*pool, &[vk_command_buffer(stream)])
        };
    }

    fn begin_command_stream(
        &self,
        stream: StreamHandle,
        usage: StreamUsage,
    ) -> Result<(), SyncError> {
        let flags = match usage {
            StreamUsage::SingleUse => vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            StreamUsage::Reusable => vk::CommandBufferUsageFlags::empty(),
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);

        unsafe {
            self.device
                .begin_command_buffer(vk_command_buffer(stream), &begin_info)
        }
        .map_err(|e| map_vk_error(e, "Failed to begin command buffer"))
    }

    fn end_command_stream(&self, stream: StreamHandle) -> Result<(), SyncError> {
        unsafe { self.device.end_command_buffer(vk_command_buffer(stream)) }
            .map_err(|e| map_vk_error(e, "Failed to end command buffer"))
    }

    fn cmd_pipeline_barrier(&self, stream: StreamHandle, batch: &BarrierBatch) {
        if batch.is_empty() {
            return;
        }

        let memory_barriers: Vec<vk::MemoryBarrier> = batch
            .global_barriers()
            .iter()
            .map(|barrier| {
                vk::MemoryBarrier::default()
                    .src_access_mask(convert_memory_access(barrier.src_access))
                    .dst_access_mask(convert_memory_access(barrier.dst_access))
            })
            .collect();

        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = batch
            .buffer_barriers()
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(convert_memory_access(barrier.src_access))
                    .dst_access_mask(convert_memory_access(barrier.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(vk_buffer(barrier.buffer))
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
            })
            .collect();

        let image_barriers: Vec<vk::ImageMemoryBarrier> = batch
            .image_barriers()
            .map(|barrier| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(convert_image_layout(barrier.old_layout))
                    .new_layout(convert_image_layout(barrier.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk_image(barrier.image))
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: convert_image_aspect(barrier.aspect),
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    })
                    .src_access_mask(convert_memory_access(barrier.src_access))
                    .dst_access_mask(convert_memory_access(barrier.dst_access))
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                vk_command_buffer(stream),
                convert_src_stage_mask(batch.src_stage_mask()),
                convert_dst_stage_mask(batch.dst_stage_mask()),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn cmd_fill_buffer(
        &self,
        stream: StreamHandle,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        data: u32,
    ) {
        unsafe {
            self.device.cmd_fill_buffer(
                vk_command_buffer(stream),
                vk_buffer(buffer),
                offset,
                size,
                data,
            );
        }
    }

    fn cmd_copy_image(&self, stream: StreamHandle, copy: &ImageCopy) {
        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy::default()
            .src_subresource(subresource)
            .dst_subresource(subresource)
            .extent(vk::Extent3D {
                width: copy.width,
                height: copy.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_image(
                vk_command_buffer(stream),
                vk_image(copy.src),
                convert_image_layout(copy.src_layout),
                vk_image(copy.dst),
                convert_image_layout(copy.dst_layout),
                &[region],
            );
        }
    }

    fn queue_submit(&self, queue: QueueId, submission: &Submission<'_>) -> Result<(), SyncError> {
        let vk_queue = self.vk_queue(queue)?;

        let wait_semaphores: Vec<vk::Semaphore> = submission
            .waits
            .iter()
            .map(|wait| vk_semaphore(wait.semaphore))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = submission
            .waits
            .iter()
            .map(|wait| wait_stage_mask(wait.stage))
            .collect();
        let command_buffers: Vec<vk::CommandBuffer> = submission
            .streams
            .iter()
            .map(|&stream| vk_command_buffer(stream))
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = submission
            .signals
            .iter()
            .map(|&semaphore| vk_semaphore(semaphore))
            .collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        let fence = submission.fence.map(vk_fence).unwrap_or(vk::Fence::null());

        unsafe { self.device.queue_submit(vk_queue, &[submit_info], fence) }
            .map_err(|e| map_vk_error(e, "Failed to submit to queue"))
    }

    fn queue_wait_idle(&self, queue: QueueId) -> Result<(), SyncError> {
        let vk_queue = self.vk_queue(queue)?;
        unsafe { self.device.queue_wait_idle(vk_queue) }
            .map_err(|e| map_vk_error(e, "Failed to wait for queue idle"))
    }
}

static_assertions::assert_impl_all!(VulkanDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    // The backend needs a live device; only the pure helpers are tested here.
    #[test]
    fn test_semaphore_wait_stage_is_never_empty() {
        assert_eq!(
            wait_stage_mask(PipelineStage::empty()),
            vk::PipelineStageFlags::ALL_COMMANDS
        );
        assert_eq!(
            wait_stage_mask(PipelineStage::COLOR_ATTACHMENT_OUTPUT),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }
}
