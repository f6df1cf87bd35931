//! Vulkan swapchain as a presentation engine.

use std::sync::Arc;

use ash::vk;

use super::VulkanDevice;
use super::conversion::{image_handle, map_vk_error, vk_semaphore};
use crate::device::{
    AcquireOutcome, ImageHandle, OutdatedSurface, PresentOutcome, PresentationEngine,
    SemaphoreHandle,
};
use crate::error::SyncError;
use crate::types::{QueueId, Timeout};

/// Creates a swapchain, passing the one it replaces (null on first use).
pub type SwapchainFactory =
    Box<dyn FnMut(vk::SwapchainKHR) -> Result<vk::SwapchainKHR, SyncError> + Send>;

/// A replaced swapchain, destroyed on drop.
///
/// Handed to the deferred reaper so it outlives the frames that presented
/// from it.
pub struct OutdatedSwapchain {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
}

impl Drop for OutdatedSwapchain {
    fn drop(&mut self) {
        log::debug!("Destroying outdated swapchain {:?}", self.swapchain);
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
    }
}

impl std::fmt::Debug for OutdatedSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutdatedSwapchain")
            .field("swapchain", &self.swapchain)
            .finish()
    }
}

/// [`PresentationEngine`] over `VK_KHR_swapchain`.
///
/// Surface and swapchain parameters are the application's business: the
/// factory closure builds the swapchain, both initially and on recreation.
pub struct VulkanPresentation {
    device: Arc<VulkanDevice>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    create_swapchain: SwapchainFactory,
}

impl VulkanPresentation {
    /// Create the initial swapchain with `create_swapchain`.
    pub fn new<F>(
        device: Arc<VulkanDevice>,
        loader: ash::khr::swapchain::Device,
        create_swapchain: F,
    ) -> Result<Self, SyncError>
    where
        F: FnMut(vk::SwapchainKHR) -> Result<vk::SwapchainKHR, SyncError> + Send + 'static,
    {
        let mut create_swapchain: SwapchainFactory = Box::new(create_swapchain);
        let swapchain = create_swapchain(vk::SwapchainKHR::null())?;
        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(map_vk_error(e, "Failed to get swapchain images"));
            }
        };

        log::info!("Created Vulkan presentation with {} images", images.len());

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            create_swapchain,
        })
    }

    /// The current swapchain.
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Images of the current swapchain.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Image `index` as a handle for barriers and copies.
    pub fn image(&self, index: u32) -> Option<ImageHandle> {
        self.images.get(index as usize).copied().map(image_handle)
    }
}

impl PresentationEngine for VulkanPresentation {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn acquire_next_image(
        &mut self,
        signal: SemaphoreHandle,
        timeout: Timeout,
    ) -> Result<AcquireOutcome, SyncError> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                timeout.as_nanos(),
                vk_semaphore(signal),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, false)) => Ok(AcquireOutcome::Ready(image_index)),
            Ok((image_index, true)) => Ok(AcquireOutcome::Suboptimal(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(map_vk_error(e, "Failed to acquire swapchain image")),
        }
    }

    fn present(
        &mut self,
        queue: QueueId,
        waits: &[SemaphoreHandle],
        image_index: u32,
    ) -> Result<PresentOutcome, SyncError> {
        let vk_queue = self.device.vk_queue(queue)?;
        let wait_semaphores: Vec<vk::Semaphore> =
            waits.iter().map(|&semaphore| vk_semaphore(semaphore)).collect();
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(vk_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(map_vk_error(e, "Failed to present swapchain image")),
        }
    }

    fn recreate(&mut self) -> Result<Option<OutdatedSurface>, SyncError> {
        let old = self.swapchain;
        let swapchain = (self.create_swapchain)(old)
            .map_err(|e| SyncError::RecreationFailed(e.to_string()))?;

        let images = match unsafe { self.loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.loader.destroy_swapchain(swapchain, None) };
                return Err(SyncError::RecreationFailed(format!(
                    "Failed to get swapchain images: {e:?}"
                )));
            }
        };

        log::info!(
            "Recreated Vulkan swapchain: {} -> {} images",
            self.images.len(),
            images.len()
        );
        self.swapchain = swapchain;
        self.images = images;

        if old == vk::SwapchainKHR::null() {
            return Ok(None);
        }
        Ok(Some(Box::new(OutdatedSwapchain {
            loader: self.loader.clone(),
            swapchain: old,
        })))
    }
}

impl Drop for VulkanPresentation {
    fn drop(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl std::fmt::Debug for VulkanPresentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanPresentation")
            .field("swapchain", &self.swapchain)
            .field("images", &self.images.len())
            .finish()
    }
}
