//! Frame pipeliner configuration and surface recreation reasons.

use bitflags::bitflags;

use crate::types::{QueueId, Timeout};

/// Configuration of a [`FramePipeliner`](super::FramePipeliner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinerConfig {
    /// Number of frames that may be in flight. Defaults to the number of
    /// presentable images.
    pub frames_in_flight: Option<usize>,
    /// Queue for frame submissions and presents. Defaults to the device's
    /// graphics queue.
    pub queue: Option<QueueId>,
    /// Timeout passed to image acquisition.
    pub acquire_timeout: Timeout,
    /// Timeout for waits on frame fences.
    pub fence_wait_timeout: Timeout,
    /// Acquisition attempts per frame before giving up.
    pub max_acquire_attempts: u32,
}

impl Default for PipelinerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: None,
            queue: None,
            acquire_timeout: Timeout::Infinite,
            fence_wait_timeout: Timeout::Infinite,
            max_acquire_attempts: 4,
        }
    }
}

impl PipelinerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = Some(frames_in_flight);
        self
    }

    pub fn with_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Timeout) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_fence_wait_timeout(mut self, timeout: Timeout) -> Self {
        self.fence_wait_timeout = timeout;
        self
    }

    pub fn with_max_acquire_attempts(mut self, attempts: u32) -> Self {
        self.max_acquire_attempts = attempts;
        self
    }
}

bitflags! {
    /// Why the surface or the per-frame sync objects have to be rebuilt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RecreationReasons: u32 {
        /// Acquire or present reported a suboptimal surface.
        const SUBOPTIMAL_SURFACE = 1 << 0;
        /// Acquire or present reported an out-of-date surface.
        const INVALID_SURFACE = 1 << 1;
        const BACKBUFFER_ATTACHMENTS_CHANGED = 1 << 2;
        const PRESENTATION_MODE_CHANGED = 1 << 3;
        /// Only the per-frame sync objects need rebuilding.
        const FRAMES_IN_FLIGHT_CHANGED = 1 << 4;
        const PRESENTABLE_IMAGES_CHANGED = 1 << 5;
        const IMAGE_PROPERTIES_CHANGED = 1 << 6;
    }
}

impl Default for RecreationReasons {
    fn default() -> Self {
        Self::empty()
    }
}

impl RecreationReasons {
    /// Whether the surface itself must be recreated.
    pub fn requires_surface_recreation(self) -> bool {
        !(self - Self::FRAMES_IN_FLIGHT_CHANGED).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = PipelinerConfig::new()
            .with_frames_in_flight(2)
            .with_max_acquire_attempts(8)
            .with_acquire_timeout(Timeout::IMMEDIATE);
        assert_eq!(config.frames_in_flight, Some(2));
        assert_eq!(config.max_acquire_attempts, 8);
        assert_eq!(config.acquire_timeout, Timeout::IMMEDIATE);
        assert_eq!(config.fence_wait_timeout, Timeout::Infinite);
    }

    #[test]
    fn test_surface_recreation_needed() {
        assert!(!RecreationReasons::empty().requires_surface_recreation());
        assert!(!RecreationReasons::FRAMES_IN_FLIGHT_CHANGED.requires_surface_recreation());
        assert!(
            (RecreationReasons::FRAMES_IN_FLIGHT_CHANGED | RecreationReasons::INVALID_SURFACE)
                .requires_surface_recreation()
        );
    }
}
