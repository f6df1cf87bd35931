//! Frame pipelining against a presentation engine.
//!
//! [`FramePipeliner`] runs the acquire → submit → present loop for one
//! surface with a bounded number of frames in flight.
//!
//! # Per-frame objects
//!
//! Each frame slot `i ∈ [0, frames_in_flight)` owns:
//!
//! | Object | Kind | Signaled by | Waited on by |
//! |--------|------|-------------|--------------|
//! | frame finished | [`Fence`] | the frame's submission | `begin_frame` of frame `f + F` |
//! | image available | [`Semaphore`] | the presentation engine | the frame's submission |
//! | render finished | [`Semaphore`] | the frame's submission | the present |
//!
//! Frame `f` uses slot `f % F`.
//!
//! # Frame flow
//!
//! ```text
//! begin_frame
//!   ├─ wait on the slot's fence      (frame f - F has completed)
//!   ├─ reap deferred resources       (everything tagged <= f - F)
//!   ├─ acquire an image              (recreate the surface and retry if stale)
//!   ├─ aliasing guard                (wait on the fence of the frame that last used the image;
//!   │                                 on timeout the image stays acquired for the retry)
//!   └─ reset the slot's fence
//!
//! record work, consume_image_available / use_frame_finished_fence (optional)
//!
//! render_frame(streams)
//!   ├─ submit streams: wait image available + present dependencies,
//!   │                  signal render finished, use the fence
//!   ├─ present the image, waiting on render finished
//!   └─ advance the frame counter
//! ```
//!
//! # Frame state
//!
//! ```text
//!                  begin_frame                 consume_image_available
//! NoImageAcquired ────────────► ImageAcquired ────────────────────────► ImageAvailableConsumed
//!        ▲                            │                                          │
//!        └──────── render_frame ──────┴──────────────── render_frame ────────────┘
//! ```
//!
//! # Surface recreation
//!
//! Stale surfaces never fail a frame. A suboptimal or out-of-date result
//! during acquisition recreates the surface and retries, up to
//! [`PipelinerConfig::max_acquire_attempts`] times. At present time the
//! result only flags recreation for the next `begin_frame`, since the
//! current frame's work is still valid.
//!
//! # Example
//!
//! ```ignore
//! let mut pipeliner = FramePipeliner::new(device.clone(), presentation, PipelinerConfig::default())?;
//!
//! while running {
//!     let image = pipeliner.begin_frame()?;
//!
//!     // Frame streams go to the pipeliner's queue.
//!     let sync = SyncStrategy::with_barriers_by_return(
//!         Some(presets::image_copy::wait_for_previous_operations(src, backbuffers[image])),
//!         Some(presets::image_copy::directly_into_present(src, backbuffers[image])),
//!     )
//!     .on_queue(pipeliner.queue());
//!     let stream = ops::copy_image(&device, src.image, backbuffers[image].image, w, h, sync)?;
//!
//!     pipeliner.render_frame(stream.into_iter().collect())?;
//! }
//!
//! pipeliner.wait_idle()?;
//! ```

mod config;
mod lifetime;

pub use config::{PipelinerConfig, RecreationReasons};
pub use lifetime::FrameLifetime;

use std::fmt;
use std::sync::Arc;

use crate::command::{CommandStream, StreamState};
use crate::device::{
    AcquireOutcome, PresentOutcome, PresentationEngine, SemaphoreHandle, SemaphoreWait,
    SharedDevice, StreamHandle, Submission,
};
use crate::error::SyncError;
use crate::primitives::{Fence, Semaphore};
use crate::types::{FrameId, PipelineStage, QueueId};

/// Where the current frame is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    /// `begin_frame` has not been called for the current frame.
    NoImageAcquired,
    /// An image is acquired and its semaphore has not been handed out.
    ImageAcquired,
    /// The image available semaphore has been handed out.
    ImageAvailableConsumed,
}

struct FrameSlot {
    frame_finished: Fence,
    image_available: Semaphore,
    render_finished: Semaphore,
}

impl FrameSlot {
    fn new(device: &SharedDevice) -> Result<Self, SyncError> {
        Ok(Self {
            // Signaled so the first wait on the slot returns immediately.
            frame_finished: Fence::new(device, true)?,
            image_available: Semaphore::new(device)?
                .with_wait_stage(PipelineStage::COLOR_ATTACHMENT_OUTPUT),
            render_finished: Semaphore::new(device)?,
        })
    }
}

enum AcquireState {
    NoImage,
    /// Acquired, but the previous user of the image has not completed yet.
    AwaitingImage {
        image_index: u32,
    },
    Acquired {
        image_index: u32,
        image_available: Option<Semaphore>,
        fence: Option<Fence>,
    },
}

fn create_slots(device: &SharedDevice, count: usize) -> Result<Vec<FrameSlot>, SyncError> {
    (0..count).map(|_| FrameSlot::new(device)).collect()
}

/// Multi-frame-in-flight acquire/submit/present loop.
///
/// Not thread-safe: owned by the thread that submits frames.
pub struct FramePipeliner<P: PresentationEngine> {
    device: SharedDevice,
    presentation: P,
    queue: QueueId,
    config: PipelinerConfig,
    slots: Vec<FrameSlot>,
    /// Slot whose fence guards the last submitted use of each image.
    images_in_flight: Vec<Option<usize>>,
    lifetime: Arc<FrameLifetime>,
    acquire: AcquireState,
    recreation: RecreationReasons,
}

impl<P: PresentationEngine> FramePipeliner<P> {
    /// Create a pipeliner for `presentation`.
    ///
    /// Frames in flight default to the number of presentable images.
    pub fn new(
        device: SharedDevice,
        presentation: P,
        config: PipelinerConfig,
    ) -> Result<Self, SyncError> {
        let image_count = presentation.image_count();
        if image_count == 0 {
            return Err(SyncError::InvalidParameter(
                "presentation engine has no images".to_string(),
            ));
        }
        let frames_in_flight = config.frames_in_flight.unwrap_or(image_count);
        if frames_in_flight == 0 {
            return Err(SyncError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let queue = config.queue.unwrap_or_else(|| device.graphics_queue());
        let slots = create_slots(&device, frames_in_flight)?;

        log::info!(
            "Frame pipeliner on {} device: {} frames in flight, {} presentable images",
            device.name(),
            frames_in_flight,
            image_count
        );

        Ok(Self {
            device,
            presentation,
            queue,
            config,
            slots,
            images_in_flight: vec![None; image_count],
            lifetime: Arc::new(FrameLifetime::new(frames_in_flight, queue)),
            acquire: AcquireState::NoImage,
            recreation: RecreationReasons::empty(),
        })
    }

    /// Start the current frame and acquire its presentable image.
    ///
    /// Blocks until frame `current - frames_in_flight` has completed, and
    /// additionally until the previous user of the acquired image has
    /// completed if that is a different frame slot.
    ///
    /// Returns the index of the acquired image.
    ///
    /// If the wait for the image's previous user times out, the image stays
    /// acquired and the next call only retries that wait.
    pub fn begin_frame(&mut self) -> Result<u32, SyncError> {
        profile_scope!("begin_frame");

        match self.acquire {
            AcquireState::NoImage => {}
            AcquireState::AwaitingImage { image_index } => {
                log::trace!("Retrying the wait for image {image_index}");
                return self.finish_acquire(self.current_slot(), image_index);
            }
            AcquireState::Acquired { .. } => return Err(SyncError::FrameInProgress),
        }
        if !self.recreation.is_empty() {
            self.recreate()?;
        }

        let frame = self.current_frame();
        let slot = self.current_slot();
        if !self.slots[slot]
            .frame_finished
            .wait(self.config.fence_wait_timeout)?
        {
            return Err(SyncError::Timeout);
        }

        // Everything submitted by this slot's previous frame has completed.
        for owner in &mut self.images_in_flight {
            if *owner == Some(slot) {
                *owner = None;
            }
        }
        self.lifetime.reaper().reap(frame);

        let image_index = self.acquire_next_image()?;
        log::trace!(
            "Begin frame {} (slot {}, image {})",
            frame,
            self.current_slot(),
            image_index
        );
        Ok(image_index)
    }

    fn acquire_next_image(&mut self) -> Result<u32, SyncError> {
        let attempts = self.config.max_acquire_attempts.max(1);

        for attempt in 1..=attempts {
            if !self.recreation.is_empty() {
                self.recreate()?;
            }

            let slot = self.current_slot();
            let signal = self.slots[slot].image_available.handle();
            match self
                .presentation
                .acquire_next_image(signal, self.config.acquire_timeout)?
            {
                AcquireOutcome::Ready(image_index) => {
                    return self.finish_acquire(slot, image_index);
                }
                AcquireOutcome::Suboptimal(image_index) => {
                    log::info!(
                        "Surface suboptimal when acquiring image {image_index} (attempt {attempt}/{attempts}), recreating"
                    );
                    self.recreation |= RecreationReasons::SUBOPTIMAL_SURFACE;
                    self.drain_image_available(slot)?;
                }
                AcquireOutcome::OutOfDate => {
                    log::info!(
                        "Surface out of date at acquisition (attempt {attempt}/{attempts}), recreating"
                    );
                    self.recreation |= RecreationReasons::INVALID_SURFACE;
                }
            }
        }

        log::warn!("Giving up image acquisition after {attempts} attempts");
        Err(SyncError::AcquireRetriesExhausted(attempts))
    }

    /// Consume a pending signal of the slot's image available semaphore.
    ///
    /// A waiting semaphore can't be unsignaled from the host, so an empty
    /// submission waits on it and the host waits for that submission.
    fn drain_image_available(&mut self, slot: usize) -> Result<(), SyncError> {
        let fence = Fence::new(&self.device, false)?;
        let waits = [self.slots[slot].image_available.as_wait()];
        self.device.queue_submit(
            self.queue,
            &Submission {
                waits: &waits,
                fence: Some(fence.handle()),
                ..Default::default()
            },
        )?;
        fence.wait_until_signaled()
    }

    fn finish_acquire(&mut self, slot: usize, image_index: u32) -> Result<u32, SyncError> {
        let image = image_index as usize;
        let Some(owner) = self.images_in_flight.get(image).copied() else {
            return Err(SyncError::Internal(format!(
                "presentation engine returned image {image_index}, but has {} images",
                self.images_in_flight.len()
            )));
        };

        // Out-of-order acquisition: another slot's frame may still be
        // writing this image.
        if let Some(owner) = owner
            && owner != slot
        {
            log::trace!("Image {image_index} is still used by slot {owner}, waiting");
            // Keeps the image and the pending signal of image available for
            // the next begin_frame.
            self.acquire = AcquireState::AwaitingImage { image_index };
            if !self.slots[owner]
                .frame_finished
                .wait(self.config.fence_wait_timeout)?
            {
                return Err(SyncError::Timeout);
            }
        }

        let current = &self.slots[slot];
        current.frame_finished.reset()?;
        self.acquire = AcquireState::Acquired {
            image_index,
            image_available: Some(current.image_available.clone()),
            fence: Some(current.frame_finished.clone()),
        };
        Ok(image_index)
    }

    fn recreate(&mut self) -> Result<(), SyncError> {
        let reasons = std::mem::take(&mut self.recreation);
        if let Err(err) = self.apply_recreation(reasons) {
            self.recreation |= reasons;
            return Err(err);
        }
        Ok(())
    }

    fn apply_recreation(&mut self, reasons: RecreationReasons) -> Result<(), SyncError> {
        profile_scope!("recreate");

        if reasons.requires_surface_recreation() {
            log::info!("Recreating surface: {reasons:?}");
            if let Some(outdated) = self.presentation.recreate()? {
                self.lifetime.tag_for_deferred_release(outdated, None);
            }
            let image_count = self.presentation.image_count();
            if image_count == 0 {
                return Err(SyncError::RecreationFailed(
                    "recreated surface has no images".to_string(),
                ));
            }
            // New images have no frame using them yet.
            self.images_in_flight = vec![None; image_count];
        }

        let frames_in_flight = self
            .config
            .frames_in_flight
            .unwrap_or(self.presentation.image_count());
        if frames_in_flight != self.slots.len() {
            self.rebuild_slots(frames_in_flight)?;
        }
        Ok(())
    }

    fn rebuild_slots(&mut self, frames_in_flight: usize) -> Result<(), SyncError> {
        log::info!(
            "Rebuilding frame sync objects: {} -> {} frames in flight",
            self.slots.len(),
            frames_in_flight
        );
        self.device.queue_wait_idle(self.queue)?;
        self.lifetime.reaper().flush_all();
        self.lifetime.reaper().set_frames_in_flight(frames_in_flight);
        self.slots = create_slots(&self.device, frames_in_flight)?;
        self.images_in_flight.iter_mut().for_each(|owner| *owner = None);
        Ok(())
    }

    /// Take the semaphore signaled when the current image is available.
    ///
    /// The caller's own submission must wait on it. Can be taken once per
    /// frame; `render_frame` waits on it otherwise.
    pub fn consume_image_available(&mut self) -> Result<Semaphore, SyncError> {
        match &mut self.acquire {
            AcquireState::NoImage | AcquireState::AwaitingImage { .. } => {
                Err(SyncError::NoImageAcquired)
            }
            AcquireState::Acquired {
                image_available, ..
            } => image_available
                .take()
                .ok_or(SyncError::ImageAvailableAlreadyConsumed),
        }
    }

    /// Take the current slot's fence, already reset.
    ///
    /// The caller's own submission must signal it. Can be taken once per
    /// frame; `render_frame` uses it otherwise.
    pub fn use_frame_finished_fence(&mut self) -> Result<Fence, SyncError> {
        match &mut self.acquire {
            AcquireState::NoImage | AcquireState::AwaitingImage { .. } => {
                Err(SyncError::NoImageAcquired)
            }
            AcquireState::Acquired { fence, .. } => {
                fence.take().ok_or(SyncError::FenceAlreadyUsed)
            }
        }
    }

    /// Submit `streams`, present the current image and advance to the next
    /// frame.
    ///
    /// The submission waits on the image available semaphore (unless
    /// consumed) and on the present dependencies of this frame, signals the
    /// slot's render finished semaphore and the frame fence (unless used).
    /// If there is nothing to submit, the present waits on the dependencies
    /// directly.
    ///
    /// The streams must have ended recording and belong to the pipeliner's
    /// queue. They are released once the frame has completed.
    ///
    /// Nothing changes if the streams are rejected or the submission fails:
    /// the frame can be rendered again. The streams passed in are dropped.
    pub fn render_frame(&mut self, mut streams: Vec<CommandStream>) -> Result<(), SyncError> {
        profile_scope!("render_frame");

        if !matches!(self.acquire, AcquireState::Acquired { .. }) {
            return Err(SyncError::NoImageAcquired);
        }
        for stream in &streams {
            if stream.state() != StreamState::Executable {
                return Err(SyncError::InvalidStreamState(format!(
                    "stream {:?} is {:?}, frames only submit ended streams",
                    stream.handle(),
                    stream.state()
                )));
            }
            if stream.queue() != self.queue {
                return Err(SyncError::InvalidParameter(format!(
                    "stream {:?} belongs to queue {}, frames are submitted to queue {}",
                    stream.handle(),
                    stream.queue().index(),
                    self.queue.index()
                )));
            }
        }

        let AcquireState::Acquired {
            image_index,
            image_available,
            fence,
        } = std::mem::replace(&mut self.acquire, AcquireState::NoImage)
        else {
            return Err(SyncError::NoImageAcquired);
        };

        let frame = self.current_frame();
        let slot = self.current_slot();
        let dependencies = self.lifetime.take_present_dependencies_up_to(frame);

        let present_waits: Vec<SemaphoreHandle> =
            if !streams.is_empty() || fence.is_some() || image_available.is_some() {
                let submitted = self.submit_frame(
                    slot,
                    &streams,
                    &dependencies,
                    image_available.as_ref(),
                    fence.as_ref(),
                );
                match submitted {
                    Ok(render_finished) => {
                        for stream in &mut streams {
                            stream.mark_submitted();
                        }
                        vec![render_finished]
                    }
                    Err(err) => {
                        log::error!("Failed to submit frame {frame}: {err}");
                        self.lifetime.restore_present_dependencies(frame, dependencies);
                        self.acquire = AcquireState::Acquired {
                            image_index,
                            image_available,
                            fence,
                        };
                        return Err(err);
                    }
                }
            } else {
                if dependencies.is_empty() {
                    log::warn!("Presenting frame {frame} without waiting on any semaphore");
                }
                dependencies.iter().map(Semaphore::handle).collect()
            };

        self.images_in_flight[image_index as usize] = Some(slot);
        for stream in streams {
            self.lifetime.tag_for_deferred_release(stream, Some(frame));
        }
        for semaphore in dependencies {
            self.lifetime.tag_for_deferred_release(semaphore, Some(frame));
        }

        let presented = self
            .presentation
            .present(self.queue, &present_waits, image_index);

        log::trace!("End frame {frame} (slot {slot}, image {image_index})");
        self.lifetime.advance();
        frame_mark!();

        match presented? {
            PresentOutcome::Optimal => {}
            PresentOutcome::Suboptimal => {
                log::info!("Surface suboptimal at present, recreating before the next frame");
                self.recreation |= RecreationReasons::SUBOPTIMAL_SURFACE;
            }
            PresentOutcome::OutOfDate => {
                log::info!("Surface out of date at present, recreating before the next frame");
                self.recreation |= RecreationReasons::INVALID_SURFACE;
            }
        }
        Ok(())
    }

    fn submit_frame(
        &self,
        slot: usize,
        streams: &[CommandStream],
        dependencies: &[Semaphore],
        image_available: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<SemaphoreHandle, SyncError> {
        let render_finished = self.slots[slot].render_finished.handle();
        let mut waits: Vec<SemaphoreWait> = dependencies.iter().map(Semaphore::as_wait).collect();
        if let Some(semaphore) = image_available {
            waits.push(semaphore.as_wait());
        }
        let handles: Vec<StreamHandle> = streams.iter().map(CommandStream::handle).collect();
        let signals = [render_finished];

        self.device.queue_submit(
            self.queue,
            &Submission {
                streams: &handles,
                waits: &waits,
                signals: &signals,
                fence: fence.map(Fence::handle),
            },
        )?;
        Ok(render_finished)
    }

    /// Make the present of `frame` (the current frame if `None`) wait on
    /// `semaphore`.
    pub fn add_present_dependency(&self, semaphore: Semaphore, frame: Option<FrameId>) {
        self.lifetime.add_present_dependency(semaphore, frame);
    }

    /// Schedule a rebuild before the next acquisition.
    pub fn request_recreation(&mut self, reasons: RecreationReasons) {
        self.recreation |= reasons;
    }

    /// Change the number of frames in flight, effective at the next
    /// `begin_frame`.
    pub fn set_frames_in_flight(&mut self, frames_in_flight: usize) -> Result<(), SyncError> {
        if frames_in_flight == 0 {
            return Err(SyncError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        self.config.frames_in_flight = Some(frames_in_flight);
        self.recreation |= RecreationReasons::FRAMES_IN_FLIGHT_CHANGED;
        Ok(())
    }

    /// Block until all submitted work has completed.
    ///
    /// Call before destroying resources the frames use.
    pub fn wait_idle(&self) -> Result<(), SyncError> {
        log::trace!("Waiting for GPU idle ({} slots)", self.slots.len());

        let current = self.current_slot();
        let frame_in_progress = matches!(self.acquire, AcquireState::Acquired { .. });
        for (index, slot) in self.slots.iter().enumerate() {
            // Reset and possibly never submitted.
            if frame_in_progress && index == current {
                continue;
            }
            slot.frame_finished.wait_until_signaled()?;
        }
        self.device.queue_wait_idle(self.queue)?;

        log::trace!("GPU idle");
        Ok(())
    }

    /// Id of the frame being recorded.
    pub fn current_frame(&self) -> FrameId {
        self.lifetime.current_frame()
    }

    /// Slot of the frame being recorded.
    pub fn current_slot(&self) -> usize {
        self.current_frame().rem_euclid(self.slots.len() as FrameId) as usize
    }

    /// Image acquired for the current frame, if any.
    pub fn current_image_index(&self) -> Option<u32> {
        match self.acquire {
            AcquireState::NoImage | AcquireState::AwaitingImage { .. } => None,
            AcquireState::Acquired { image_index, .. } => Some(image_index),
        }
    }

    pub fn frame_state(&self) -> FrameState {
        match &self.acquire {
            AcquireState::NoImage | AcquireState::AwaitingImage { .. } => {
                FrameState::NoImageAcquired
            }
            AcquireState::Acquired {
                image_available: Some(_),
                ..
            } => FrameState::ImageAcquired,
            AcquireState::Acquired { .. } => FrameState::ImageAvailableConsumed,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn image_count(&self) -> usize {
        self.presentation.image_count()
    }

    /// Reasons for a rebuild scheduled for the next acquisition.
    pub fn pending_recreation(&self) -> RecreationReasons {
        self.recreation
    }

    /// Frame counter and deferred reaper, for sync strategies bound to
    /// frames.
    pub fn lifetime(&self) -> &Arc<FrameLifetime> {
        &self.lifetime
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }
}

impl<P: PresentationEngine> Drop for FramePipeliner<P> {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::error!("Failed to wait for GPU idle on shutdown: {err}");
        }
        if let AcquireState::AwaitingImage { .. } = self.acquire
            && let Err(err) = self.drain_image_available(self.current_slot())
        {
            log::error!("Failed to drain the image available semaphore on shutdown: {err}");
        }
        self.lifetime.reaper().flush_all();
    }
}

impl<P: PresentationEngine> fmt::Debug for FramePipeliner<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePipeliner")
            .field("current_frame", &self.current_frame())
            .field("current_slot", &self.current_slot())
            .field("frames_in_flight", &self.frames_in_flight())
            .field("image_count", &self.images_in_flight.len())
            .field("frame_state", &self.frame_state())
            .field("pending_recreation", &self.recreation)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, DummyDevice, DummyPresentation};

    fn pipeliner(
        images: usize,
        frames_in_flight: Option<usize>,
    ) -> (Arc<DummyDevice>, FramePipeliner<DummyPresentation>) {
        let dummy = Arc::new(DummyDevice::new());
        let device: SharedDevice = dummy.clone();
        let config = PipelinerConfig {
            frames_in_flight,
            ..Default::default()
        };
        let pipeliner =
            FramePipeliner::new(device, DummyPresentation::new(images), config).unwrap();
        (dummy, pipeliner)
    }

    #[test]
    fn test_frames_in_flight_defaults_to_image_count() {
        let (dummy, pipeliner) = pipeliner(3, None);
        assert_eq!(pipeliner.frames_in_flight(), 3);
        assert_eq!(pipeliner.lifetime().frames_in_flight(), 3);
        assert_eq!(dummy.live_fences(), 3);
        assert_eq!(dummy.live_semaphores(), 6);
    }

    #[test]
    fn test_frame_state_transitions() {
        let (_, mut pipeliner) = pipeliner(2, None);
        assert_eq!(pipeliner.frame_state(), FrameState::NoImageAcquired);

        let image = pipeliner.begin_frame().unwrap();
        assert_eq!(pipeliner.current_image_index(), Some(image));
        assert_eq!(pipeliner.frame_state(), FrameState::ImageAcquired);

        let _semaphore = pipeliner.consume_image_available().unwrap();
        assert_eq!(pipeliner.frame_state(), FrameState::ImageAvailableConsumed);

        pipeliner.render_frame(Vec::new()).unwrap();
        assert_eq!(pipeliner.frame_state(), FrameState::NoImageAcquired);
        assert_eq!(pipeliner.current_frame(), 1);
    }

    #[test]
    fn test_double_consume_is_logic_error() {
        let (_, mut pipeliner) = pipeliner(2, None);
        assert_eq!(
            pipeliner.consume_image_available().unwrap_err(),
            SyncError::NoImageAcquired
        );

        pipeliner.begin_frame().unwrap();
        pipeliner.consume_image_available().unwrap();
        let err = pipeliner.consume_image_available().unwrap_err();
        assert_eq!(err, SyncError::ImageAvailableAlreadyConsumed);
        assert!(err.is_logic());

        pipeliner.use_frame_finished_fence().unwrap();
        assert_eq!(
            pipeliner.use_frame_finished_fence().unwrap_err(),
            SyncError::FenceAlreadyUsed
        );
    }

    #[test]
    fn test_begin_frame_twice() {
        let (_, mut pipeliner) = pipeliner(2, None);
        pipeliner.begin_frame().unwrap();
        assert_eq!(
            pipeliner.begin_frame().unwrap_err(),
            SyncError::FrameInProgress
        );
        assert_eq!(
            pipeliner.render_frame(Vec::new()),
            Ok(())
        );
    }

    #[test]
    fn test_render_frame_without_begin() {
        let (_, mut pipeliner) = pipeliner(2, None);
        assert_eq!(
            pipeliner.render_frame(Vec::new()).unwrap_err(),
            SyncError::NoImageAcquired
        );
    }

    #[test]
    fn test_empty_frame_still_submits_for_fence_and_semaphore() {
        let (dummy, mut pipeliner) = pipeliner(2, None);
        pipeliner.begin_frame().unwrap();
        pipeliner.render_frame(Vec::new()).unwrap();

        let submits: Vec<_> = dummy
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Submit {
                    streams,
                    waits,
                    signals,
                    fence,
                    ..
                } => Some((streams.len(), waits.len(), signals.len(), fence.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![(0, 1, 1, true)]);
        assert_eq!(pipeliner.presentation().presented(), &[0]);
    }

    #[test]
    fn test_nothing_to_submit_presents_on_dependencies() {
        let (dummy, mut pipeliner) = pipeliner(2, None);
        let device = pipeliner.device().clone();
        pipeliner.begin_frame().unwrap();
        let _image_available = pipeliner.consume_image_available().unwrap();
        let _fence = pipeliner.use_frame_finished_fence().unwrap();
        pipeliner.add_present_dependency(Semaphore::new(&device).unwrap(), None);

        pipeliner.render_frame(Vec::new()).unwrap();
        assert_eq!(dummy.submit_count(), 0);
        assert_eq!(pipeliner.lifetime().reaper().pending_count(), 1);
    }

    #[test]
    fn test_present_outcome_schedules_recreation() {
        let (_, mut pipeliner) = pipeliner(2, None);
        pipeliner
            .presentation_mut()
            .script_present([PresentOutcome::OutOfDate]);

        pipeliner.begin_frame().unwrap();
        pipeliner.render_frame(Vec::new()).unwrap();
        assert_eq!(
            pipeliner.pending_recreation(),
            RecreationReasons::INVALID_SURFACE
        );

        pipeliner.begin_frame().unwrap();
        assert_eq!(pipeliner.presentation().recreations(), 1);
        assert!(pipeliner.pending_recreation().is_empty());
        pipeliner.render_frame(Vec::new()).unwrap();
    }

    #[test]
    fn test_set_frames_in_flight_rebuilds_without_surface() {
        let (dummy, mut pipeliner) = pipeliner(3, Some(3));
        pipeliner.begin_frame().unwrap();
        pipeliner.render_frame(Vec::new()).unwrap();

        pipeliner.set_frames_in_flight(2).unwrap();
        assert!(pipeliner.set_frames_in_flight(0).is_err());
        pipeliner.begin_frame().unwrap();

        assert_eq!(pipeliner.frames_in_flight(), 2);
        assert_eq!(pipeliner.lifetime().frames_in_flight(), 2);
        assert_eq!(pipeliner.presentation().recreations(), 0);
        assert_eq!(dummy.wait_idle_count(), 1);
        pipeliner.render_frame(Vec::new()).unwrap();
    }

    #[test]
    fn test_drop_waits_idle() {
        let (dummy, mut pipeliner) = pipeliner(2, None);
        pipeliner.begin_frame().unwrap();
        pipeliner.render_frame(Vec::new()).unwrap();
        drop(pipeliner);
        assert_eq!(dummy.wait_idle_count(), 1);
        assert_eq!(dummy.live_fences(), 0);
        assert_eq!(dummy.live_semaphores(), 0);
    }
}
