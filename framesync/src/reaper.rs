//! Deferred release of CPU-side handles backing in-flight GPU work.
//!
//! GPU work runs up to `frames_in_flight` frames behind the CPU. A command
//! stream, semaphore or replaced surface can't be destroyed when the CPU is
//! done with it, because a submission from a recent frame may still reference
//! it. Instead the handle is tagged with the frame that used it and kept until
//! that frame has completed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       DeferredReaper                         │
//! │                                                              │
//! │  CommandStreams    [(3, s)] [(3, s)] [(4, s)] [(5, s)] ...   │
//! │  OutdatedSurfaces  [(2, sc)]                                 │
//! │  Semaphores        [(4, sem)] [(5, sem)]                     │
//! │                     ▲ front                                  │
//! └─────────────────────┼────────────────────────────────────────┘
//!                       │
//! reap(current):  release from the front while frame <= current - F,
//!                 stop at the first entry that is still too young.
//! ```
//!
//! Entries are appended in non-decreasing frame order, so a sweep is a
//! prefix removal. An entry tagged out of order waits behind the younger
//! entry ahead of it: it is released late, never early.
//!
//! `reap` must only be called after the completion fence of the slot being
//! reused has been waited on. The frame pipeliner does this in `begin_frame`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::command::CommandStream;
use crate::device::OutdatedSurface;
use crate::primitives::Semaphore;
use crate::types::FrameId;

/// Category of a deferred resource. Each category has its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    CommandStreams,
    OutdatedSurfaces,
    Semaphores,
}

impl ResourceCategory {
    const ALL: [ResourceCategory; 3] = [
        ResourceCategory::CommandStreams,
        ResourceCategory::OutdatedSurfaces,
        ResourceCategory::Semaphores,
    ];

    fn index(self) -> usize {
        match self {
            ResourceCategory::CommandStreams => 0,
            ResourceCategory::OutdatedSurfaces => 1,
            ResourceCategory::Semaphores => 2,
        }
    }
}

/// A resource waiting to be released. Dropping it releases the handle.
pub enum DeferredResource {
    CommandStream(CommandStream),
    Semaphore(Semaphore),
    OutdatedSurface(OutdatedSurface),
}

impl DeferredResource {
    pub fn category(&self) -> ResourceCategory {
        match self {
            DeferredResource::CommandStream(_) => ResourceCategory::CommandStreams,
            DeferredResource::Semaphore(_) => ResourceCategory::Semaphores,
            DeferredResource::OutdatedSurface(_) => ResourceCategory::OutdatedSurfaces,
        }
    }
}

impl fmt::Debug for DeferredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredResource::CommandStream(stream) => {
                f.debug_tuple("CommandStream").field(stream).finish()
            }
            DeferredResource::Semaphore(semaphore) => {
                f.debug_tuple("Semaphore").field(semaphore).finish()
            }
            DeferredResource::OutdatedSurface(_) => f.write_str("OutdatedSurface"),
        }
    }
}

impl From<CommandStream> for DeferredResource {
    fn from(stream: CommandStream) -> Self {
        DeferredResource::CommandStream(stream)
    }
}

impl From<Semaphore> for DeferredResource {
    fn from(semaphore: Semaphore) -> Self {
        DeferredResource::Semaphore(semaphore)
    }
}

impl From<OutdatedSurface> for DeferredResource {
    fn from(surface: OutdatedSurface) -> Self {
        DeferredResource::OutdatedSurface(surface)
    }
}

type FrameQueue = Mutex<VecDeque<(FrameId, DeferredResource)>>;

/// Frame-tagged FIFO queues of resources pending release.
pub struct DeferredReaper {
    queues: [FrameQueue; 3],
    frames_in_flight: AtomicUsize,
}

impl DeferredReaper {
    /// Create a reaper for `frames_in_flight` overlapping frames.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            queues: Default::default(),
            frames_in_flight: AtomicUsize::new(frames_in_flight),
        }
    }

    /// Keep `resource` alive until `frame` has completed.
    pub fn tag(&self, resource: impl Into<DeferredResource>, frame: FrameId) {
        let resource = resource.into();
        let mut queue = self.queues[resource.category().index()].lock();
        if let Some((last, _)) = queue.back()
            && *last > frame
        {
            log::debug!(
                "Deferred {:?} tagged for frame {frame} behind frame {last}",
                resource.category()
            );
        }
        queue.push_back((frame, resource));
    }

    /// Release everything tagged with a frame at least `frames_in_flight`
    /// frames older than `current_frame`.
    ///
    /// Returns the number of released resources.
    pub fn reap(&self, current_frame: FrameId) -> usize {
        let max_safe = current_frame - self.frames_in_flight() as FrameId;
        let mut released = Vec::new();

        for queue in &self.queues {
            let mut queue = queue.lock();
            while let Some((frame, _)) = queue.front() {
                if *frame > max_safe {
                    break;
                }
                if let Some((_, resource)) = queue.pop_front() {
                    released.push(resource);
                }
            }
        }

        // Dropping a semaphore can release retained streams; keep that
        // outside the queue locks.
        let count = released.len();
        drop(released);

        if count > 0 {
            log::trace!("Reaped {count} deferred resources at frame {current_frame}");
        }
        profile_plot!("deferred_pending", self.pending_count());
        count
    }

    /// Release everything regardless of frame.
    ///
    /// Only valid once the device is idle.
    pub fn flush_all(&self) -> usize {
        let released: Vec<_> = self
            .queues
            .iter()
            .flat_map(|queue| queue.lock().drain(..).collect::<Vec<_>>())
            .collect();
        let count = released.len();
        drop(released);
        if count > 0 {
            log::debug!("Flushed {count} deferred resources");
        }
        count
    }

    /// Number of resources pending release.
    pub fn pending_count(&self) -> usize {
        self.queues.iter().map(|q| q.lock().len()).sum()
    }

    /// Number of resources of one category pending release.
    pub fn pending_in(&self, category: ResourceCategory) -> usize {
        self.queues[category.index()].lock().len()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.load(Ordering::Relaxed)
    }

    /// Change the number of overlapping frames.
    ///
    /// The caller must have drained the queue if the count shrinks, since
    /// resources tagged under the old count are judged by the new one.
    pub fn set_frames_in_flight(&self, frames_in_flight: usize) {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        self.frames_in_flight
            .store(frames_in_flight, Ordering::Relaxed);
    }
}

impl fmt::Debug for DeferredReaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DeferredReaper");
        s.field("frames_in_flight", &self.frames_in_flight());
        for category in ResourceCategory::ALL {
            s.field(
                match category {
                    ResourceCategory::CommandStreams => "command_streams",
                    ResourceCategory::OutdatedSurfaces => "outdated_surfaces",
                    ResourceCategory::Semaphores => "semaphores",
                },
                &self.pending_in(category),
            );
        }
        s.finish()
    }
}

static_assertions::assert_impl_all!(DeferredReaper: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{DummyDevice, DummySurface, SharedDevice};

    fn device() -> (Arc<DummyDevice>, SharedDevice) {
        let dummy = Arc::new(DummyDevice::new());
        let shared: SharedDevice = dummy.clone();
        (dummy, shared)
    }

    fn surface(generation: u32) -> DeferredResource {
        let outdated: OutdatedSurface = Box::new(DummySurface { generation });
        outdated.into()
    }

    #[test]
    fn test_reap_releases_at_frames_in_flight() {
        let reaper = DeferredReaper::new(2);
        reaper.tag(surface(0), 5);

        assert_eq!(reaper.reap(5), 0);
        assert_eq!(reaper.reap(6), 0);
        assert_eq!(reaper.reap(7), 1);
        assert_eq!(reaper.pending_count(), 0);
        assert_eq!(reaper.reap(8), 0);
    }

    #[test]
    fn test_reap_stops_at_first_young_entry() {
        let reaper = DeferredReaper::new(1);
        reaper.tag(surface(0), 1);
        reaper.tag(surface(1), 3);
        // Out of order: waits behind frame 3
        reaper.tag(surface(2), 2);

        assert_eq!(reaper.reap(3), 1);
        assert_eq!(reaper.pending_count(), 2);
        assert_eq!(reaper.reap(4), 2);
    }

    #[test]
    fn test_categories_are_independent() {
        let (dummy, device) = device();
        let reaper = DeferredReaper::new(1);
        let stream =
            CommandStream::allocate(&device, DummyDevice::QUEUE, Default::default()).unwrap();
        let semaphore = Semaphore::new(&device).unwrap();

        reaper.tag(stream, 4);
        reaper.tag(semaphore, 1);
        assert_eq!(reaper.pending_in(ResourceCategory::CommandStreams), 1);
        assert_eq!(reaper.pending_in(ResourceCategory::Semaphores), 1);

        // A young command stream must not block the semaphore queue.
        assert_eq!(reaper.reap(2), 1);
        assert_eq!(dummy.live_semaphores(), 0);
        assert_eq!(dummy.live_streams(), 1);
    }

    #[test]
    fn test_flush_all() {
        let (dummy, device) = device();
        let reaper = DeferredReaper::new(3);
        reaper.tag(Semaphore::new(&device).unwrap(), 10);
        reaper.tag(surface(0), 10);

        assert_eq!(reaper.flush_all(), 2);
        assert_eq!(reaper.pending_count(), 0);
        assert_eq!(dummy.live_semaphores(), 0);
    }

    #[test]
    fn test_reaper_debug_shows_pending() {
        let reaper = DeferredReaper::new(2);
        reaper.tag(surface(0), 0);
        let debug = format!("{reaper:?}");
        assert!(debug.contains("outdated_surfaces: 1"));
    }

    #[test]
    #[should_panic(expected = "frames_in_flight must be at least 1")]
    fn test_zero_frames_in_flight() {
        let _ = DeferredReaper::new(0);
    }
}
