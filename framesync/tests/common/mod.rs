//! Common utilities for framesync integration tests.
//!
//! Everything runs against the dummy backend, which records every device call
//! so tests can assert on submissions and host waits.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use redlilium_framesync::device::{DeviceEvent, FenceHandle};
use redlilium_framesync::{
    DummyDevice, DummyPresentation, FramePipeliner, PipelinerConfig, SharedDevice, handlers,
};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dummy device, both as its concrete type and as a shared device.
pub struct TestContext {
    pub dummy: Arc<DummyDevice>,
    pub device: SharedDevice,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        let dummy = Arc::new(DummyDevice::new());
        let device: SharedDevice = dummy.clone();
        Self { dummy, device }
    }

    /// Like [`new`](Self::new), with a dedicated transfer queue.
    pub fn with_transfer_queue() -> Self {
        init_logging();
        let dummy = Arc::new(DummyDevice::with_transfer_queue());
        let device: SharedDevice = dummy.clone();
        Self { dummy, device }
    }

    /// Pipeliner over `presentation`.
    pub fn pipeliner(
        &self,
        presentation: DummyPresentation,
        frames_in_flight: Option<usize>,
    ) -> FramePipeliner<DummyPresentation> {
        let config = PipelinerConfig {
            frames_in_flight,
            ..Default::default()
        };
        FramePipeliner::new(self.device.clone(), presentation, config)
            .expect("pipeliner should be created")
    }

    /// Fence of every submission, in submission order.
    pub fn submitted_fences(&self) -> Vec<Option<FenceHandle>> {
        self.dummy
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::Submit { fence, .. } => Some(fence),
                _ => None,
            })
            .collect()
    }

    /// Index of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> Option<usize> {
        self.dummy.events().iter().position(predicate)
    }

    /// Index of the `n`-th submission (zero based) in the event log.
    pub fn submit_position(&self, n: usize) -> Option<usize> {
        self.dummy
            .events()
            .iter()
            .enumerate()
            .filter(|(_, event)| matches!(event, DeviceEvent::Submit { .. }))
            .nth(n)
            .map(|(index, _)| index)
    }
}

/// Counts how often the handlers it creates have fired.
#[derive(Clone, Default)]
pub struct HandlerCounter(Arc<Mutex<u32>>);

impl HandlerCounter {
    pub fn before(&self) -> handlers::BeforeHandler {
        let count = Arc::clone(&self.0);
        handlers::before(move |_, _, _| *count.lock() += 1)
    }

    pub fn after(&self) -> handlers::AfterHandler {
        let count = Arc::clone(&self.0);
        handlers::after(move |_, _, _| *count.lock() += 1)
    }

    pub fn count(&self) -> u32 {
        *self.0.lock()
    }
}
