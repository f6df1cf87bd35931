//! Tracy instrumentation for the frame loop.
//!
//! Enable the `profiling` feature to route these macros to `tracy-client`.
//! Without it every macro expands to nothing, so call sites stay free of
//! `cfg` attributes.
//!
//! ```ignore
//! fn begin_frame(&mut self) {
//!     profile_scope!("begin_frame");
//!     // wait on the slot fence, reap, acquire...
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{frame_mark as tracy_frame_mark, plot as tracy_plot, span};

/// Open a named span that ends with the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:literal) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Open a named span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:literal) => {};
}

/// Open a span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Open a function span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Mark a presented frame boundary.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark a frame boundary (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Plot a value such as the number of resources awaiting release.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        let _ = &$value;
    };
}
