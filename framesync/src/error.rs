//! Synchronization error types.

use std::fmt;

/// Broad classification of a [`SyncError`].
///
/// Logic errors mean the caller broke a usage contract (for example submitting a
/// `not_required` strategy). Runtime errors come from the device or the
/// presentation environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The API was misused. There is no recovery path.
    Logic,
    /// The device or environment failed.
    Runtime,
}

/// Errors that can occur in the synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// `submit_and_sync` was called on a strategy created with `not_required`.
    SyncNotRequired,
    /// The strategy has already been submitted.
    AlreadySubmitted,
    /// A strategy that needs a command stream was finalized without one.
    NoCommandStream,
    /// The command stream is not in the state the operation requires.
    InvalidStreamState(String),
    /// The current frame's image-available semaphore was already consumed.
    ImageAvailableAlreadyConsumed,
    /// The current frame's frame-finished fence was already handed out.
    FenceAlreadyUsed,
    /// No presentable image has been acquired for the current frame.
    NoImageAcquired,
    /// `begin_frame` was called again before the frame was rendered.
    FrameInProgress,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// Out of host or device memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// A host wait did not complete within its timeout.
    Timeout,
    /// Surface recreation failed.
    RecreationFailed(String),
    /// Acquisition kept failing after the configured number of attempts.
    AcquireRetriesExhausted(u32),
    /// An internal backend error occurred.
    Internal(String),
}

impl SyncError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SyncNotRequired
            | Self::AlreadySubmitted
            | Self::NoCommandStream
            | Self::InvalidStreamState(_)
            | Self::ImageAvailableAlreadyConsumed
            | Self::FenceAlreadyUsed
            | Self::NoImageAcquired
            | Self::FrameInProgress
            | Self::InvalidParameter(_) => ErrorKind::Logic,
            Self::OutOfMemory
            | Self::DeviceLost
            | Self::Timeout
            | Self::RecreationFailed(_)
            | Self::AcquireRetriesExhausted(_)
            | Self::Internal(_) => ErrorKind::Runtime,
        }
    }

    /// Returns `true` if the caller misused the API.
    pub fn is_logic(&self) -> bool {
        self.kind() == ErrorKind::Logic
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyncNotRequired => write!(
                f,
                "sync was declared not required, but the operation needs to be synchronized"
            ),
            Self::AlreadySubmitted => write!(f, "sync strategy has already been submitted"),
            Self::NoCommandStream => write!(f, "no command stream has been recorded"),
            Self::InvalidStreamState(msg) => write!(f, "invalid command stream state: {msg}"),
            Self::ImageAvailableAlreadyConsumed => {
                write!(f, "image available semaphore already consumed for this frame")
            }
            Self::FenceAlreadyUsed => write!(f, "frame finished fence already used for this frame"),
            Self::NoImageAcquired => write!(f, "no presentable image acquired for this frame"),
            Self::FrameInProgress => write!(f, "previous frame has not been rendered yet"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::Timeout => write!(f, "wait timed out"),
            Self::RecreationFailed(msg) => write!(f, "surface recreation failed: {msg}"),
            Self::AcquireRetriesExhausted(attempts) => {
                write!(f, "image acquisition failed after {attempts} attempts")
            }
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = SyncError::Internal("queue submit failed".to_string());
        assert_eq!(err.to_string(), "internal error: queue submit failed");
    }

    #[test]
    fn test_error_kind() {
        assert!(SyncError::SyncNotRequired.is_logic());
        assert!(SyncError::ImageAvailableAlreadyConsumed.is_logic());
        assert!(SyncError::AlreadySubmitted.is_logic());
        assert_eq!(SyncError::OutOfMemory.kind(), ErrorKind::Runtime);
        assert_eq!(SyncError::AcquireRetriesExhausted(4).kind(), ErrorKind::Runtime);
    }
}
