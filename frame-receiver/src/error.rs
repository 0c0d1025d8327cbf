// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for receiver operations.
//!
//! [`Error`] is what every public operation of the crate returns. Failures that
//! originate in the buffer queue collaborator are reported as [`QueueError`]
//! and either wrapped in [`Error::Queue`] or translated into the more specific
//! negotiation step that failed.

use crate::{Frame, queue::QueueError};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while binding, reading, decomposing or releasing frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer queue pair or the slot pool could not be created.
    ///
    /// Fatal to the bind attempt; the receiver stays unbound.
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Size, format, dataspace or crop negotiation failed.
    ///
    /// During bind this aborts the binding. During frame validation or
    /// decomposition it is scoped to that single frame.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The queue has no frame ready. Expected and recoverable; poll again or
    /// wait for the availability listener.
    #[error("No frame available")]
    NoFrameAvailable,

    /// The producer delivered a frame whose platform format is not compatible
    /// with the negotiated one. The frame was handed back to the queue and the
    /// receiver remains usable.
    #[error("Producer format {produced:#x} mismatch receiver format {requested:#x}")]
    FormatMismatch {
        /// Platform format of the delivered buffer.
        produced: i32,
        /// Platform format negotiated at bind time.
        requested: i32,
    },

    /// The operation is not valid for the current receiver or slot state
    /// (unbound receiver, double bind, slot not checked out).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A frame was handed to a receiver it was not read from.
    ///
    /// The frame is returned untouched and can still be released to the
    /// receiver that owns it.
    #[error("Frame was read from another receiver")]
    ForeignFrame(Box<Frame>),

    /// A queue primitive failed outside of a specific negotiation step.
    #[error("Buffer queue error: {0}")]
    Queue(#[from] QueueError),

    /// A receiver configuration could not be parsed.
    #[error("Invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error for failures not covered by the variants above.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns `true` if an error from reading or decomposing a frame only
    /// affects that frame, so the caller may simply try the next one.
    ///
    /// Errors returned by [`crate::ImageReceiver::bind`] are always fatal to
    /// that bind attempt, whatever this predicate says about them.
    ///
    /// ```
    /// use frame_receiver::{ImageReceiver, LogicalFormat, MemoryQueueFactory, ReceiverConfig};
    ///
    /// let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
    /// receiver
    ///     .bind(&ReceiverConfig::new(16, 16, LogicalFormat::Yuv420_888, 1))
    ///     .unwrap();
    /// match receiver.read_next_frame() {
    ///     Ok(frame) => receiver.release_frame(frame).unwrap(),
    ///     Err(err) => assert!(err.is_recoverable()),
    /// }
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoFrameAvailable | Error::FormatMismatch { .. } | Error::Configuration(_)
        )
    }
}
