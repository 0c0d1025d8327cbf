// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! The buffer queue a receiver binds to.
//!
//! The queue is an external collaborator: it owns the actual frame memory and
//! is shared with the frame source. This module describes the consumer-side
//! capabilities the receiver needs from it:
//!
//! - [`QueueFactory`]: creates a consumer/producer pair
//! - [`BufferQueue`]: negotiation, acquire/release with fences, abandonment
//! - [`GraphicBuffer`]: one producer-written buffer that can be CPU-locked
//!
//! [`memory`] provides a heap-backed implementation for in-process producers.

pub mod memory;

use std::sync::Arc;

use crate::slot::{BufferSlot, Fence, Rect};

/// Errors reported by queue primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No frame is queued for the consumer, or no free buffer for the producer.
    #[error("No buffer available")]
    NoBufferAvailable,

    /// The consumer already holds the maximum number of buffers.
    #[error("Too many buffers acquired")]
    TooManyAcquired,

    /// The queue was abandoned and refuses every further operation.
    #[error("Queue abandoned")]
    Abandoned,

    /// An argument or buffer was rejected.
    #[error("Bad value: {0}")]
    BadValue(String),

    /// The queue ran out of memory.
    #[error("Out of memory")]
    NoMemory,

    /// An implementation specific status code.
    #[error("Unknown queue status: {0}")]
    Unknown(i32),
}

/// Callback fired by the queue whenever a frame may be ready.
///
/// Invoked on a thread owned by the producer side.
pub type FrameAvailableCallback = Arc<dyn Fn() + Send + Sync>;

/// CPU mapping of a locked buffer.
///
/// `stride` is the luma (or single plane) row stride in bytes. For YUV
/// layouts `cb`/`cr` are the chroma plane offsets into `data`, `chroma_stride`
/// is the chroma row stride and `chroma_step` the distance between two chroma
/// samples of the same plane.
#[derive(Debug, Clone)]
pub struct LockedImage {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: i32,
    pub stride: u32,
    pub cb: Option<usize>,
    pub cr: Option<usize>,
    pub chroma_stride: u32,
    pub chroma_step: u32,
    pub crop: Rect,
    pub timestamp: i64,
    pub frame_number: u64,
}

/// A producer-written buffer owned by the queue.
pub trait GraphicBuffer: Send + Sync {
    /// Stable identity of the buffer within its queue.
    fn id(&self) -> u64;

    fn width(&self) -> i32;

    fn height(&self) -> i32;

    /// Platform pixel format the producer actually used.
    fn pixel_format(&self) -> i32;

    /// Maps the buffer for CPU access once `fence` has signalled.
    fn lock(&self, usage: u64, fence: Fence) -> Result<LockedImage, QueueError>;

    /// Unmaps the buffer. The returned fence signals when the unmap is done.
    fn unlock_async(&self) -> Result<Fence, QueueError>;
}

/// Consumer side of a buffer queue.
///
/// Implementations are internally synchronized; every method may be called
/// concurrently with producer writes.
pub trait BufferQueue: Send + Sync {
    /// Size producers get when they do not pick one.
    fn set_default_buffer_size(&self, width: i32, height: i32) -> Result<(), QueueError>;

    fn set_default_buffer_format(&self, format: i32) -> Result<(), QueueError>;

    fn set_default_buffer_dataspace(&self, dataspace: i32) -> Result<(), QueueError>;

    /// Marks the consumer as handling protected content.
    fn set_consumer_is_protected(&self, protected: bool) -> Result<(), QueueError>;

    /// Installs or removes the frame-available callback.
    fn set_frame_available_listener(&self, listener: Option<FrameAvailableCallback>);

    /// Fills `slot` with the oldest queued frame without blocking.
    ///
    /// Returns [`QueueError::NoBufferAvailable`] when nothing is queued and
    /// [`QueueError::TooManyAcquired`] when the consumer is at its limit.
    fn acquire_buffer(&self, slot: &mut BufferSlot) -> Result<(), QueueError>;

    /// Returns an acquired buffer. The producer may reuse it after `fence`.
    fn release_buffer(&self, buffer: &Arc<dyn GraphicBuffer>, fence: Fence)
    -> Result<(), QueueError>;

    /// Frees buffers the queue is not currently using.
    fn discard_free_buffers(&self) -> Result<(), QueueError>;

    /// Disconnects the queue. Pending and future producer writes fail.
    fn abandon(&self);

    fn is_abandoned(&self) -> bool;
}

/// Creates consumer/producer queue pairs.
pub trait QueueFactory {
    /// Writable surface handed to the frame source.
    type Producer: Clone + Send + 'static;

    /// Creates a queue named `name` holding at most `max_acquired` buffers on
    /// the consumer side, allocated with `usage`.
    fn create_queue(
        &self,
        name: &str,
        max_acquired: usize,
        usage: u64,
    ) -> Result<(Arc<dyn BufferQueue>, Self::Producer), QueueError>;
}
