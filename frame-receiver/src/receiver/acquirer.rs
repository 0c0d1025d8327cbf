// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Acquisition of one frame from the queue into a pooled slot.

use tracing::{debug, error};

use crate::{
    Error, FormatDescriptor, QueueError, Result,
    format::{is_platform_opaque, is_possibly_yuv, pixel_format},
    receiver::binding::ReceiverBinding,
    slot::{BufferSlot, Fence},
};

/// Progress of the last acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireState {
    /// Nothing attempted yet, or the attempt failed before a slot was taken.
    #[default]
    Idle,
    /// A slot was taken and the queue is being asked for a frame.
    Acquiring,
    /// A compatible frame was handed to the caller.
    Filled,
    /// No frame was available, or the pool was exhausted.
    Empty,
    /// The frame was rejected and returned to the queue.
    Mismatched,
}

/// Takes a slot from the pool and fills it from the queue.
#[derive(Debug, Default)]
pub struct FrameAcquirer {
    state: AcquireState,
}

impl FrameAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AcquireState {
        self.state
    }

    /// Acquires the next queued frame.
    ///
    /// On success the returned slot is checked out of the binding's pool and
    /// must be given back through the release path. On every failure the
    /// slot (and the queue buffer, if one was taken) has already been
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NoFrameAvailable`] if nothing is queued, the pool is exhausted
    ///   or the consumer holds the queue's maximum
    /// - [`Error::FormatMismatch`] or [`Error::Configuration`] if the frame
    ///   breaks the compatibility policy
    /// - [`Error::InvalidState`] if the queue was abandoned
    pub fn acquire<P>(&mut self, binding: &mut ReceiverBinding<P>) -> Result<BufferSlot> {
        self.state = AcquireState::Idle;
        let queue = binding.live_queue()?.clone();

        let Some(mut slot) = binding.pool_mut().try_acquire() else {
            debug!("No free slot, all {} frames are held", binding.pool().capacity());
            self.state = AcquireState::Empty;
            return Err(Error::NoFrameAvailable);
        };
        self.state = AcquireState::Acquiring;

        if let Err(err) = queue.acquire_buffer(&mut slot) {
            binding.pool_mut().release(slot)?;
            return match err {
                QueueError::NoBufferAvailable => {
                    self.state = AcquireState::Empty;
                    Err(Error::NoFrameAvailable)
                }
                QueueError::TooManyAcquired => {
                    error!("get image exceed maximum of buffers.");
                    self.state = AcquireState::Empty;
                    Err(Error::NoFrameAvailable)
                }
                other => {
                    self.state = AcquireState::Idle;
                    Err(Error::Queue(other))
                }
            };
        }

        if let Err(err) = check_compatibility(
            binding.descriptor(),
            binding.width(),
            binding.height(),
            &slot,
        ) {
            debug!(%err, frame = slot.frame_seq(), "Rejected acquired frame");
            self.state = AcquireState::Mismatched;
            if let Some(buffer) = slot.payload()
                && let Err(release_err) = queue.release_buffer(buffer, Fence::NO_FENCE)
            {
                error!("release rejected buffer {} failed: {release_err}", buffer.id());
            }
            binding.pool_mut().release(slot)?;
            return Err(err);
        }

        self.state = AcquireState::Filled;
        Ok(slot)
    }
}

/// Decides whether a produced frame can be delivered to a receiver bound
/// with `requested` at `width` x `height`.
///
/// Receivers bound to a platform-opaque format skip every check. Otherwise
/// the crop must start at the origin and the produced format must equal the
/// requested one, with two tolerated aliases: any possibly-YUV producer for a
/// YUV receiver, and RGBA_8888 producers for BLOB receivers. Size
/// differences are logged but accepted.
pub(crate) fn check_compatibility(
    requested: &FormatDescriptor,
    width: i32,
    height: i32,
    slot: &BufferSlot,
) -> Result<()> {
    let receiver_format = requested.platform_format;
    if is_platform_opaque(receiver_format) {
        return Ok(());
    }
    let buffer = slot
        .payload()
        .ok_or_else(|| Error::InvalidState("acquired slot holds no buffer.".to_string()))?;

    let crop = slot.crop();
    if crop.left != 0 || crop.top != 0 {
        return Err(Error::Configuration(format!(
            "crop left top [{}, {}] must be at origin.",
            crop.left, crop.top
        )));
    }

    let produced = buffer.pixel_format();
    if produced != pixel_format::BLOB
        && receiver_format != pixel_format::BLOB
        && (buffer.width() != width || buffer.height() != height)
    {
        debug!(
            "Producer buffer size [{}, {}] differs from receiver size [{width}, {height}]",
            buffer.width(),
            buffer.height()
        );
    }

    if produced == receiver_format {
        return Ok(());
    }
    if requested.logical.is_yuv() && is_possibly_yuv(produced) {
        debug!("Treating producer format {produced:#x} as YUV");
        return Ok(());
    }
    if receiver_format == pixel_format::BLOB && produced == pixel_format::RGBA_8888 {
        debug!("Receiving blob in RGBA_8888 buffer");
        return Ok(());
    }
    Err(Error::FormatMismatch {
        produced,
        requested: receiver_format,
    })
}
