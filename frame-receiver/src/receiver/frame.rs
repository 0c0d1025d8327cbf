// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

use tracing::warn;

use crate::{
    FormatDescriptor, LogicalFormat, Rect, Result,
    format::{is_platform_opaque, is_possibly_yuv, pixel_format},
    receiver::splitter::{self, Component},
    slot::{BufferSlot, SlotId},
};

/// A frame handed to the consumer.
///
/// The frame owns its pool slot until it is given back with
/// [`crate::ImageReceiver::release_frame`]. Dropping it instead leaks the
/// slot and the queue buffer for the lifetime of the binding.
pub struct Frame {
    slot: BufferSlot,
    released: bool,
}

impl Frame {
    pub(crate) fn new(slot: BufferSlot) -> Self {
        Self {
            slot,
            released: false,
        }
    }

    /// Gives up ownership of the slot for the release path.
    pub(crate) fn into_slot(mut self) -> BufferSlot {
        self.released = true;
        let placeholder = BufferSlot::empty(self.slot.id.pool, self.slot.id.index);
        std::mem::replace(&mut self.slot, placeholder)
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot.id()
    }

    /// Presentation timestamp in nanoseconds.
    pub fn timestamp(&self) -> i64 {
        self.slot.timestamp()
    }

    pub fn crop(&self) -> Rect {
        self.slot.crop()
    }

    /// Producer-assigned frame sequence number.
    pub fn frame_number(&self) -> u64 {
        self.slot.frame_seq()
    }

    pub fn dataspace(&self) -> i32 {
        self.slot.dataspace()
    }

    /// Platform pixel format the producer wrote.
    pub fn pixel_format(&self) -> i32 {
        self.slot.payload().map_or(0, |buffer| buffer.pixel_format())
    }

    /// Dimensions of the underlying buffer.
    pub fn size(&self) -> (i32, i32) {
        self.slot
            .payload()
            .map_or((0, 0), |buffer| (buffer.width(), buffer.height()))
    }

    /// `true` once the frame was mapped by [`Self::components`].
    pub fn is_locked(&self) -> bool {
        self.slot.is_locked()
    }

    /// Logical format of this frame as seen by a receiver bound to
    /// `requested`.
    ///
    /// Possibly-YUV producer formats report [`LogicalFormat::Yuv420_888`].
    /// Receivers bound to a platform-opaque format always get
    /// [`LogicalFormat::Unknown`].
    pub fn format(&self, requested: LogicalFormat) -> LogicalFormat {
        let requested = FormatDescriptor::from_logical(requested);
        if !requested.is_known() || is_platform_opaque(requested.platform_format) {
            return LogicalFormat::Unknown;
        }
        let mut actual = self.pixel_format();
        if is_possibly_yuv(actual) {
            actual = pixel_format::YCBCR_420_888;
        }
        FormatDescriptor::from_platform(actual, self.slot.dataspace()).logical
    }

    /// Splits the frame into `count` components of `format`.
    ///
    /// See [`splitter::split`].
    pub fn components(&self, count: usize, format: LogicalFormat) -> Result<Vec<Component<'_>>> {
        splitter::split(&self.slot, format, count)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("slot", &self.slot.id())
            .field("frame_number", &self.slot.frame_seq())
            .field("timestamp", &self.slot.timestamp())
            .field("pixel_format", &self.pixel_format())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                slot = self.slot.id().index(),
                frame = self.slot.frame_seq(),
                "Frame dropped without being released"
            );
        }
    }
}
