// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Reusable frame slots.
//!
//! A [`BufferSlot`] is the consumer-side record of one acquired frame: the
//! buffer handed out by the queue plus the metadata that came with it. Slots
//! are allocated once by a [`pool::SlotPool`] and recycled for the lifetime of
//! the binding.

pub mod pool;

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::queue::{GraphicBuffer, LockedImage};

/// Axis-aligned rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Synchronization token signalled when a buffer becomes safe to touch.
///
/// The value is an opaque descriptor owned by the queue implementation;
/// [`Fence::NO_FENCE`] means "already signalled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fence(i32);

impl Fence {
    pub const NO_FENCE: Fence = Fence(-1);

    pub fn new(fd: i32) -> Self {
        Self(fd)
    }

    pub fn fd(&self) -> i32 {
        self.0
    }
}

impl Default for Fence {
    fn default() -> Self {
        Fence::NO_FENCE
    }
}

/// Identity of a slot within its pool, including the checkout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub(crate) pool: Uuid,
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl SlotId {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A single reusable frame handle.
///
/// While free the slot sits in its pool with no payload. Once the queue has
/// filled it, `payload` holds the buffer and the metadata fields describe the
/// frame. The slot is not `Clone`: whoever holds it owns it.
pub struct BufferSlot {
    pub(crate) id: SlotId,
    pub(crate) payload: Option<Arc<dyn GraphicBuffer>>,
    pub(crate) timestamp: i64,
    pub(crate) crop: Rect,
    pub(crate) frame_seq: u64,
    pub(crate) fence: Fence,
    pub(crate) dataspace: i32,
    /// CPU mapping of the payload, set by the first decomposition request.
    pub(crate) locked: OnceLock<LockedImage>,
}

impl BufferSlot {
    pub(crate) fn empty(pool: Uuid, index: usize) -> Self {
        Self {
            id: SlotId {
                pool,
                index,
                generation: 0,
            },
            payload: None,
            timestamp: 0,
            crop: Rect::default(),
            frame_seq: 0,
            fence: Fence::NO_FENCE,
            dataspace: 0,
            locked: OnceLock::new(),
        }
    }

    /// Fills the slot with a buffer handed out by the queue.
    ///
    /// Queue implementations call this from [`crate::queue::BufferQueue::acquire_buffer`].
    pub fn fill(&mut self, acquired: AcquiredBuffer) {
        self.payload = Some(acquired.buffer);
        self.timestamp = acquired.timestamp;
        self.crop = acquired.crop;
        self.frame_seq = acquired.frame_number;
        self.fence = acquired.fence;
        self.dataspace = acquired.dataspace;
    }

    /// Drops the payload and all per-frame state.
    pub(crate) fn clear(&mut self) {
        self.payload = None;
        self.timestamp = 0;
        self.crop = Rect::default();
        self.frame_seq = 0;
        self.fence = Fence::NO_FENCE;
        self.dataspace = 0;
        self.locked.take();
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn payload(&self) -> Option<&Arc<dyn GraphicBuffer>> {
        self.payload.as_ref()
    }

    pub fn is_filled(&self) -> bool {
        self.payload.is_some()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn crop(&self) -> Rect {
        self.crop
    }

    pub fn frame_seq(&self) -> u64 {
        self.frame_seq
    }

    pub fn fence(&self) -> Fence {
        self.fence
    }

    pub fn dataspace(&self) -> i32 {
        self.dataspace
    }

    /// `true` once the payload has been mapped for CPU reads.
    pub fn is_locked(&self) -> bool {
        self.locked.get().is_some()
    }
}

/// What a queue hands out on a successful acquire.
pub struct AcquiredBuffer {
    pub buffer: Arc<dyn GraphicBuffer>,
    pub fence: Fence,
    pub timestamp: i64,
    pub crop: Rect,
    pub frame_number: u64,
    pub dataspace: i32,
}
