// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! # Frame Receiver
//!
//! Consumer side of a streaming image pipeline: a producer writes frames into
//! a buffer queue, and an [`ImageReceiver`] acquires them, validates them
//! against the negotiated format, exposes their planes without copying and
//! hands the buffers back.
//!
//! ## Overview
//!
//! ### Key Concepts
//!
//! - **Binding**: a receiver attached to one buffer queue with a fixed size,
//!   format, capacity and usage ([`ReceiverConfig`])
//! - **Slot**: a reusable record of one acquired frame, taken from a
//!   fixed-size [`SlotPool`]
//! - **Frame**: a slot handed to the consumer ([`Frame`]); it must be given
//!   back with [`ImageReceiver::release_frame`]
//! - **Component**: a strided view of one plane (Y, U, V) or of the whole blob
//!   ([`Component`])
//!
//! ### Formats
//!
//! Consumers talk in [`LogicalFormat`]s. Each one maps onto a platform pixel
//! format and dataspace ([`FormatDescriptor`]). YUV receivers accept any
//! possibly-YUV producer layout (NV21, NV12, I420, YV12, YCbCr_420_888), and
//! BLOB receivers accept RGBA_8888 staging buffers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  queue_frame   ┌─────────────┐
//! │ MemoryProducer│ ─────────────► │ BufferQueue │ ──► availability listener
//! └───────────────┘                └──────┬──────┘
//!                                         │ acquire / release
//!                                  ┌──────┴────────┐
//!                                  │ ImageReceiver │
//!                                  └──────┬────────┘
//!                                         ├─► ReceiverBinding (queue + SlotPool)
//!                                         ├─► FrameAcquirer   (compatibility policy)
//!                                         └─► splitter        (lazy lock, planes)
//! ```
//!
//! ## Examples
//!
//! ```
//! use frame_receiver::{ComponentKind, ImageReceiver, LogicalFormat, MemoryQueueFactory, ReceiverConfig};
//!
//! # fn main() -> Result<(), frame_receiver::Error> {
//! let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
//! let producer = receiver.bind(&ReceiverConfig::new(640, 480, LogicalFormat::Yuv420_888, 3))?;
//!
//! producer.queue_frame(producer.default_frame().fill(0x10))?;
//!
//! let frame = receiver.read_next_frame()?;
//! assert_eq!(receiver.format(&frame), LogicalFormat::Yuv420_888);
//! {
//!     let planes = receiver.components(&frame, 3, LogicalFormat::Yuv420_888)?;
//!     assert_eq!(planes[0].kind, ComponentKind::Y);
//!     assert_eq!(planes[0].pixel_stride, 1);
//! }
//! receiver.release_frame(frame)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`ImageReceiver`] is driven from a single consumer thread
//! - The availability listener runs on the producer's thread and must only
//!   signal the consumer
//! - [`MemoryProducer`] is `Clone + Send` and can be moved to a source thread

mod error;

pub mod config;
pub mod format;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod slot;

pub use config::ReceiverConfig;
pub use error::{Error, Result};
pub use format::{ComponentKind, FormatDescriptor, LogicalFormat};
pub use queue::{
    BufferQueue, GraphicBuffer, LockedImage, QueueError, QueueFactory,
    memory::{Fault, MemoryProducer, MemoryQueue, MemoryQueueFactory, ProducedFrame},
};
pub use receiver::{
    ImageReceiver, acquirer::AcquireState, frame::Frame, splitter::Component,
};
pub use registry::ReceiverRegistry;
pub use slot::{BufferSlot, Fence, Rect, pool::SlotPool};
