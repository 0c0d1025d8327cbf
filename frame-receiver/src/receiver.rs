// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! The consumer-facing receiver.
//!
//! [`ImageReceiver`] ties together a [`binding::ReceiverBinding`] (queue plus
//! slot pool), a [`acquirer::FrameAcquirer`] and the component
//! [`splitter`]. All consumer operations take `&mut self` or `&self` and are
//! expected to run on one thread; only the availability listener is invoked
//! from the producer side.

pub mod acquirer;
pub mod binding;
pub mod frame;
pub mod splitter;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    Error, LogicalFormat, ReceiverConfig, Result,
    queue::{QueueFactory, memory::MemoryQueueFactory},
    registry::ReceiverRegistry,
};
use acquirer::{AcquireState, FrameAcquirer};
use binding::{AvailabilityListener, ListenerCell, ReceiverBinding};
use frame::Frame;
use splitter::Component;

/// Receives frames written by a producer into a bound buffer queue.
///
/// # Examples
///
/// ```
/// use frame_receiver::{ImageReceiver, LogicalFormat, MemoryQueueFactory, ReceiverConfig};
///
/// let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
/// let producer = receiver
///     .bind(&ReceiverConfig::new(32, 32, LogicalFormat::Jpeg, 1))
///     .unwrap();
/// producer
///     .queue_frame(producer.default_frame().data(vec![0xFF, 0xD8, 0xFF, 0xD9]))
///     .unwrap();
///
/// let frame = receiver.read_next_frame().unwrap();
/// let blob = receiver.components(&frame, 1, LogicalFormat::Jpeg).unwrap();
/// assert_eq!(&blob[0].data[..2], &[0xFF, 0xD8]);
/// drop(blob);
/// receiver.release_frame(frame).unwrap();
/// ```
pub struct ImageReceiver<F: QueueFactory = MemoryQueueFactory> {
    factory: F,
    binding: Option<ReceiverBinding<F::Producer>>,
    acquirer: FrameAcquirer,
    listener: ListenerCell,
    format: LogicalFormat,
    bound_once: bool,
}

impl<F: QueueFactory> ImageReceiver<F> {
    /// Creates an unbound receiver that will get its queue from `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            binding: None,
            acquirer: FrameAcquirer::new(),
            listener: Arc::new(Mutex::new(None)),
            format: LogicalFormat::Unknown,
            bound_once: false,
        }
    }

    /// Binds the receiver to a new buffer queue and returns its producer.
    ///
    /// A receiver is bound at most once; after [`Self::unbind`] a new
    /// receiver has to be created.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the receiver was already bound
    /// - [`Error::Configuration`] or [`Error::Allocation`] from the
    ///   negotiation; the receiver stays unbound
    pub fn bind(&mut self, config: &ReceiverConfig) -> Result<F::Producer> {
        if self.bound_once {
            return Err(Error::InvalidState(
                "receiver was already bound.".to_string(),
            ));
        }
        let binding = ReceiverBinding::bind(&self.factory, config, &self.listener)?;
        let producer = binding.producer();
        debug!(name = binding.name(), key = %binding.key(), "Receiver bound");
        self.format = config.format;
        self.binding = Some(binding);
        self.bound_once = true;
        Ok(producer)
    }

    /// The producer handle of the current binding.
    pub fn producer_handle(&self) -> Result<F::Producer> {
        Ok(self.bound()?.producer())
    }

    /// Registers the producer handle under this receiver's key.
    pub fn register(&self, registry: &ReceiverRegistry<F::Producer>) -> Result<Uuid> {
        let binding = self.bound()?;
        registry.insert(binding.key(), binding.producer());
        Ok(binding.key())
    }

    /// Unmaps `frame`, hands its buffer back to the queue and returns its slot
    /// to the pool.
    ///
    /// After [`Self::unbind`] the buffer is no longer given to the abandoned
    /// queue but the slot is still recycled.
    ///
    /// # Errors
    ///
    /// - [`Error::ForeignFrame`] if the frame was read from another receiver;
    ///   the frame comes back unchanged and nothing is unmapped or returned
    /// - [`Error::Queue`] if the queue refused the buffer; the slot has been
    ///   returned to the pool regardless
    pub fn release_frame(&mut self, frame: Frame) -> Result<()> {
        let owner = frame.slot_id().pool;
        let Some(binding) = self.binding.as_mut().filter(|b| b.key() == owner) else {
            debug!(frame = frame.frame_number(), "Refusing to release a foreign frame");
            return Err(Error::ForeignFrame(Box::new(frame)));
        };
        let mut slot = frame.into_slot();
        let fence = splitter::unlock(&mut slot);

        let returned = match (binding.live_queue(), slot.payload()) {
            (Ok(queue), Some(buffer)) => queue.release_buffer(buffer, fence).map_err(Error::from),
            (Err(_), _) => {
                debug!(frame = slot.frame_seq(), "Queue abandoned, keeping buffer out of it");
                Ok(())
            }
            (Ok(_), None) => Ok(()),
        };
        binding.pool_mut().release(slot)?;
        returned
    }

    /// Reads the oldest queued frame without blocking.
    ///
    /// # Errors
    ///
    /// - [`Error::NoFrameAvailable`] if nothing can be delivered right now
    /// - [`Error::FormatMismatch`] or [`Error::Configuration`] if the frame was
    ///   rejected; the next frame may still be good
    /// - [`Error::InvalidState`] if the receiver is not bound
    pub fn read_next_frame(&mut self) -> Result<Frame> {
        let binding = self.binding.as_mut().ok_or_else(not_bound)?;
        let slot = self.acquirer.acquire(binding)?;
        debug!(
            frame = slot.frame_seq(),
            timestamp = slot.timestamp(),
            "Read next frame"
        );
        Ok(Frame::new(slot))
    }

    /// Drains the queue and returns the newest frame, releasing older ones.
    ///
    /// Rejected frames are skipped. Frames can only be skipped while a slot
    /// is free, so with a capacity of one this behaves like
    /// [`Self::read_next_frame`].
    pub fn read_latest_frame(&mut self) -> Result<Frame> {
        let mut latest: Option<Frame> = None;
        loop {
            match self.read_next_frame() {
                Ok(frame) => {
                    if let Some(previous) = latest.replace(frame)
                        && let Err(err) = self.release_frame(previous)
                    {
                        self.release_quietly(latest.take());
                        return Err(err);
                    }
                }
                Err(Error::NoFrameAvailable) => break,
                Err(err @ (Error::FormatMismatch { .. } | Error::Configuration(_))) => {
                    debug!(%err, "Skipping rejected frame");
                }
                Err(err) => {
                    self.release_quietly(latest.take());
                    return Err(err);
                }
            }
        }
        latest.ok_or(Error::NoFrameAvailable)
    }

    /// Releases `frame` on an error path where a second error is only logged.
    fn release_quietly(&mut self, frame: Option<Frame>) {
        if let Some(frame) = frame
            && let Err(err) = self.release_frame(frame)
        {
            error!("Failed to release frame while handling another error: {err}");
        }
    }

    /// Logical format of `frame` for this receiver.
    pub fn format(&self, frame: &Frame) -> LogicalFormat {
        frame.format(self.format)
    }

    /// Buffer dimensions of `frame`.
    pub fn size(&self, frame: &Frame) -> (i32, i32) {
        frame.size()
    }

    /// Splits `frame` into `count` components of `format`.
    pub fn components<'f>(
        &self,
        frame: &'f Frame,
        count: usize,
        format: LogicalFormat,
    ) -> Result<Vec<Component<'f>>> {
        frame.components(count, format)
    }

    /// Installs `listener`, replacing any previous one.
    ///
    /// The listener runs on the producer's thread each time a frame is
    /// queued. It should only signal the consumer thread, never read frames
    /// itself.
    pub fn set_availability_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        let listener: AvailabilityListener = Arc::new(listener);
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn clear_availability_listener(&self) {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Asks the queue to free buffers it is not using.
    pub fn discard_free_buffers(&self) -> Result<()> {
        self.bound()?.discard_free_buffers()
    }

    /// Abandons the queue and detaches the listener. Idempotent.
    ///
    /// Frames still held stay valid to read and can be released afterwards;
    /// their buffers are not returned to the abandoned queue.
    pub fn unbind(&mut self) {
        if let Some(binding) = self.binding.as_mut() {
            binding.unbind();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.as_ref().is_some_and(ReceiverBinding::is_bound)
    }

    /// Key of the binding, `None` before [`Self::bind`].
    pub fn key(&self) -> Option<Uuid> {
        self.binding.as_ref().map(ReceiverBinding::key)
    }

    /// Logical format the receiver was bound with.
    pub fn image_format(&self) -> LogicalFormat {
        self.format
    }

    /// Default size the receiver was bound with.
    pub fn image_size(&self) -> Option<(i32, i32)> {
        self.binding.as_ref().map(|b| (b.width(), b.height()))
    }

    pub fn capacity(&self) -> usize {
        self.binding.as_ref().map_or(0, |b| b.pool().capacity())
    }

    /// Number of frames currently held by the consumer.
    pub fn frames_held(&self) -> usize {
        self.binding.as_ref().map_or(0, |b| b.pool().checked_out())
    }

    /// Number of slots free for the next read.
    pub fn free_slots(&self) -> usize {
        self.binding.as_ref().map_or(0, |b| b.pool().available())
    }

    /// Outcome of the last read attempt.
    pub fn acquire_state(&self) -> AcquireState {
        self.acquirer.state()
    }

    fn bound(&self) -> Result<&ReceiverBinding<F::Producer>> {
        match self.binding.as_ref() {
            Some(binding) if binding.is_bound() => Ok(binding),
            _ => Err(not_bound()),
        }
    }
}

impl<F: QueueFactory> Drop for ImageReceiver<F> {
    fn drop(&mut self) {
        self.unbind();
    }
}

fn not_bound() -> Error {
    Error::InvalidState("receiver is not bound.".to_string())
}
