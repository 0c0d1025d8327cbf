// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Binding of a slot pool to a buffer queue.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    Error, FormatDescriptor, ReceiverConfig, Result,
    queue::{BufferQueue, FrameAvailableCallback, QueueFactory},
    slot::pool::SlotPool,
};

/// Consumer callback fired when a frame may be ready.
pub type AvailabilityListener = Arc<dyn Fn() + Send + Sync>;

/// Listener slot shared between a receiver and its queue callback.
pub(crate) type ListenerCell = Arc<Mutex<Option<AvailabilityListener>>>;

static NEXT_RECEIVER_ID: AtomicU32 = AtomicU32::new(0);

/// Builds the callback the queue invokes on its producer thread.
///
/// It only forwards to whatever listener is registered at that moment and
/// never touches consumer state.
fn availability_callback(cell: ListenerCell) -> FrameAvailableCallback {
    Arc::new(move || {
        let listener = cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => listener(),
            None => trace!("Frame available but no listener is registered"),
        }
    })
}

/// A slot pool bound to one buffer queue.
///
/// Size, format and usage are fixed once binding succeeds. The
/// binding owns the queue's consumer side and the producer handle given to
/// the frame source.
pub struct ReceiverBinding<P> {
    width: i32,
    height: i32,
    descriptor: FormatDescriptor,
    usage: u64,
    name: String,
    queue: Arc<dyn BufferQueue>,
    producer: P,
    pool: SlotPool,
    bound: bool,
}

impl<P: Clone> ReceiverBinding<P> {
    /// Creates the queue pair and negotiates the buffer defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for invalid parameters, before any queue exists
    /// - [`Error::Allocation`] if the factory cannot create the queue pair
    /// - [`Error::Configuration`] naming the step if size, format or dataspace
    ///   negotiation fails; the queue is abandoned before returning
    pub(crate) fn bind<F>(
        factory: &F,
        config: &ReceiverConfig,
        listener: &ListenerCell,
    ) -> Result<Self>
    where
        F: QueueFactory<Producer = P>,
    {
        config.validate()?;
        let descriptor = FormatDescriptor::from_logical(config.format);
        if !descriptor.is_known() {
            return Err(Error::Configuration(format!(
                "format {:?} has no platform encoding.",
                config.format
            )));
        }
        let name = format!(
            "ImageReceiver-{}x{}f{:x}c{}-{}-{}",
            config.width,
            config.height,
            descriptor.platform_format,
            config.capacity,
            std::process::id(),
            NEXT_RECEIVER_ID.fetch_add(1, Ordering::Relaxed)
        );
        debug!(
            name = %name,
            width = config.width,
            height = config.height,
            format = ?config.format,
            capacity = config.capacity,
            usage = config.usage,
            "Binding receiver"
        );

        let (queue, producer) = factory
            .create_queue(&name, config.capacity, config.usage)
            .map_err(|err| {
                Error::Allocation(format!(
                    "allocate consumer buffer (format:{:#x}) failed: {err}.",
                    descriptor.platform_format
                ))
            })?;

        let pool = match Self::configure(queue.as_ref(), config, &descriptor, listener)
            .and_then(|()| SlotPool::new(config.capacity))
        {
            Ok(pool) => pool,
            Err(err) => {
                queue.set_frame_available_listener(None);
                queue.abandon();
                return Err(err);
            }
        };

        Ok(Self {
            width: config.width,
            height: config.height,
            descriptor,
            usage: config.usage,
            name,
            queue,
            producer,
            pool,
            bound: true,
        })
    }

    fn configure(
        queue: &dyn BufferQueue,
        config: &ReceiverConfig,
        descriptor: &FormatDescriptor,
        listener: &ListenerCell,
    ) -> Result<()> {
        if config.is_protected() {
            queue.set_consumer_is_protected(true).map_err(|err| {
                Error::Configuration(format!("mark consumer protected failed: {err}."))
            })?;
        }
        queue.set_frame_available_listener(Some(availability_callback(listener.clone())));
        queue
            .set_default_buffer_size(config.width, config.height)
            .map_err(|err| {
                Error::Configuration(format!(
                    "set format {:#x} default buffer size [{}, {}] failed: {err}.",
                    descriptor.platform_format, config.width, config.height
                ))
            })?;
        queue
            .set_default_buffer_format(descriptor.platform_format)
            .map_err(|err| {
                Error::Configuration(format!(
                    "set default buffer format {:#x} failed: {err}.",
                    descriptor.platform_format
                ))
            })?;
        queue
            .set_default_buffer_dataspace(descriptor.dataspace)
            .map_err(|err| {
                Error::Configuration(format!(
                    "set default buffer data space {:#x} failed: {err}.",
                    descriptor.dataspace
                ))
            })?;
        Ok(())
    }

    /// Producer handle for the frame source. Always the same surface.
    pub fn producer(&self) -> P {
        self.producer.clone()
    }
}

impl<P> ReceiverBinding<P> {
    /// Identifier of this binding, shared with its slot pool.
    pub fn key(&self) -> Uuid {
        self.pool.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut SlotPool {
        &mut self.pool
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// The queue, if it is still usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] after [`Self::unbind`] or once the
    /// queue has been abandoned from elsewhere.
    pub fn live_queue(&self) -> Result<&Arc<dyn BufferQueue>> {
        if !self.bound || self.queue.is_abandoned() {
            return Err(Error::InvalidState(format!(
                "buffer queue {} was abandoned.",
                self.name
            )));
        }
        Ok(&self.queue)
    }

    /// Asks the queue to free the buffers it is not using.
    pub fn discard_free_buffers(&self) -> Result<()> {
        self.live_queue()?.discard_free_buffers()?;
        Ok(())
    }

    /// Detaches the listener and abandons the queue. Idempotent.
    pub fn unbind(&mut self) {
        if !self.bound {
            return;
        }
        self.bound = false;
        self.queue.set_frame_available_listener(None);
        self.queue.abandon();
        debug!(
            name = %self.name,
            outstanding = self.pool.checked_out(),
            "Unbound receiver"
        );
    }
}

impl<P> Drop for ReceiverBinding<P> {
    fn drop(&mut self) {
        self.unbind();
    }
}
