// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Heap-backed buffer queue for in-process frame sources.
//!
//! [`MemoryQueueFactory`] creates a [`MemoryQueue`] (consumer side, handed to
//! the receiver) together with a [`MemoryProducer`] (the writable surface).
//! Frames are laid out exactly as a platform allocator would lay them out, so
//! the receiver's validation and decomposition logic sees realistic strides.
//!
//! # Examples
//!
//! ```
//! use frame_receiver::{ImageReceiver, LogicalFormat, MemoryQueueFactory, ReceiverConfig};
//!
//! # fn main() -> Result<(), frame_receiver::Error> {
//! let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
//! let producer = receiver.bind(&ReceiverConfig::new(64, 48, LogicalFormat::Yuv420_888, 2))?;
//!
//! producer.queue_frame(producer.default_frame().fill(0x80))?;
//! let frame = receiver.read_next_frame()?;
//! receiver.release_frame(frame)?;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{
    format::{dataspace, is_platform_opaque, pixel_format},
    queue::{
        BufferQueue, FrameAvailableCallback, GraphicBuffer, LockedImage, QueueError, QueueFactory,
    },
    slot::{AcquiredBuffer, BufferSlot, Fence, Rect},
};

/// Buffers a producer may hold beyond what the consumer can acquire.
const PRODUCER_HEADROOM: usize = 2;

/// Row alignment, in pixels, for planar and raw layouts.
const ROW_ALIGNMENT: u32 = 16;

static NEXT_FENCE: AtomicI32 = AtomicI32::new(3);
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Queue operation a [`MemoryQueueFactory`] should fail, for exercising the
/// receiver's error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Queue creation fails with [`QueueError::NoMemory`].
    CreateQueue,
    /// `set_default_buffer_size` is rejected.
    BufferSize,
    /// `set_default_buffer_format` is rejected.
    BufferFormat,
    /// `set_default_buffer_dataspace` is rejected.
    BufferDataspace,
    /// Every `release_buffer` is rejected and the buffer stays acquired.
    ReleaseBuffer,
}

/// Creates heap-backed queue pairs.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueFactory {
    fault: Option<Fault>,
}

impl MemoryQueueFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose queues fail the given negotiation step.
    pub fn with_fault(fault: Fault) -> Self {
        Self { fault: Some(fault) }
    }
}

impl QueueFactory for MemoryQueueFactory {
    type Producer = MemoryProducer;

    fn create_queue(
        &self,
        name: &str,
        max_acquired: usize,
        usage: u64,
    ) -> Result<(Arc<dyn BufferQueue>, MemoryProducer), QueueError> {
        if self.fault == Some(Fault::CreateQueue) {
            return Err(QueueError::NoMemory);
        }
        let queue = Arc::new(MemoryQueue {
            name: name.to_string(),
            max_acquired,
            usage,
            fault: self.fault,
            state: Mutex::new(QueueState::default()),
        });
        debug!(name, max_acquired, usage, "Created memory queue");
        let producer = MemoryProducer {
            queue: queue.clone(),
        };
        let consumer: Arc<dyn BufferQueue> = queue;
        Ok((consumer, producer))
    }
}

#[derive(Default)]
struct QueueState {
    default_width: i32,
    default_height: i32,
    default_format: i32,
    default_dataspace: i32,
    protected: bool,
    queued: VecDeque<PendingFrame>,
    acquired: HashSet<u64>,
    free_buffers: usize,
    next_frame_number: u64,
    abandoned: bool,
    listener: Option<FrameAvailableCallback>,
}

struct PendingFrame {
    buffer: Arc<MemoryBuffer>,
    timestamp: i64,
    crop: Rect,
    frame_number: u64,
    dataspace: i32,
}

/// Consumer side of an in-process queue.
pub struct MemoryQueue {
    name: String,
    max_acquired: usize,
    usage: u64,
    fault: Option<Fault>,
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self, step: Fault) -> Result<(), QueueError> {
        if self.fault == Some(step) {
            return Err(QueueError::BadValue(format!("{step:?} rejected by {}", self.name)));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn max_acquired(&self) -> usize {
        self.max_acquired
    }

    /// Frames queued by the producer and not yet acquired.
    pub fn queued_len(&self) -> usize {
        self.state().queued.len()
    }

    /// Buffers currently held by the consumer.
    pub fn acquired_len(&self) -> usize {
        self.state().acquired.len()
    }

    /// Buffers released by the consumer and kept for reuse.
    pub fn free_buffers(&self) -> usize {
        self.state().free_buffers
    }

    pub fn default_size(&self) -> (i32, i32) {
        let state = self.state();
        (state.default_width, state.default_height)
    }

    pub fn default_format(&self) -> i32 {
        self.state().default_format
    }

    pub fn default_dataspace(&self) -> i32 {
        self.state().default_dataspace
    }

    pub fn is_protected(&self) -> bool {
        self.state().protected
    }

    pub fn has_listener(&self) -> bool {
        self.state().listener.is_some()
    }
}

impl BufferQueue for MemoryQueue {
    fn set_default_buffer_size(&self, width: i32, height: i32) -> Result<(), QueueError> {
        self.check_fault(Fault::BufferSize)?;
        if width <= 0 || height <= 0 {
            return Err(QueueError::BadValue(format!("size [{width}, {height}]")));
        }
        let mut state = self.state();
        state.default_width = width;
        state.default_height = height;
        Ok(())
    }

    fn set_default_buffer_format(&self, format: i32) -> Result<(), QueueError> {
        self.check_fault(Fault::BufferFormat)?;
        self.state().default_format = format;
        Ok(())
    }

    fn set_default_buffer_dataspace(&self, dataspace: i32) -> Result<(), QueueError> {
        self.check_fault(Fault::BufferDataspace)?;
        self.state().default_dataspace = dataspace;
        Ok(())
    }

    fn set_consumer_is_protected(&self, protected: bool) -> Result<(), QueueError> {
        self.state().protected = protected;
        Ok(())
    }

    fn set_frame_available_listener(&self, listener: Option<FrameAvailableCallback>) {
        self.state().listener = listener;
    }

    fn acquire_buffer(&self, slot: &mut BufferSlot) -> Result<(), QueueError> {
        let mut state = self.state();
        if state.abandoned {
            return Err(QueueError::Abandoned);
        }
        if state.acquired.len() >= self.max_acquired {
            return Err(QueueError::TooManyAcquired);
        }
        let frame = state.queued.pop_front().ok_or(QueueError::NoBufferAvailable)?;
        state.acquired.insert(frame.buffer.id);
        slot.fill(AcquiredBuffer {
            buffer: frame.buffer,
            fence: Fence::NO_FENCE,
            timestamp: frame.timestamp,
            crop: frame.crop,
            frame_number: frame.frame_number,
            dataspace: frame.dataspace,
        });
        Ok(())
    }

    fn release_buffer(
        &self,
        buffer: &Arc<dyn GraphicBuffer>,
        _fence: Fence,
    ) -> Result<(), QueueError> {
        self.check_fault(Fault::ReleaseBuffer)?;
        let mut state = self.state();
        if state.abandoned {
            return Err(QueueError::Abandoned);
        }
        if !state.acquired.remove(&buffer.id()) {
            return Err(QueueError::BadValue(format!(
                "buffer {} is not acquired from {}",
                buffer.id(),
                self.name
            )));
        }
        state.free_buffers += 1;
        Ok(())
    }

    fn discard_free_buffers(&self) -> Result<(), QueueError> {
        let mut state = self.state();
        if state.abandoned {
            return Err(QueueError::Abandoned);
        }
        debug!(name = %self.name, count = state.free_buffers, "Discarding free buffers");
        state.free_buffers = 0;
        Ok(())
    }

    fn abandon(&self) {
        let mut state = self.state();
        state.abandoned = true;
        state.queued.clear();
        state.listener = None;
    }

    fn is_abandoned(&self) -> bool {
        self.state().abandoned
    }
}

/// Writable surface of an in-process queue.
///
/// Cloneable and `Send`, so a frame source thread can hold its own copy.
#[derive(Clone)]
pub struct MemoryProducer {
    queue: Arc<MemoryQueue>,
}

impl MemoryProducer {
    /// The consumer side this producer writes into.
    pub fn queue(&self) -> &Arc<MemoryQueue> {
        &self.queue
    }

    pub fn is_abandoned(&self) -> bool {
        self.queue.state().abandoned
    }

    /// A frame matching the negotiated size and format.
    pub fn default_frame(&self) -> ProducedFrame {
        let state = self.queue.state();
        ProducedFrame::new(state.default_width, state.default_height, state.default_format)
            .dataspace(state.default_dataspace)
    }

    /// Allocates a buffer for `frame`, queues it for the consumer and fires
    /// the availability callback.
    ///
    /// Returns the frame number assigned to the frame.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Abandoned`] once the receiver has unbound
    /// - [`QueueError::NoBufferAvailable`] when all buffers are in flight
    /// - [`QueueError::BadValue`] for an unsupported format or oversized payload
    pub fn queue_frame(&self, frame: ProducedFrame) -> Result<u64, QueueError> {
        let (listener, frame_number) = {
            let mut state = self.queue.state();
            if state.abandoned {
                return Err(QueueError::Abandoned);
            }
            let in_flight = state.queued.len() + state.acquired.len();
            if in_flight >= self.queue.max_acquired + PRODUCER_HEADROOM {
                return Err(QueueError::NoBufferAvailable);
            }
            let dataspace = frame.dataspace.unwrap_or(if frame.format == state.default_format {
                state.default_dataspace
            } else {
                dataspace::UNKNOWN
            });
            let crop = frame
                .crop
                .unwrap_or_else(|| Rect::from_size(frame.width, frame.height));
            let timestamp = frame.timestamp.unwrap_or_else(now_nanos);
            let buffer = Arc::new(MemoryBuffer::allocate(&frame)?);
            state.free_buffers = state.free_buffers.saturating_sub(1);
            let frame_number = state.next_frame_number;
            state.next_frame_number += 1;
            state.queued.push_back(PendingFrame {
                buffer,
                timestamp,
                crop,
                frame_number,
                dataspace,
            });
            (state.listener.clone(), frame_number)
        };
        if let Some(listener) = listener {
            listener();
        }
        Ok(frame_number)
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
}

/// Description of a frame a producer wants to queue.
#[derive(Debug, Clone)]
pub struct ProducedFrame {
    width: i32,
    height: i32,
    format: i32,
    dataspace: Option<i32>,
    crop: Option<Rect>,
    timestamp: Option<i64>,
    data: Option<Vec<u8>>,
    fill: u8,
}

impl ProducedFrame {
    pub fn new(width: i32, height: i32, format: i32) -> Self {
        Self {
            width,
            height,
            format,
            dataspace: None,
            crop: None,
            timestamp: None,
            data: None,
            fill: 0,
        }
    }

    pub fn dataspace(mut self, dataspace: i32) -> Self {
        self.dataspace = Some(dataspace);
        self
    }

    pub fn crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Leading payload bytes; the rest of the buffer is filled.
    ///
    /// For `BLOB` frames the payload defines the buffer size.
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Byte value for everything not covered by [`Self::data`].
    pub fn fill(mut self, value: u8) -> Self {
        self.fill = value;
        self
    }
}

/// Row stride and total size of one buffer.
struct Layout {
    stride: u32,
    size: usize,
}

fn align(value: u32) -> u32 {
    value.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

fn layout(
    format: i32,
    width: u32,
    height: u32,
    blob_len: Option<usize>,
) -> Result<Layout, QueueError> {
    let chroma_rows = height.div_ceil(2) as usize;
    let (stride, size) = match format {
        pixel_format::YCRCB_420_SP | pixel_format::NV12 => {
            let stride = align(width);
            (stride, stride as usize * (height as usize + chroma_rows))
        }
        pixel_format::I420 | pixel_format::YV12 | pixel_format::YCBCR_420_888 => {
            let stride = align(width);
            let chroma = (stride / 2) as usize * chroma_rows;
            (stride, stride as usize * height as usize + 2 * chroma)
        }
        pixel_format::YCBCR_422_SP => {
            let stride = align(width);
            (stride, stride as usize * height as usize * 2)
        }
        pixel_format::Y8 => {
            let stride = align(width);
            (stride, stride as usize * height as usize)
        }
        pixel_format::RGBA_8888 | pixel_format::RGBX_8888 | pixel_format::BGRA_8888 => {
            let stride = align(width) * 4;
            (stride, stride as usize * height as usize)
        }
        pixel_format::RGB_888 => {
            let stride = align(width) * 3;
            (stride, stride as usize * height as usize)
        }
        pixel_format::RGB_565 | pixel_format::RAW16 => {
            let stride = align(width) * 2;
            (stride, stride as usize * height as usize)
        }
        pixel_format::RAW10 => {
            let stride = align((width * 5).div_ceil(4));
            (stride, stride as usize * height as usize)
        }
        pixel_format::RAW12 => {
            let stride = align((width * 3).div_ceil(2));
            (stride, stride as usize * height as usize)
        }
        pixel_format::BLOB => {
            let size = blob_len.unwrap_or(width as usize * height as usize);
            (size as u32, size)
        }
        pixel_format::RAW_OPAQUE | pixel_format::IMPLEMENTATION_DEFINED => {
            let stride = align(width) * 4;
            (stride, stride as usize * height as usize)
        }
        other => {
            return Err(QueueError::BadValue(format!(
                "unsupported pixel format {other:#x}"
            )));
        }
    };
    Ok(Layout { stride, size })
}

struct MemoryBuffer {
    id: u64,
    width: u32,
    height: u32,
    format: i32,
    stride: u32,
    data: Arc<[u8]>,
    locked: AtomicBool,
}

impl MemoryBuffer {
    fn allocate(frame: &ProducedFrame) -> Result<Self, QueueError> {
        if frame.width <= 0 || frame.height <= 0 {
            return Err(QueueError::BadValue(format!(
                "frame size [{}, {}]",
                frame.width, frame.height
            )));
        }
        let (width, height) = (frame.width as u32, frame.height as u32);
        let blob_len = frame.data.as_ref().map(Vec::len);
        let Layout { stride, size } = layout(frame.format, width, height, blob_len)?;
        let mut data = vec![frame.fill; size];
        if let Some(payload) = &frame.data {
            if payload.len() > size {
                return Err(QueueError::BadValue(format!(
                    "payload of {} bytes exceeds buffer of {size} bytes",
                    payload.len()
                )));
            }
            data[..payload.len()].copy_from_slice(payload);
        }
        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format: frame.format,
            stride,
            data: data.into(),
            locked: AtomicBool::new(false),
        })
    }

    /// Chroma offsets, chroma stride and chroma step for the YUV layouts.
    fn chroma_layout(&self) -> (Option<usize>, Option<usize>, u32, u32) {
        let luma = self.stride as usize * self.height as usize;
        let half_stride = self.stride / 2;
        let chroma_plane = half_stride as usize * self.height.div_ceil(2) as usize;
        match self.format {
            pixel_format::YCRCB_420_SP => (Some(luma + 1), Some(luma), self.stride, 2),
            pixel_format::NV12 | pixel_format::YCBCR_422_SP => {
                (Some(luma), Some(luma + 1), self.stride, 2)
            }
            pixel_format::I420 | pixel_format::YCBCR_420_888 => {
                (Some(luma), Some(luma + chroma_plane), half_stride, 1)
            }
            pixel_format::YV12 => (Some(luma + chroma_plane), Some(luma), half_stride, 1),
            _ => (None, None, 0, 0),
        }
    }
}

impl GraphicBuffer for MemoryBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn width(&self) -> i32 {
        self.width as i32
    }

    fn height(&self) -> i32 {
        self.height as i32
    }

    fn pixel_format(&self) -> i32 {
        self.format
    }

    fn lock(&self, _usage: u64, _fence: Fence) -> Result<LockedImage, QueueError> {
        if is_platform_opaque(self.format) {
            return Err(QueueError::BadValue(format!(
                "format {:#x} cannot be mapped for CPU access",
                self.format
            )));
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QueueError::BadValue(format!("buffer {} is already locked", self.id)));
        }
        let (cb, cr, chroma_stride, chroma_step) = self.chroma_layout();
        Ok(LockedImage {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            pixel_format: self.format,
            stride: self.stride,
            cb,
            cr,
            chroma_stride,
            chroma_step,
            crop: Rect::default(),
            timestamp: 0,
            frame_number: 0,
        })
    }

    fn unlock_async(&self) -> Result<Fence, QueueError> {
        if !self.locked.swap(false, Ordering::AcqRel) {
            return Err(QueueError::BadValue(format!("buffer {} is not locked", self.id)));
        }
        Ok(Fence::new(NEXT_FENCE.fetch_add(1, Ordering::Relaxed)))
    }
}
